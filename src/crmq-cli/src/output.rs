//! Output formatting for the crmq CLI
//!
//! Everything crmq prints on stdout is JSON, pretty-printed when stdout is a
//! terminal unless the configuration or `--compact` says otherwise.

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use serde::Serialize;
use std::io::{self, Write};

use crate::config::Config;

/// Output writer for crmq results
#[derive(Debug, Clone, Copy)]
pub struct OutputWriter {
    pretty: bool,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(config: &Config) -> Self {
        Self {
            pretty: config
                .display
                .pretty
                .unwrap_or_else(|| io::stdout().is_terminal()),
        }
    }

    /// Writer with explicit pretty-printing
    pub fn with_pretty(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Whether JSON is pretty-printed
    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Write `value` as one JSON document followed by a newline
    pub fn write_json<W: Write, T: Serialize + ?Sized>(&self, writer: &mut W, value: &T) -> Result<()> {
        let written = if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, value)
        } else {
            serde_json::to_writer(&mut *writer, value)
        };
        written.context("JSON serialization error")?;
        writeln!(writer)?;
        Ok(())
    }

    /// Write `value` to stdout
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.write_json(&mut handle, value)?;
        handle.flush()?;
        Ok(())
    }
}
