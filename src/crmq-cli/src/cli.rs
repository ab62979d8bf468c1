//! Command-line interface for crmq
//!
//! This module defines the command-line arguments with clap. Global flags
//! override the layered configuration; each subcommand names the resource
//! whose field registry a search document is checked against.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crmq_dsl::NestedControl;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

/// crmq - validate CRM search documents and compile them to SQL
#[derive(Parser, Debug)]
#[command(name = "crmq")]
#[command(author, version, about)]
#[command(
    long_about = "crmq - validate CRM search documents and compile them to SQL\n\n\
    crmq checks JSON search documents (logical AND/OR/NOT, per-field operators,\n\
    ORDER/LIMIT/OFFSET) against a resource's field registry, prints the typed AST,\n\
    and compiles it into parameterised PostgreSQL."
)]
#[command(after_help = "EXAMPLES:\n  \
    # Validate a document against the people registry\n  \
    crmq parse '{\"name\": {\"LIKE\": \"%ann%\"}}'\n\n  \
    # Read the document from a file\n  \
    crmq parse -r users -f search.json\n\n  \
    # Compile for one tenant, including contact fields\n  \
    crmq compile -t app_123 --allow-restricted '{\"email\": {\"EQ\": \"ann@example.com\"}}'\n\n  \
    # List the searchable fields of a resource\n  \
    crmq fields -r users")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use compact output (no pretty-printing)
    #[arg(short, long, global = true)]
    pub compact: bool,

    /// Configuration file to use
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Deepest fragment nesting accepted
    #[arg(long, value_name = "N", global = true)]
    pub max_depth: Option<usize>,

    /// Treatment of ORDER/LIMIT/OFFSET below the document root
    #[arg(long, value_enum, global = true)]
    pub nested_control: Option<NestedControlArg>,

    /// Largest page size a compiled query may use
    #[arg(long, value_name = "N", global = true)]
    pub max_limit: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Where a search document comes from
#[derive(Args, Debug, Clone)]
pub struct DslInput {
    /// Search document as JSON (stdin when neither this nor --file is given)
    #[arg(value_name = "DSL", conflicts_with = "file")]
    pub dsl: Option<String>,

    /// Read the search document from a file
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Resource whose field registry applies
    #[arg(short, long, default_value = "people")]
    pub resource: String,
}

impl DslInput {
    /// Read the document text
    pub fn read(&self) -> anyhow::Result<String> {
        if let Some(dsl) = &self.dsl {
            return Ok(dsl.clone());
        }
        if let Some(path) = &self.file {
            return fs::read_to_string(path)
                .with_context(|| format!("Failed to read search document {}", path.display()));
        }
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read search document from stdin")?;
        Ok(buffer)
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a search document and print its AST
    #[command(after_help = "EXAMPLES:\n  \
        crmq parse '{\"AND\": [{\"ltv\": {\"GT\": 100}}, {\"NOT\": {\"name\": {\"EQ\": \"x\"}}}]}'\n  \
        echo '{\"status\": {\"IN\": [\"active\"]}}' | crmq parse -r users")]
    Parse {
        #[command(flatten)]
        input: DslInput,
    },

    /// Compile a search document into a tenant-scoped SQL query
    #[command(after_help = "EXAMPLES:\n  \
        crmq compile -t app_123 '{\"ltv\": {\"GTE\": 10}, \"LIMIT\": 20}'\n  \
        crmq compile -t app_123 --search ann --search-fields name,email ''")]
    Compile {
        #[command(flatten)]
        input: DslInput,

        /// Tenant (application) id every row must belong to
        #[arg(short, long, value_name = "ID")]
        tenant: String,

        /// Caller holds the contact entitlement (keeps e-mail/phone predicates)
        #[arg(long)]
        allow_restricted: bool,

        /// Free-text term matched as a substring of the basic search fields
        #[arg(short, long, value_name = "TERM")]
        search: Option<String>,

        /// Comma-separated basic search fields for --search
        #[arg(long, value_name = "LIST")]
        search_fields: Option<String>,

        /// Print only the SELECT statement
        #[arg(long)]
        sql_only: bool,
    },

    /// List the searchable fields of a resource with their operators
    Fields {
        /// Resource to describe
        #[arg(short, long, default_value = "people")]
        resource: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Create a default configuration file
    Init {
        /// Path to create config file
        #[arg(default_value = "crmq.toml")]
        path: PathBuf,

        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Check {
        /// Configuration file to check
        path: PathBuf,
    },
}

/// `--nested-control` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NestedControlArg {
    /// Validate nested control keys, then ignore them
    Ignore,
    /// Reject control keys below the root
    Reject,
}

impl From<NestedControlArg> for NestedControl {
    fn from(arg: NestedControlArg) -> Self {
        match arg {
            NestedControlArg::Ignore => NestedControl::Ignore,
            NestedControlArg::Reject => NestedControl::Reject,
        }
    }
}

/// Parse command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Parse command-line arguments from a vector (for testing)
pub fn parse_args_from<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}
