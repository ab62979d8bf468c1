//! crmq-shared: Shared types and utilities for crmq crates
//!
//! This crate contains the small pieces used by every crmq crate: version
//! metadata, the JSON path representation attached to diagnostics, and a
//! helper for naming the kind of a raw JSON value in error messages.
//!
//! # Features
//!
//! - **Version Information**: Build and version metadata
//! - **JSON Paths**: `$.AND.0.name`-style paths for diagnostics
//! - **Value Kinds**: stable names for JSON value shapes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::uninlined_format_args
)]

pub mod path;

pub use path::{JsonPath, PathSegment};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information structure
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Package version
    pub version: &'static str,
    /// Git commit hash (if available)
    pub git_hash: Option<&'static str>,
    /// Build timestamp (if available)
    pub build_date: Option<&'static str>,
    /// Rust compiler version (if available)
    pub rust_version: Option<&'static str>,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "crmq {}", self.version)?;

        if let Some(hash) = self.git_hash {
            writeln!(f, "Commit: {hash}")?;
        }

        if let Some(date) = self.build_date {
            writeln!(f, "Built: {date}")?;
        }

        if let Some(rust_ver) = self.rust_version {
            writeln!(f, "Rustc: {rust_ver}")?;
        }

        Ok(())
    }
}

/// Name the shape of a raw JSON value.
///
/// Used in diagnostics such as `Expected object, got array`.
pub fn value_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_kind() {
        assert_eq!(value_kind(&json!(null)), "null");
        assert_eq!(value_kind(&json!(true)), "boolean");
        assert_eq!(value_kind(&json!(1.5)), "number");
        assert_eq!(value_kind(&json!("x")), "string");
        assert_eq!(value_kind(&json!([1])), "array");
        assert_eq!(value_kind(&json!({"a": 1})), "object");
    }

    #[test]
    fn test_build_info_display() {
        let info = BuildInfo {
            version: "1.2.3",
            git_hash: Some("abc123"),
            build_date: None,
            rust_version: None,
        };
        let rendered = info.to_string();
        assert!(rendered.starts_with("crmq 1.2.3\n"));
        assert!(rendered.contains("Commit: abc123"));
        assert!(!rendered.contains("Built:"));
    }
}
