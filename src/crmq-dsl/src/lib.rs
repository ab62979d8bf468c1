//! crmq-dsl: Validating parser for the crmq search DSL
//!
//! This crate turns untrusted JSON search documents into a validated,
//! strongly-typed AST. Callers declare the searchable fields of an endpoint
//! in a [`FieldRegistry`]; the parser checks every field, operator and
//! operand against it and reports anything invalid with a stable error code
//! and the JSON path of the offending value.
//!
//! # Features
//!
//! - **Logical combinators**: `AND`, `OR` (non-empty arrays) and `NOT`
//! - **Per-field operator allow-lists** keyed by declared type, with overrides
//! - **Field-local combinators**: `{"createdAt": {"AND": [{"AFTER": ...}, {"BEFORE": ...}]}}`
//! - **Operand normalisation**: dates become ISO-8601 UTC strings
//! - **Control keys**: `ORDER`, `LIMIT`, `OFFSET`
//! - **Diagnostics**: human and machine renderings via [`format_error`]
//!
//! # Quick Start
//!
//! ```rust
//! use crmq_dsl::{FieldRegistry, FieldType, Node, SearchDslParser};
//! use serde_json::json;
//!
//! let registry = FieldRegistry::builder()
//!     .field("name", FieldType::String)
//!     .field("createdAt", FieldType::Date)
//!     .build()?;
//!
//! let parser = SearchDslParser::new(&registry);
//! let parsed = parser.parse(&json!({
//!     "AND": [
//!         {"name": {"LIKE": "%ann%"}},
//!         {"createdAt": {"AFTER": "2024-01-01"}}
//!     ],
//!     "ORDER": {"createdAt": "DESC"},
//!     "LIMIT": 20
//! }))?;
//!
//! assert!(matches!(parsed.root, Node::And { ref items } if items.len() == 2));
//! assert_eq!(parsed.control.limit, Some(20));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Error Handling
//!
//! ```rust
//! use crmq_dsl::{format_error, parse_search_dsl, ErrorCode, FieldRegistry, FieldType};
//! use serde_json::json;
//!
//! let registry = FieldRegistry::builder().field("age", FieldType::Number).build()?;
//! let err = parse_search_dsl(&json!({"age": {"GT": "18"}}), &registry).unwrap_err();
//! assert_eq!(err.code, ErrorCode::OperatorValueInvalid);
//!
//! let report = format_error(&err);
//! assert_eq!(
//!     report.human,
//!     "Invalid value for operator 'GT' on field 'age'\n- $.age.GT: Expected a number"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::too_many_lines
)]

pub mod ast;
pub mod control;
pub mod error;
pub mod operand;
mod parser;
pub mod registry;
pub mod report;
#[cfg(test)]
mod tests;

// Re-export main types
pub use ast::*;
pub use control::{validate_control, ControlSpec, Direction, OrderItem, CONTROL_KEYS};
pub use error::*;
pub use operand::{coerce_date_to_iso, validate_operand, InvalidOperand};
pub use parser::*;
pub use registry::*;
pub use report::*;

// Re-export shared types
pub use crmq_shared::{JsonPath, PathSegment, VERSION};
