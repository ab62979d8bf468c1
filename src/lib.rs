//! crmq: a validating search DSL for a multi-tenant CRM backend
//!
//! Listing endpoints accept a JSON search document made of logical
//! combinators, per-field operator clauses and root-level `ORDER`, `LIMIT`
//! and `OFFSET` keys. This crate re-exports the pieces that validate such
//! documents and compile them to parameterised SQL:
//!
//! - [`dsl`]: field registries, the parser, the AST and error reports
//! - [`sql`]: tenant-scoped PostgreSQL compilation and the built-in resources
//! - [`shared`]: JSON paths and build metadata
//!
//! ```rust
//! use crmq::dsl::{format_error, ErrorCode};
//! use crmq::sql::resources;
//! use serde_json::json;
//!
//! let users = resources::users();
//! let err = users
//!     .parser()
//!     .parse(&json!({"AND": []}))
//!     .unwrap_err();
//! assert_eq!(err.code, ErrorCode::LogicalArrayRequired);
//! assert!(format_error(&err).human.contains("$.AND"));
//! ```

pub use crmq_dsl as dsl;
pub use crmq_shared as shared;
pub use crmq_sql as sql;

pub use crmq_dsl::{
    format_error, ErrorCode, FieldRegistry, FieldType, Node, ParsedQuery, SearchDslError,
    SearchDslParser,
};
pub use crmq_shared::VERSION;
