//! crmq-sql: PostgreSQL compilation for crmq search queries
//!
//! This crate turns the validated AST produced by `crmq-dsl` into
//! parameterised PostgreSQL. It never connects to a database; callers hand
//! the generated statement and its parameters to their own driver.
//!
//! # Features
//!
//! - **Parameterised output**: operands are always bound, never inlined
//! - **Tenant scoping**: a mandatory equality predicate ANDed first
//! - **Gated fields**: predicates on restricted fields are pruned, and the
//!   pruning propagates through `AND`, `OR` and `NOT`
//! - **Child-table fields** compiled to `EXISTS` sub-selects
//! - **Built-in resources** for CRM users and people
//!
//! # Quick Start
//!
//! ```rust
//! use crmq_sql::resources;
//! use serde_json::json;
//!
//! let people = resources::people();
//! let parsed = people.parser().parse(&json!({
//!     "OR": [{"name": {"LIKE": "%ann%"}}, {"email": {"EQ": "ann@example.com"}}],
//!     "LIMIT": 20
//! }))?;
//!
//! // without the contact entitlement the e-mail predicate is pruned
//! let query = people.compiler("app_123", false).compile(&parsed)?;
//! assert_eq!(
//!     query.where_clause.as_deref(),
//!     Some("\"people\".\"application_id\" = $1 AND \"people\".\"name\" ILIKE $2")
//! );
//! assert_eq!(query.params, vec![json!("app_123"), json!("%ann%")]);
//! assert_eq!(query.limit, 20);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod compiler;
pub mod resources;
pub mod schema;

pub use compiler::{CompiledFilter, CompiledQuery, SqlCompiler, DEFAULT_LIMIT, MAX_LIMIT};
pub use resources::{builtin, people, users, Resource, ResourceError, BUILTIN_RESOURCES};
pub use schema::{quote_ident, ColumnTarget, SqlSchema};
