//! Command execution for the crmq CLI
//!
//! This module resolves a resource name to its field registry, runs the
//! search DSL parser with the configured limits, and drives the SQL
//! compiler for tenant-scoped listing queries.

use anyhow::{anyhow, bail, Result};
use crmq_dsl::{resolve_operators, FieldType, Node, ParsedQuery, SearchDslParser};
use crmq_sql::Resource;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;

/// Request-level options for [`Executor::compile`]
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Tenant every row must belong to
    pub tenant: String,
    /// Caller holds the contact entitlement
    pub allow_restricted: bool,
    /// Free-text term matched against the basic search fields
    pub search: Option<String>,
    /// Comma-separated subset of the basic search fields
    pub search_fields: Option<String>,
}

/// Statements and bindings for one listing request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    /// Page query
    pub sql: String,
    /// Total-count query sharing the same parameters
    pub count_sql: String,
    /// Bound values, `$1` first
    pub params: Vec<Value>,
    /// Effective page size
    pub limit: u64,
    /// Effective offset
    pub offset: u64,
}

/// One searchable field as listed by `crmq fields`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Operators the field accepts
    pub operators: Vec<String>,
}

/// Main executor for crmq operations
pub struct Executor {
    config: Config,
}

impl Executor {
    /// Create a new executor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a search document against a resource's registry
    ///
    /// DSL failures are returned as the underlying `SearchDslError` so
    /// callers can render them with `crmq_dsl::format_any_error`.
    pub fn parse(&self, resource: &str, input: &str) -> Result<ParsedQuery> {
        let registry = self.config.registry(resource).ok_or_else(|| self.unknown_resource(resource))?;
        let parser = SearchDslParser::with_options(&registry, self.config.parser);
        log::debug!(
            "parsing {} byte search document for '{}' (max depth {})",
            input.len(),
            resource,
            self.config.parser.max_depth
        );
        Ok(parser.parse_str(input)?)
    }

    /// Compile a listing request for a built-in resource
    ///
    /// Blank `input` means the request carried no search document.
    pub fn compile(&self, resource: &str, input: &str, options: &CompileOptions) -> Result<CompileOutput> {
        let Some(target) = crmq_sql::builtin(resource) else {
            if self.config.registries.contains_key(resource) {
                bail!(
                    "Resource '{}' has a registry but no table mapping; only {} can be compiled",
                    resource,
                    crmq_sql::BUILTIN_RESOURCES.join(", ")
                );
            }
            return Err(self.unknown_resource(resource));
        };

        let parsed = if input.trim().is_empty() {
            None
        } else {
            Some(self.parse(resource, input)?)
        };
        let search = self.search_filter(&target, options)?;

        let mut filters: Vec<&Node> = Vec::new();
        if let Some(parsed) = &parsed {
            filters.push(&parsed.root);
        }
        if let Some(search) = &search {
            filters.push(search);
        }
        let control = parsed.as_ref().map(|p| p.control.clone()).unwrap_or_default();

        let pagination = &self.config.pagination;
        let query = target
            .compiler(options.tenant.as_str(), options.allow_restricted)
            .pagination(pagination.default_limit, pagination.max_limit)
            .max_depth(self.config.parser.max_depth + 1)
            .compile_parts(&filters, &control)?;

        Ok(CompileOutput {
            sql: query.select_sql("*"),
            count_sql: query.count_sql(),
            params: query.params,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Searchable fields of a resource, with resolved operator lists
    pub fn fields(&self, resource: &str) -> Result<Vec<FieldInfo>> {
        let registry = self.config.registry(resource).ok_or_else(|| self.unknown_resource(resource))?;
        Ok(registry
            .iter()
            .map(|(name, descriptor)| FieldInfo {
                name: name.to_string(),
                field_type: descriptor.field_type,
                operators: resolve_operators(descriptor)
                    .iter()
                    .map(|op| op.as_str().to_string())
                    .collect(),
            })
            .collect())
    }

    fn search_filter(&self, resource: &Resource, options: &CompileOptions) -> Result<Option<Node>> {
        let Some(term) = options.search.as_deref() else {
            if options.search_fields.is_some() {
                log::warn!("--search-fields has no effect without --search");
            }
            return Ok(None);
        };
        let fields = resource.search_fields(options.search_fields.as_deref())?;
        Ok(resource.search_node(term.trim(), &fields, options.allow_restricted))
    }

    fn unknown_resource(&self, resource: &str) -> anyhow::Error {
        anyhow!(
            "Unknown resource '{}'. Known resources: {}",
            resource,
            self.config.resource_names().join(", ")
        )
    }
}
