//! Built-in CRM resources
//!
//! A [`Resource`] bundles what a listing endpoint needs: the registry its
//! search documents are parsed against, the table layout they compile to,
//! the tenant column every query is scoped by, and the fields only visible
//! to callers holding the contact entitlement.

use crmq_dsl::{
    Direction, FieldRegistry, FieldType, Node, OpClause, Operator, SearchDslParser,
};
use serde_json::Value;

use crate::compiler::SqlCompiler;
use crate::schema::{ColumnTarget, SqlSchema};

/// Names accepted by [`builtin`]
pub const BUILTIN_RESOURCES: [&str; 2] = ["users", "people"];

/// Errors from resource-level request options
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// `searchFields` named a field outside the basic search set
    #[error("Unsupported searchFields: {}. Allowed: {}", .invalid.join(", "), .allowed.join(", "))]
    UnsupportedSearchFields {
        /// Offending names
        invalid: Vec<String>,
        /// Accepted names
        allowed: Vec<String>,
    },
}

/// A searchable listing endpoint
#[derive(Debug, Clone)]
pub struct Resource {
    /// Resource name
    pub name: String,
    /// Fields accepted in search documents
    pub registry: FieldRegistry,
    /// Storage layout
    pub schema: SqlSchema,
    /// Tenant column
    pub scope_column: String,
    /// Fields pruned for callers without the contact entitlement
    pub restricted_fields: Vec<String>,
    /// Fields matched by the free-text `search` option
    pub basic_search_fields: Vec<String>,
    /// Fields searched when every requested one is restricted
    pub fallback_search_fields: Vec<String>,
}

impl Resource {
    /// Parser for this resource's search documents
    pub fn parser(&self) -> SearchDslParser<'_> {
        SearchDslParser::new(&self.registry)
    }

    /// Compiler scoped to one tenant
    ///
    /// Restricted fields are gated unless `can_view_restricted` is set.
    pub fn compiler(&self, tenant: impl Into<Value>, can_view_restricted: bool) -> SqlCompiler<'_> {
        let mut compiler = SqlCompiler::new(&self.schema).scope(self.scope_column.as_str(), tenant);
        if !can_view_restricted {
            for field in &self.restricted_fields {
                compiler = compiler.gate(field.as_str());
            }
        }
        compiler
    }

    /// Validate a comma-separated `searchFields` option
    ///
    /// Absent or blank input selects every basic search field.
    pub fn search_fields(&self, raw: Option<&str>) -> Result<Vec<String>, ResourceError> {
        let fields: Vec<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if fields.is_empty() {
            return Ok(self.basic_search_fields.clone());
        }

        let invalid: Vec<String> = fields
            .iter()
            .filter(|f| !self.basic_search_fields.contains(f))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(ResourceError::UnsupportedSearchFields {
                invalid,
                allowed: self.basic_search_fields.clone(),
            });
        }
        Ok(fields)
    }

    /// Filter matching `term` as a substring of any of `fields`
    ///
    /// Restricted fields are dropped for callers without the entitlement;
    /// if nothing is left the fallback fields are searched instead.
    pub fn search_node(&self, term: &str, fields: &[String], can_view_restricted: bool) -> Option<Node> {
        if term.is_empty() {
            return None;
        }

        let usable: Vec<&String> = fields
            .iter()
            .filter(|f| can_view_restricted || !self.restricted_fields.contains(f))
            .collect();
        let effective: Vec<&String> = if usable.is_empty() {
            self.fallback_search_fields.iter().collect()
        } else {
            usable
        };

        let pattern = Value::String(format!("%{}%", term));
        let items: Vec<Node> = effective
            .into_iter()
            .map(|field| Node::field(field.as_str(), vec![OpClause::new(Operator::Like, pattern.clone())]))
            .collect();
        (!items.is_empty()).then_some(Node::Or { items })
    }
}

/// Look up a built-in resource by name
pub fn builtin(name: &str) -> Option<Resource> {
    match name {
        "users" => Some(users()),
        "people" => Some(people()),
        _ => None,
    }
}

/// Application users
pub fn users() -> Resource {
    let registry = FieldRegistry::builder()
        .field("id", FieldType::String)
        .field("email", FieldType::String)
        .field("name", FieldType::String)
        .field_with_operators("status", FieldType::String, ["EQ", "NEQ", "IN", "NIN"])
        .field("createdAt", FieldType::Date)
        .field("updatedAt", FieldType::Date)
        .build()
        .expect("users registry is valid");

    let schema = SqlSchema::new("users")
        .with_column("id", ColumnTarget::column("id"))
        .with_column("email", ColumnTarget::column("email"))
        .with_column("name", ColumnTarget::column("name"))
        .with_column("status", ColumnTarget::column("status"))
        .with_column("createdAt", ColumnTarget::cast("created_at", "timestamptz"))
        .with_column("updatedAt", ColumnTarget::cast("updated_at", "timestamptz"))
        .with_default_order("createdAt", Direction::Desc);

    Resource {
        name: "users".to_string(),
        registry,
        schema,
        scope_column: "application_id".to_string(),
        restricted_fields: Vec::new(),
        basic_search_fields: strings(&["name", "email", "id"]),
        fallback_search_fields: strings(&["name", "id"]),
    }
}

/// CRM contacts; e-mail addresses and phone numbers live in child tables
pub fn people() -> Resource {
    let registry = FieldRegistry::builder()
        .field("id", FieldType::String)
        .field("email", FieldType::String)
        .field("phone", FieldType::String)
        .field("name", FieldType::String)
        .field("ltv", FieldType::Number)
        .field("createdAt", FieldType::Date)
        .field("updatedAt", FieldType::Date)
        .build()
        .expect("people registry is valid");

    let schema = SqlSchema::new("people")
        .with_column("id", ColumnTarget::column("id"))
        .with_column(
            "email",
            ColumnTarget::related("people_email_addresses", "address", "person_id"),
        )
        .with_column(
            "phone",
            ColumnTarget::related("people_phone_numbers", "number", "person_id"),
        )
        .with_column("name", ColumnTarget::column("name"))
        .with_column("ltv", ColumnTarget::column("ltv"))
        .with_column("createdAt", ColumnTarget::cast("created_at", "timestamptz"))
        .with_column("updatedAt", ColumnTarget::cast("updated_at", "timestamptz"))
        .with_default_order("createdAt", Direction::Desc);

    Resource {
        name: "people".to_string(),
        registry,
        schema,
        scope_column: "application_id".to_string(),
        restricted_fields: strings(&["email", "phone"]),
        basic_search_fields: strings(&["name", "email", "phone", "id"]),
        fallback_search_fields: strings(&["name", "id"]),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_lookup() {
        for name in BUILTIN_RESOURCES {
            assert_eq!(builtin(name).unwrap().name, name);
        }
        assert!(builtin("invitations").is_none());
    }

    #[test]
    fn test_every_registry_field_has_a_column() {
        for resource in [users(), people()] {
            for (field, _) in resource.registry.iter() {
                assert!(
                    resource.schema.target(field).is_some(),
                    "{}.{} has no column",
                    resource.name,
                    field
                );
            }
        }
    }

    #[test]
    fn test_search_fields_option() {
        let people = people();
        assert_eq!(
            people.search_fields(None).unwrap(),
            vec!["name", "email", "phone", "id"]
        );
        assert_eq!(people.search_fields(Some(" , ")).unwrap().len(), 4);
        assert_eq!(
            people.search_fields(Some("name, phone")).unwrap(),
            vec!["name", "phone"]
        );

        let err = people.search_fields(Some("name,ltv,notes")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported searchFields: ltv, notes. Allowed: name, email, phone, id"
        );
    }

    #[test]
    fn test_search_node_falls_back_without_entitlement() {
        let people = people();
        let node = people
            .search_node("ann", &strings(&["email", "phone"]), false)
            .unwrap();
        assert_eq!(node.referenced_fields(), vec!["name", "id"]);

        let node = people
            .search_node("ann", &strings(&["email", "name"]), true)
            .unwrap();
        assert_eq!(node.referenced_fields(), vec!["email", "name"]);
        assert!(people.search_node("", &strings(&["name"]), true).is_none());
    }
}
