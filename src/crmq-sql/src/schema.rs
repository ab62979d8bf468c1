//! Mapping from search fields to SQL columns

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crmq_dsl::{Direction, OrderItem};

/// Where a search field lives in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum ColumnTarget {
    /// A column of the base table
    Column {
        /// Column name
        name: String,
        /// Type the bound parameter is cast to, e.g. `timestamptz`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cast: Option<String>,
    },
    /// A column of a child table, matched through an `EXISTS` sub-select
    Related {
        /// Child table
        table: String,
        /// Column of the child table holding the searched value
        column: String,
        /// Child column referencing the base table's primary key
        foreign_key: String,
    },
}

impl ColumnTarget {
    /// Plain column
    pub fn column(name: impl Into<String>) -> Self {
        ColumnTarget::Column {
            name: name.into(),
            cast: None,
        }
    }

    /// Plain column whose parameters are cast to `cast`
    pub fn cast(name: impl Into<String>, cast: impl Into<String>) -> Self {
        ColumnTarget::Column {
            name: name.into(),
            cast: Some(cast.into()),
        }
    }

    /// Column of a child table
    pub fn related(
        table: impl Into<String>,
        column: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        ColumnTarget::Related {
            table: table.into(),
            column: column.into(),
            foreign_key: foreign_key.into(),
        }
    }

    /// Whether rows can be sorted by this target
    pub fn is_sortable(&self) -> bool {
        matches!(self, ColumnTarget::Column { .. })
    }
}

/// Table layout behind one searchable resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlSchema {
    /// Base table
    pub table: String,
    /// Primary key of the base table
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Search field name to storage location, in declaration order
    pub columns: IndexMap<String, ColumnTarget>,
    /// Ordering used when a query has no `ORDER`
    #[serde(default)]
    pub default_order: Vec<OrderItem>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl SqlSchema {
    /// Schema for `table` with no columns
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: default_primary_key(),
            columns: IndexMap::new(),
            default_order: Vec::new(),
        }
    }

    /// Map a search field to a storage location
    #[must_use]
    pub fn with_column(mut self, field: impl Into<String>, target: ColumnTarget) -> Self {
        self.columns.insert(field.into(), target);
        self
    }

    /// Append a default sort key
    #[must_use]
    pub fn with_default_order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.default_order.push(OrderItem::new(field, direction));
        self
    }

    /// Storage location of a search field
    pub fn target(&self, field: &str) -> Option<&ColumnTarget> {
        self.columns.get(field)
    }

    /// Fields usable in `ORDER`, in declaration order
    pub fn sortable_fields(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, target)| target.is_sortable())
            .map(|(field, _)| field.clone())
            .collect()
    }

    /// Fully-qualified column of the base table
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", quote_ident(&self.table), quote_ident(column))
    }
}

/// Quote an SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
