//! Abstract Syntax Tree (AST) definitions for the search DSL
//!
//! This module defines the validated tree produced by a successful parse
//! and the [`ParsedQuery`] envelope handed to query compilers. Every value
//! stored in a [`FieldNode`] has already been checked and normalised
//! against the field's declared type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::control::OrderItem;
use crate::registry::Operator;

/// One validated `{op, value}` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpClause {
    /// Operator token
    pub op: Operator,
    /// Normalised operand
    pub value: Value,
}

impl OpClause {
    /// New clause
    pub fn new(op: Operator, value: Value) -> Self {
        Self { op, value }
    }
}

/// Operator clauses applied to one field, combined with AND
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    /// Field name, declared in the registry used for the parse
    pub field: String,
    /// Non-empty list of clauses, in document order
    pub ops: Vec<OpClause>,
}

/// Node of the filter tree
///
/// Serialises with a `kind` tag: `{"kind": "and", "items": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    /// Clauses on a single field
    Field(FieldNode),
    /// Every child must match (at least one child)
    And {
        /// Children in document order
        items: Vec<Node>,
    },
    /// Some child must match (at least one child)
    Or {
        /// Children in document order
        items: Vec<Node>,
    },
    /// The child must not match
    Not {
        /// The negated node
        item: Box<Node>,
    },
}

impl Node {
    /// Single-field node
    pub fn field(field: impl Into<String>, ops: Vec<OpClause>) -> Self {
        Node::Field(FieldNode {
            field: field.into(),
            ops,
        })
    }

    /// Tag used in the serialised form
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Field(_) => "field",
            Node::And { .. } => "and",
            Node::Or { .. } => "or",
            Node::Not { .. } => "not",
        }
    }

    /// Depth of the tree rooted here (a field node has depth 1)
    pub fn depth(&self) -> usize {
        match self {
            Node::Field(_) => 1,
            Node::And { items } | Node::Or { items } => {
                1 + items.iter().map(Node::depth).max().unwrap_or(0)
            }
            Node::Not { item } => 1 + item.depth(),
        }
    }

    /// Every field name referenced below this node, in traversal order
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Field(node) => out.push(&node.field),
            Node::And { items } | Node::Or { items } => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Node::Not { item } => item.collect_fields(out),
        }
    }
}

/// Sorting and pagination requested at the document root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Control {
    /// Sort keys in priority order
    pub order: Vec<OrderItem>,
    /// Page size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Rows to skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// Diagnostics echoed back with every parse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Registry fields in declaration order
    pub allowed_fields: Vec<String>,
}

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    /// Filter tree
    pub root: Node,
    /// Root-level sorting and pagination
    pub control: Control,
    /// Diagnostics
    pub meta: Meta,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Field(node) => {
                for (i, clause) in node.ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    write!(f, "{} {} {}", node.field, clause.op, clause.value)?;
                }
                Ok(())
            }
            Node::And { items } => write_joined(f, items, " and "),
            Node::Or { items } => write_joined(f, items, " or "),
            Node::Not { item } => write!(f, "not ({})", item),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Node], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}
