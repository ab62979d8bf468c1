//! Parser implementation for the search DSL
//!
//! This module walks a JSON search document fragment by fragment and builds
//! the validated AST. A fragment is one JSON object holding exactly one
//! expression key (`AND`, `OR`, `NOT` or a field name) plus, optionally, the
//! control keys `ORDER`, `LIMIT` and `OFFSET`.

use crmq_shared::{value_kind, JsonPath};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ast::{Control, FieldNode, Meta, Node, OpClause, ParsedQuery};
use crate::control::{validate_control, ControlSpec, CONTROL_KEYS};
use crate::error::{ErrorCode, Issue, Result, SearchDslError};
use crate::operand::validate_operand;
use crate::registry::{resolve_operators, FieldDescriptor, FieldRegistry, Operator};

/// Keys that combine fragments
pub const LOGICAL_KEYS: [&str; 3] = ["AND", "OR", "NOT"];

/// Nesting limit applied when none is configured
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Treatment of control keys below the document root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestedControl {
    /// Validate their shape, then ignore them
    #[default]
    Ignore,
    /// Fail with `DSL_INVALID_CONTROL_KEYS`
    Reject,
}

/// Parser configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Deepest fragment nesting accepted; the root fragment is depth 1
    pub max_depth: usize,
    /// What to do with control keys below the root
    pub nested_control: NestedControl,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            nested_control: NestedControl::Ignore,
        }
    }
}

/// Main parser for search DSL documents
///
/// Holds a borrowed registry and is cheap to create; one parser can be
/// shared across threads and used for any number of documents.
#[derive(Debug, Clone, Copy)]
pub struct SearchDslParser<'r> {
    registry: &'r FieldRegistry,
    options: ParserOptions,
}

/// A parsed fragment and the control keys found on it
struct Fragment {
    node: Node,
    control: ControlSpec,
}

impl<'r> SearchDslParser<'r> {
    /// Create a parser with default options
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self::with_options(registry, ParserOptions::default())
    }

    /// Create a parser with explicit options
    pub fn with_options(registry: &'r FieldRegistry, options: ParserOptions) -> Self {
        Self { registry, options }
    }

    /// The registry this parser validates against
    pub fn registry(&self) -> &'r FieldRegistry {
        self.registry
    }

    /// Active options
    pub fn options(&self) -> ParserOptions {
        self.options
    }

    /// Parse an already-decoded search document
    pub fn parse(&self, dsl: &Value) -> Result<ParsedQuery> {
        let Fragment { node, control } = self.parse_node(dsl, &JsonPath::root(), 1)?;

        let parsed = ParsedQuery {
            root: node,
            control: Control {
                order: control.order.unwrap_or_default(),
                limit: control.limit,
                offset: control.offset,
            },
            meta: Meta {
                allowed_fields: self.registry.field_names(),
            },
        };
        log::debug!(
            "parsed search DSL: {} (order keys: {}, limit: {:?}, offset: {:?})",
            parsed.root,
            parsed.control.order.len(),
            parsed.control.limit,
            parsed.control.offset
        );
        Ok(parsed)
    }

    /// Decode a JSON string, then parse it
    pub fn parse_str(&self, input: &str) -> Result<ParsedQuery> {
        let dsl: Value = serde_json::from_str(input).map_err(|e| {
            SearchDslError::new(ErrorCode::InvalidJson, "searchDsl must be valid JSON")
                .detail(e.to_string())
        })?;
        self.parse(&dsl)
    }

    fn parse_node(&self, input: &Value, path: &JsonPath, depth: usize) -> Result<Fragment> {
        if depth > self.options.max_depth {
            return Err(SearchDslError::new(
                ErrorCode::MaxDepthExceeded,
                format!(
                    "Search DSL nesting exceeds the maximum depth of {}",
                    self.options.max_depth
                ),
            )
            .at(path.clone())
            .detail(format!("Fragment is nested {} levels deep", depth))
            .max_depth(self.options.max_depth));
        }

        let Value::Object(fragment) = input else {
            return Err(SearchDslError::new(
                ErrorCode::InvalidFragment,
                "Invalid search DSL fragment (expected an object)",
            )
            .at(path.clone())
            .detail(format!("Expected object, got {}", value_kind(input))));
        };

        log::trace!("parsing fragment at {}", path);

        let control = validate_control(fragment).map_err(|issues| {
            let issues: Vec<Issue> = issues
                .into_iter()
                .map(|issue| Issue::new(path.join(&issue.path), issue.message))
                .collect();
            let first = issues
                .first()
                .map_or_else(|| "Invalid control keys".to_string(), |i| i.message.clone());
            SearchDslError::new(ErrorCode::InvalidControlKeys, "Invalid control keys in search DSL")
                .at(path.clone())
                .detail(first)
                .with_issues(issues)
        })?;

        if depth > 1 && !control.is_empty() {
            match self.options.nested_control {
                NestedControl::Ignore => {
                    log::debug!("ignoring control keys below the root at {}", path);
                }
                NestedControl::Reject => {
                    let issues = CONTROL_KEYS
                        .iter()
                        .filter(|key| fragment.contains_key(**key))
                        .map(|key| {
                            Issue::new(path.child(*key), "Control keys are only allowed at the root")
                        })
                        .collect();
                    return Err(SearchDslError::new(
                        ErrorCode::InvalidControlKeys,
                        "Invalid control keys in search DSL",
                    )
                    .at(path.clone())
                    .detail("Control keys are only allowed at the root")
                    .with_issues(issues));
                }
            }
        }

        let key = expression_key(fragment).ok_or_else(|| {
            SearchDslError::new(
                ErrorCode::InvalidFragmentShape,
                "A search fragment must contain exactly one logical or field expression",
            )
            .at(path.clone())
            .detail(
                "Expected exactly one expression key (field or logical) plus optional control keys",
            )
        })?;
        let value = &fragment[key];

        let node = match key {
            "NOT" => self.parse_not(value, path, depth)?,
            "AND" | "OR" => self.parse_logical(key, value, path, depth)?,
            field => self.parse_field(field, value, path)?,
        };

        Ok(Fragment { node, control })
    }

    fn parse_not(&self, value: &Value, path: &JsonPath, depth: usize) -> Result<Node> {
        let not_path = path.child("NOT");
        if value.is_array() {
            return Err(
                SearchDslError::new(ErrorCode::NotArray, "NOT accepts exactly one expression")
                    .at(not_path)
                    .detail("NOT cannot receive an array"),
            );
        }
        let item = self.parse_node(value, &not_path, depth + 1)?.node;
        Ok(Node::Not {
            item: Box::new(item),
        })
    }

    fn parse_logical(&self, key: &str, value: &Value, path: &JsonPath, depth: usize) -> Result<Node> {
        let key_path = path.child(key);
        let elements = match value {
            Value::Array(elements) if !elements.is_empty() => elements,
            _ => {
                let message = format!("{} must be a non-empty array", key);
                return Err(SearchDslError::new(ErrorCode::LogicalArrayRequired, message.clone())
                    .at(key_path)
                    .detail(message));
            }
        };

        let items = elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                self.parse_node(element, &key_path.child(i), depth + 1)
                    .map(|fragment| fragment.node)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(combine(key, items))
    }

    fn parse_field(&self, field: &str, value: &Value, path: &JsonPath) -> Result<Node> {
        let field_path = path.child(field);

        let Some(descriptor) = self.registry.get(field) else {
            return Err(
                SearchDslError::new(ErrorCode::UnknownField, format!("Unknown field '{}'", field))
                    .at(field_path)
                    .detail(format!("Field '{}' is not allowed here", field))
                    .allowed_fields(self.registry.field_names()),
            );
        };

        let Value::Object(operators) = value else {
            return Err(SearchDslError::new(
                ErrorCode::FieldExpectedObject,
                format!("Field '{}' must contain an operator object", field),
            )
            .at(field_path)
            .detail(format!("Expected operator object, got {}", value_kind(value))));
        };

        let clause = FieldClause {
            field,
            descriptor,
            allowed: resolve_operators(descriptor),
        };

        // AND wins over OR; plain operator keys beside either are not read
        if let Some(key) = ["AND", "OR"].into_iter().find(|k| operators.contains_key(*k)) {
            if operators.len() > 1 {
                log::debug!(
                    "field-local {} at {} takes precedence over {} sibling key(s)",
                    key,
                    field_path,
                    operators.len() - 1
                );
            }
            return clause.parse_local_combinator(key, &operators[key], &field_path);
        }

        let ops = operators
            .iter()
            .map(|(token, raw)| {
                let op = Operator::from_token(token);
                clause.validate(op, raw, &field_path.child(token.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;

        if ops.is_empty() {
            return Err(SearchDslError::new(
                ErrorCode::FieldNoOperators,
                format!("Field '{}' must include at least one operator", field),
            )
            .at(field_path)
            .detail("Operator object was empty"));
        }

        Ok(Node::Field(FieldNode {
            field: field.to_string(),
            ops,
        }))
    }
}

/// Validation context for the operators of one field
struct FieldClause<'a> {
    field: &'a str,
    descriptor: &'a FieldDescriptor,
    allowed: &'a [Operator],
}

impl FieldClause<'_> {
    /// `{"createdAt": {"AND": [{"AFTER": ...}, {"BEFORE": ...}]}}`
    fn parse_local_combinator(&self, key: &str, value: &Value, field_path: &JsonPath) -> Result<Node> {
        let key_path = field_path.child(key);
        let elements = match value {
            Value::Array(elements) if !elements.is_empty() => elements,
            _ => {
                let message = format!(
                    "{} inside field '{}' must be a non-empty array",
                    key, self.field
                );
                return Err(
                    SearchDslError::new(ErrorCode::FieldLogicalArrayRequired, message.clone())
                        .at(key_path)
                        .detail(message),
                );
            }
        };

        let items = elements
            .iter()
            .enumerate()
            .map(|(i, element)| self.parse_single_operator(element, &key_path.child(i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(combine(key, items))
    }

    fn parse_single_operator(&self, element: &Value, element_path: &JsonPath) -> Result<Node> {
        let Value::Object(clause) = element else {
            return Err(SearchDslError::new(
                ErrorCode::FieldOperatorClauseInvalid,
                format!("Invalid operator clause for field '{}'", self.field),
            )
            .at(element_path.clone())
            .detail(format!("Expected object, got {}", value_kind(element))));
        };

        let mut entries = clause.iter();
        let (token, raw) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(SearchDslError::new(
                    ErrorCode::FieldOperatorClauseShape,
                    format!(
                        "Operator clause for field '{}' must contain exactly one operator",
                        self.field
                    ),
                )
                .at(element_path.clone())
                .detail("Expected exactly one operator key"));
            }
        };

        let op = Operator::from_token(token);
        let clause = self.validate(op, raw, &element_path.child(token.as_str()))?;
        Ok(Node::Field(FieldNode {
            field: self.field.to_string(),
            ops: vec![clause],
        }))
    }

    /// Check the operator is allowed and normalise its operand
    fn validate(&self, op: Operator, raw: &Value, op_path: &JsonPath) -> Result<OpClause> {
        let field_type = self.descriptor.field_type;

        if !self.allowed.contains(&op) {
            let allowed = self
                .allowed
                .iter()
                .map(Operator::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SearchDslError::new(
                ErrorCode::OperatorNotAllowed,
                format!(
                    "Operator '{}' not allowed for field '{}' ({})",
                    op, self.field, field_type
                ),
            )
            .at(op_path.clone())
            .detail(format!("Allowed operators: {}", allowed))
            .field(self.field)
            .field_type(field_type)
            .operator(op)
            .allowed_operators(self.allowed.to_vec()));
        }

        match validate_operand(field_type, &op, raw) {
            Ok(value) => Ok(OpClause::new(op, value)),
            Err(reason) => Err(SearchDslError::new(
                ErrorCode::OperatorValueInvalid,
                format!(
                    "Invalid value for operator '{}' on field '{}'",
                    op, self.field
                ),
            )
            .at(op_path.clone())
            .detail(reason.to_string())
            .field(self.field)
            .field_type(field_type)
            .operator(op)),
        }
    }
}

/// The single non-control key of a fragment, if there is exactly one
fn expression_key(fragment: &Map<String, Value>) -> Option<&str> {
    let mut keys = fragment
        .keys()
        .map(String::as_str)
        .filter(|k| !CONTROL_KEYS.contains(k));
    match (keys.next(), keys.next()) {
        (Some(key), None) => Some(key),
        _ => None,
    }
}

fn combine(key: &str, items: Vec<Node>) -> Node {
    if key == "AND" {
        Node::And { items }
    } else {
        Node::Or { items }
    }
}

/// One-shot parse of a decoded document
pub fn parse_search_dsl(dsl: &Value, registry: &FieldRegistry) -> Result<ParsedQuery> {
    SearchDslParser::new(registry).parse(dsl)
}

/// One-shot parse of a JSON string
pub fn parse_search_dsl_str(input: &str, registry: &FieldRegistry) -> Result<ParsedQuery> {
    SearchDslParser::new(registry).parse_str(input)
}
