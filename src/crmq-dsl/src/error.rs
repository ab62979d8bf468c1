//! Error types for the search DSL
//!
//! Every failure, whether raised by the parser or by a downstream query
//! compiler, is a [`SearchDslError`] carrying a stable [`ErrorCode`], the
//! JSON path of the offending value and any context a client needs to fix
//! the request (allowed fields, allowed operators, ...).

use crmq_shared::JsonPath;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::{FieldType, Operator};

/// Stable, machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The document was supplied as text and is not valid JSON
    #[serde(rename = "DSL_INVALID_JSON")]
    InvalidJson,
    /// A fragment is not a JSON object
    #[serde(rename = "DSL_INVALID_FRAGMENT")]
    InvalidFragment,
    /// A fragment does not have exactly one expression key
    #[serde(rename = "DSL_INVALID_FRAGMENT_SHAPE")]
    InvalidFragmentShape,
    /// `ORDER`, `LIMIT` or `OFFSET` has the wrong shape
    #[serde(rename = "DSL_INVALID_CONTROL_KEYS")]
    InvalidControlKeys,
    /// `AND` / `OR` is not a non-empty array
    #[serde(rename = "DSL_LOGICAL_ARRAY_REQUIRED")]
    LogicalArrayRequired,
    /// `NOT` received an array
    #[serde(rename = "DSL_NOT_ARRAY")]
    NotArray,
    /// Field-local `AND` / `OR` is not a non-empty array
    #[serde(rename = "DSL_FIELD_LOGICAL_ARRAY_REQUIRED")]
    FieldLogicalArrayRequired,
    /// Field-local clause is not an object
    #[serde(rename = "DSL_FIELD_OPERATOR_CLAUSE_INVALID")]
    FieldOperatorClauseInvalid,
    /// Field-local clause does not hold exactly one operator
    #[serde(rename = "DSL_FIELD_OPERATOR_CLAUSE_SHAPE")]
    FieldOperatorClauseShape,
    /// Field is not declared in the registry
    #[serde(rename = "DSL_UNKNOWN_FIELD")]
    UnknownField,
    /// A serialised AST node has an unrecognised `kind`
    #[serde(rename = "DSL_UNKNOWN_NODE_KIND")]
    UnknownNodeKind,
    /// An `ORDER` entry names a field the compiler cannot sort by
    #[serde(rename = "DSL_ORDER_FIELD_UNKNOWN")]
    OrderFieldUnknown,
    /// A field's value is not an operator object
    #[serde(rename = "DSL_FIELD_EXPECTED_OBJECT")]
    FieldExpectedObject,
    /// Operator not in the field's allow-list
    #[serde(rename = "DSL_OPERATOR_NOT_ALLOWED")]
    OperatorNotAllowed,
    /// Operand does not match the field type / operator
    #[serde(rename = "DSL_OPERATOR_VALUE_INVALID")]
    OperatorValueInvalid,
    /// Operator object has no keys
    #[serde(rename = "DSL_FIELD_NO_OPERATORS")]
    FieldNoOperators,
    /// Operator accepted by the parser but not translatable by a compiler
    #[serde(rename = "DSL_OPERATOR_NOT_SUPPORTED")]
    OperatorNotSupported,
    /// Document nesting exceeds the configured maximum depth
    #[serde(rename = "DSL_MAX_DEPTH_EXCEEDED")]
    MaxDepthExceeded,
}

impl ErrorCode {
    /// The wire code, e.g. `DSL_UNKNOWN_FIELD`
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "DSL_INVALID_JSON",
            ErrorCode::InvalidFragment => "DSL_INVALID_FRAGMENT",
            ErrorCode::InvalidFragmentShape => "DSL_INVALID_FRAGMENT_SHAPE",
            ErrorCode::InvalidControlKeys => "DSL_INVALID_CONTROL_KEYS",
            ErrorCode::LogicalArrayRequired => "DSL_LOGICAL_ARRAY_REQUIRED",
            ErrorCode::NotArray => "DSL_NOT_ARRAY",
            ErrorCode::FieldLogicalArrayRequired => "DSL_FIELD_LOGICAL_ARRAY_REQUIRED",
            ErrorCode::FieldOperatorClauseInvalid => "DSL_FIELD_OPERATOR_CLAUSE_INVALID",
            ErrorCode::FieldOperatorClauseShape => "DSL_FIELD_OPERATOR_CLAUSE_SHAPE",
            ErrorCode::UnknownField => "DSL_UNKNOWN_FIELD",
            ErrorCode::UnknownNodeKind => "DSL_UNKNOWN_NODE_KIND",
            ErrorCode::OrderFieldUnknown => "DSL_ORDER_FIELD_UNKNOWN",
            ErrorCode::FieldExpectedObject => "DSL_FIELD_EXPECTED_OBJECT",
            ErrorCode::OperatorNotAllowed => "DSL_OPERATOR_NOT_ALLOWED",
            ErrorCode::OperatorValueInvalid => "DSL_OPERATOR_VALUE_INVALID",
            ErrorCode::FieldNoOperators => "DSL_FIELD_NO_OPERATORS",
            ErrorCode::OperatorNotSupported => "DSL_OPERATOR_NOT_SUPPORTED",
            ErrorCode::MaxDepthExceeded => "DSL_MAX_DEPTH_EXCEEDED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One located problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Where the problem is, from the document root
    pub path: JsonPath,
    /// What is wrong there
    pub message: String,
}

impl Issue {
    /// New issue
    pub fn new(path: JsonPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

/// Optional context attached to an error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// Field the error concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Declared type of that field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// Operator the error concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    /// Operators the field accepts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_operators: Option<Vec<Operator>>,
    /// Fields the registry (or compiler) accepts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_fields: Option<Vec<String>>,
    /// Unrecognised AST node kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Configured nesting limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// A search DSL failure
///
/// `message` is the one-line summary; `detail` is the message for the
/// located issue at `path`. `issues` is set when several problems were
/// collected at once (control keys).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDslError {
    /// Stable error code
    pub code: ErrorCode,
    /// Top-level human message
    pub message: String,
    /// Location of the problem, when known
    pub path: Option<JsonPath>,
    /// Message for the located problem
    pub detail: Option<String>,
    /// Every collected problem, when more than one may apply
    pub issues: Option<Vec<Issue>>,
    /// Extra context
    pub context: ErrorContext,
}

impl SearchDslError {
    /// New error with a code and a top-level message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            detail: None,
            issues: None,
            context: ErrorContext::default(),
        }
    }

    /// Locate the error
    #[must_use]
    pub fn at(mut self, path: JsonPath) -> Self {
        self.path = Some(path);
        self
    }

    /// Attach the message for the located problem
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the collected issue list
    #[must_use]
    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = Some(issues);
        self
    }

    /// Attach the field name
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Attach the declared field type
    #[must_use]
    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.context.field_type = Some(field_type);
        self
    }

    /// Attach the operator
    #[must_use]
    pub fn operator(mut self, operator: Operator) -> Self {
        self.context.operator = Some(operator);
        self
    }

    /// Attach the operators the field accepts
    #[must_use]
    pub fn allowed_operators(mut self, operators: Vec<Operator>) -> Self {
        self.context.allowed_operators = Some(operators);
        self
    }

    /// Attach the fields that are accepted
    #[must_use]
    pub fn allowed_fields(mut self, fields: Vec<String>) -> Self {
        self.context.allowed_fields = Some(fields);
        self
    }

    /// Attach an unrecognised node kind
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.context.kind = Some(kind.into());
        self
    }

    /// Attach the configured nesting limit
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.context.max_depth = Some(max_depth);
        self
    }

    /// Issues to report: the collected list, or the single located problem
    pub fn issues(&self) -> Vec<Issue> {
        if let Some(issues) = &self.issues {
            return issues.clone();
        }
        match &self.path {
            Some(path) => vec![Issue::new(
                path.clone(),
                self.detail.clone().unwrap_or_else(|| self.message.clone()),
            )],
            None => Vec::new(),
        }
    }
}

impl fmt::Display for SearchDslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SearchDslError {}

/// Result type for search DSL operations
pub type Result<T> = std::result::Result<T, SearchDslError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_code_serializes_as_wire_string() {
        assert_eq!(
            serde_json::to_value(ErrorCode::NotArray).unwrap(),
            serde_json::json!("DSL_NOT_ARRAY")
        );
        assert_eq!(ErrorCode::UnknownField.to_string(), "DSL_UNKNOWN_FIELD");
    }

    #[test]
    fn test_issues_fall_back_to_located_problem() {
        let err = SearchDslError::new(ErrorCode::UnknownField, "Unknown field 'x'")
            .at(JsonPath::root().child("x"))
            .detail("Field 'x' is not allowed here");
        assert_eq!(
            err.issues(),
            vec![Issue::new(
                JsonPath::root().child("x"),
                "Field 'x' is not allowed here"
            )]
        );
    }

    #[test]
    fn test_issues_use_top_message_without_detail() {
        let err = SearchDslError::new(ErrorCode::NotArray, "NOT accepts exactly one expression")
            .at(JsonPath::root());
        assert_eq!(err.issues()[0].message, "NOT accepts exactly one expression");
    }

    #[test]
    fn test_unlocated_error_has_no_issues() {
        let err = SearchDslError::new(ErrorCode::InvalidJson, "searchDsl must be valid JSON")
            .detail("EOF while parsing");
        assert!(err.issues().is_empty());
        assert_eq!(err.to_string(), "searchDsl must be valid JSON");
    }
}
