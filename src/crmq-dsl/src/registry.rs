//! Field registry and operator resolution
//!
//! A [`FieldRegistry`] declares which fields a search endpoint exposes, the
//! type of each field, and optionally a narrower operator allow-list. It is
//! built once per endpoint and shared by every parse call against it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::control::CONTROL_KEYS;
use crate::parser::LOGICAL_KEYS;

/// Declared type of a searchable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    /// Free text
    String,
    /// Any JSON number
    Number,
    /// Timestamp, normalised to ISO-8601 UTC
    Date,
    /// `true` / `false`
    Boolean,
}

impl FieldType {
    /// Lowercase name used on the wire and in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "boolean" => Ok(FieldType::Boolean),
            other => Err(RegistryError::UnsupportedFieldType(other.to_string())),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

/// Comparison, membership or pattern test applied to a field
///
/// The twelve built-in tokens have dedicated variants. Any other token a
/// caller lists in an operator override is carried as [`Operator::Custom`];
/// the parser accepts it when the override allows it and leaves rejecting it
/// to the query compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    /// Equal (`EQ`)
    Eq,
    /// Not equal (`NEQ`)
    Neq,
    /// Less than (`LT`)
    Lt,
    /// Less than or equal (`LTE`)
    Lte,
    /// Greater than (`GT`)
    Gt,
    /// Greater than or equal (`GTE`)
    Gte,
    /// Member of a non-empty list (`IN`)
    In,
    /// Not a member of a non-empty list (`NIN`)
    Nin,
    /// Matches a pattern (`LIKE`)
    Like,
    /// Does not match a pattern (`NLIKE`)
    Nlike,
    /// Strictly earlier than a date (`BEFORE`)
    Before,
    /// Strictly later than a date (`AFTER`)
    After,
    /// Caller-declared token with no built-in meaning
    Custom(String),
}

impl Operator {
    /// The wire token
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::In => "IN",
            Operator::Nin => "NIN",
            Operator::Like => "LIKE",
            Operator::Nlike => "NLIKE",
            Operator::Before => "BEFORE",
            Operator::After => "AFTER",
            Operator::Custom(token) => token,
        }
    }

    /// Map a wire token to an operator. Unknown tokens become `Custom`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "EQ" => Operator::Eq,
            "NEQ" => Operator::Neq,
            "LT" => Operator::Lt,
            "LTE" => Operator::Lte,
            "GT" => Operator::Gt,
            "GTE" => Operator::Gte,
            "IN" => Operator::In,
            "NIN" => Operator::Nin,
            "LIKE" => Operator::Like,
            "NLIKE" => Operator::Nlike,
            "BEFORE" => Operator::Before,
            "AFTER" => Operator::After,
            other => Operator::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Operator::from_token(s))
    }
}

impl From<&str> for Operator {
    fn from(token: &str) -> Self {
        Operator::from_token(token)
    }
}

impl From<String> for Operator {
    fn from(token: String) -> Self {
        Operator::from_token(&token)
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Custom(token) => token,
            other => other.as_str().to_string(),
        }
    }
}

const STRING_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Neq,
    Operator::In,
    Operator::Nin,
    Operator::Like,
    Operator::Nlike,
];

const NUMBER_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Neq,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::In,
    Operator::Nin,
];

const DATE_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Neq,
    Operator::Before,
    Operator::After,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
];

const BOOLEAN_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Neq];

/// Default operator set for a declared type
pub fn default_operators(field_type: FieldType) -> &'static [Operator] {
    match field_type {
        FieldType::String => STRING_OPERATORS,
        FieldType::Number => NUMBER_OPERATORS,
        FieldType::Date => DATE_OPERATORS,
        FieldType::Boolean => BOOLEAN_OPERATORS,
    }
}

/// Operators legal for a field: its non-empty override verbatim, otherwise
/// the type default.
pub fn resolve_operators(descriptor: &FieldDescriptor) -> &[Operator] {
    match descriptor.operators.as_deref() {
        Some(ops) if !ops.is_empty() => ops,
        _ => default_operators(descriptor.field_type),
    }
}

/// Declaration of one searchable field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Optional operator allow-list replacing the type default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<Operator>>,
}

impl FieldDescriptor {
    /// Descriptor using the type's default operators
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            operators: None,
        }
    }

    /// Descriptor with an explicit operator allow-list
    pub fn with_operators<I, O>(field_type: FieldType, operators: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Operator>,
    {
        Self {
            field_type,
            operators: Some(operators.into_iter().map(Into::into).collect()),
        }
    }

    /// Operators legal for this field
    pub fn allowed_operators(&self) -> &[Operator] {
        resolve_operators(self)
    }
}

/// Errors raised while declaring a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Type name outside `string`, `number`, `date`, `boolean`
    #[error("Unsupported field type '{0}'")]
    UnsupportedFieldType(String),
    /// The same field name declared twice
    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),
    /// Empty field name
    #[error("Field names must not be empty")]
    EmptyFieldName,
    /// Field name that collides with a logical or control key
    #[error("Field name '{0}' is reserved by the search DSL")]
    ReservedFieldName(String),
    /// Empty operator token in an override
    #[error("Field '{0}' declares an empty operator token")]
    EmptyOperator(String),
}

/// Ordered mapping from field name to descriptor
///
/// Declaration order is preserved and reported back to callers as
/// `allowedFields` in diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, FieldDescriptor>",
    into = "IndexMap<String, FieldDescriptor>"
)]
pub struct FieldRegistry {
    fields: IndexMap<String, FieldDescriptor>,
}

impl FieldRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start declaring a registry field by field
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::default()
    }

    /// Declare a field
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        descriptor: FieldDescriptor,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyFieldName);
        }
        if LOGICAL_KEYS.contains(&name.as_str()) || CONTROL_KEYS.contains(&name.as_str()) {
            return Err(RegistryError::ReservedFieldName(name));
        }
        if self.fields.contains_key(&name) {
            return Err(RegistryError::DuplicateField(name));
        }
        if let Some(ops) = &descriptor.operators {
            if ops.iter().any(|op| op.as_str().is_empty()) {
                return Err(RegistryError::EmptyOperator(name));
            }
        }
        self.fields.insert(name, descriptor);
        Ok(())
    }

    /// Descriptor for a field, if declared
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// Whether a field is declared
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Operators legal for a declared field
    pub fn allowed_operators(&self, name: &str) -> Option<&[Operator]> {
        self.get(name).map(resolve_operators)
    }

    /// Iterate fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<IndexMap<String, FieldDescriptor>> for FieldRegistry {
    type Error = RegistryError;

    fn try_from(map: IndexMap<String, FieldDescriptor>) -> Result<Self, Self::Error> {
        let mut registry = FieldRegistry::new();
        for (name, descriptor) in map {
            registry.insert(name, descriptor)?;
        }
        Ok(registry)
    }
}

impl From<FieldRegistry> for IndexMap<String, FieldDescriptor> {
    fn from(registry: FieldRegistry) -> Self {
        registry.fields
    }
}

/// Builder for [`FieldRegistry`]; the first declaration error is reported by
/// [`FieldRegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct FieldRegistryBuilder {
    registry: FieldRegistry,
    error: Option<RegistryError>,
}

impl FieldRegistryBuilder {
    /// Declare a field with the type's default operators
    #[must_use]
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.descriptor(name, FieldDescriptor::new(field_type))
    }

    /// Declare a field with an explicit operator allow-list
    #[must_use]
    pub fn field_with_operators<I, O>(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        operators: I,
    ) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Operator>,
    {
        self.descriptor(name, FieldDescriptor::with_operators(field_type, operators))
    }

    /// Declare a field from a ready-made descriptor
    #[must_use]
    pub fn descriptor(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.insert(name, descriptor) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Finish the registry
    pub fn build(self) -> Result<FieldRegistry, RegistryError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(ops: &[Operator]) -> Vec<&str> {
        ops.iter().map(Operator::as_str).collect()
    }

    #[test]
    fn test_default_operator_table() {
        assert_eq!(
            tokens(default_operators(FieldType::String)),
            vec!["EQ", "NEQ", "IN", "NIN", "LIKE", "NLIKE"]
        );
        assert_eq!(
            tokens(default_operators(FieldType::Number)),
            vec!["EQ", "NEQ", "LT", "LTE", "GT", "GTE", "IN", "NIN"]
        );
        assert_eq!(
            tokens(default_operators(FieldType::Date)),
            vec!["EQ", "NEQ", "BEFORE", "AFTER", "LT", "LTE", "GT", "GTE"]
        );
        assert_eq!(tokens(default_operators(FieldType::Boolean)), vec!["EQ", "NEQ"]);
    }

    #[test]
    fn test_resolve_without_override_uses_default() {
        for ty in [
            FieldType::String,
            FieldType::Number,
            FieldType::Date,
            FieldType::Boolean,
        ] {
            assert_eq!(
                resolve_operators(&FieldDescriptor::new(ty)),
                default_operators(ty)
            );
        }
    }

    #[test]
    fn test_resolve_override_is_verbatim() {
        let desc = FieldDescriptor::with_operators(FieldType::Number, ["LIKE", "EQ", "BETWEEN"]);
        assert_eq!(tokens(resolve_operators(&desc)), vec!["LIKE", "EQ", "BETWEEN"]);
        assert_eq!(
            resolve_operators(&desc)[2],
            Operator::Custom("BETWEEN".to_string())
        );
    }

    #[test]
    fn test_empty_override_falls_back() {
        let desc = FieldDescriptor {
            field_type: FieldType::Boolean,
            operators: Some(vec![]),
        };
        assert_eq!(tokens(resolve_operators(&desc)), vec!["EQ", "NEQ"]);
    }

    #[test]
    fn test_operator_token_roundtrip() {
        for token in ["EQ", "NEQ", "LT", "LTE", "GT", "GTE", "IN", "NIN", "LIKE", "NLIKE", "BEFORE", "AFTER"] {
            let op = Operator::from_token(token);
            assert!(!matches!(op, Operator::Custom(_)), "{token} should be built in");
            assert_eq!(op.as_str(), token);
        }
        assert_eq!(Operator::from_token("eq"), Operator::Custom("eq".to_string()));
    }

    #[test]
    fn test_builder_preserves_order() {
        let registry = FieldRegistry::builder()
            .field("name", FieldType::String)
            .field("age", FieldType::Number)
            .field_with_operators("status", FieldType::String, ["EQ", "IN"])
            .build()
            .unwrap();
        assert_eq!(registry.field_names(), vec!["name", "age", "status"]);
        assert_eq!(
            tokens(registry.allowed_operators("status").unwrap()),
            vec!["EQ", "IN"]
        );
        assert!(registry.allowed_operators("missing").is_none());
    }

    #[test]
    fn test_builder_rejects_duplicates_and_reserved_names() {
        let err = FieldRegistry::builder()
            .field("name", FieldType::String)
            .field("name", FieldType::Number)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateField("name".to_string()));

        let err = FieldRegistry::builder()
            .field("ORDER", FieldType::String)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::ReservedFieldName("ORDER".to_string()));

        let err = FieldRegistry::builder()
            .field("", FieldType::String)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyFieldName);
    }

    #[test]
    fn test_deserialize_from_json() {
        let registry: FieldRegistry = serde_json::from_value(serde_json::json!({
            "email": {"type": "string"},
            "createdAt": {"type": "date"},
            "status": {"type": "string", "operators": ["EQ", "NEQ", "IN", "NIN"]}
        }))
        .unwrap();
        assert_eq!(registry.field_names(), vec!["email", "createdAt", "status"]);
        assert_eq!(registry.get("createdAt").unwrap().field_type, FieldType::Date);
    }

    #[test]
    fn test_deserialize_unsupported_type() {
        let err = serde_json::from_value::<FieldRegistry>(serde_json::json!({
            "blob": {"type": "binary"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported field type 'binary'"));
    }

    #[test]
    fn test_deserialize_from_toml_keeps_order() {
        let registry: FieldRegistry = toml::from_str(
            r#"
            zeta = { type = "string" }
            alpha = { type = "number" }
            mid = { type = "boolean" }
            "#,
        )
        .unwrap();
        assert_eq!(registry.field_names(), vec!["zeta", "alpha", "mid"]);
    }
}
