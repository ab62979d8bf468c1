//! Control keys: `ORDER`, `LIMIT` and `OFFSET`
//!
//! Control keys may sit next to the expression key of any fragment. Their
//! shape is checked wherever they appear; every problem is collected so a
//! client sees all of them in one response.

use crmq_shared::{value_kind, JsonPath};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Issue;

/// Keys reserved for sorting and pagination
pub const CONTROL_KEYS: [&str; 3] = ["ORDER", "LIMIT", "OFFSET"];

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending order
    #[serde(rename = "ASC")]
    Asc,
    /// Descending order
    #[serde(rename = "DESC")]
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

/// One sort key; serialises as the single-key map `{"field": "ASC"}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    /// Field to sort by (not checked against the registry)
    pub field: String,
    /// Sort direction
    pub direction: Direction,
}

impl OrderItem {
    /// New sort key
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

impl Serialize for OrderItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.direction)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let entries = BTreeMap::<String, Direction>::deserialize(deserializer)?;
        let mut entries = entries.into_iter();
        match (entries.next(), entries.next()) {
            (Some((field, direction)), None) => Ok(OrderItem::new(field, direction)),
            _ => Err(D::Error::custom(
                "sort key must be a single {\"field\": \"ASC\" | \"DESC\"} entry",
            )),
        }
    }
}

/// Control values found on one fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlSpec {
    /// `ORDER`, flattened to one entry per field
    pub order: Option<Vec<OrderItem>>,
    /// `LIMIT`
    pub limit: Option<u64>,
    /// `OFFSET`
    pub offset: Option<u64>,
}

impl ControlSpec {
    /// Whether no control key was present
    pub fn is_empty(&self) -> bool {
        self.order.is_none() && self.limit.is_none() && self.offset.is_none()
    }
}

/// Validate the control keys of a fragment
///
/// Issue paths are relative to the fragment. Keys other than the three
/// control keys are ignored.
pub fn validate_control(fragment: &Map<String, Value>) -> Result<ControlSpec, Vec<Issue>> {
    let mut issues = Vec::new();
    let mut spec = ControlSpec::default();

    if let Some(order) = fragment.get("ORDER") {
        spec.order = validate_order(order, &mut issues);
    }

    if let Some(limit) = fragment.get("LIMIT") {
        let path = JsonPath::root().child("LIMIT");
        match integer(limit) {
            Ok(Integer::NonNegative(n)) if n > 0 => spec.limit = Some(n),
            Ok(_) => issues.push(Issue::new(path, "Number must be greater than 0")),
            Err(reason) => issues.push(Issue::new(path, reason)),
        }
    }

    if let Some(offset) = fragment.get("OFFSET") {
        let path = JsonPath::root().child("OFFSET");
        match integer(offset) {
            Ok(Integer::NonNegative(n)) => spec.offset = Some(n),
            Ok(Integer::Negative) => issues.push(Issue::new(
                path,
                "Number must be greater than or equal to 0",
            )),
            Err(reason) => issues.push(Issue::new(path, reason)),
        }
    }

    if issues.is_empty() {
        Ok(spec)
    } else {
        Err(issues)
    }
}

fn validate_order(order: &Value, issues: &mut Vec<Issue>) -> Option<Vec<OrderItem>> {
    let base = JsonPath::root().child("ORDER");
    let before = issues.len();
    let mut items = Vec::new();

    match order {
        Value::Object(entries) => collect_order_entries(entries, &base, &mut items, issues),
        Value::Array(elements) => {
            for (i, element) in elements.iter().enumerate() {
                match element {
                    Value::Object(entries) => {
                        collect_order_entries(entries, &base.child(i), &mut items, issues);
                    }
                    other => issues.push(Issue::new(
                        base.child(i),
                        format!("Expected object, received {}", value_kind(other)),
                    )),
                }
            }
        }
        other => issues.push(Issue::new(
            base,
            format!(
                "Expected object or array of objects, received {}",
                value_kind(other)
            ),
        )),
    }

    (issues.len() == before).then_some(items)
}

fn collect_order_entries(
    entries: &Map<String, Value>,
    path: &JsonPath,
    items: &mut Vec<OrderItem>,
    issues: &mut Vec<Issue>,
) {
    for (field, direction) in entries {
        match direction.as_str() {
            Some("ASC") => items.push(OrderItem::new(field.clone(), Direction::Asc)),
            Some("DESC") => items.push(OrderItem::new(field.clone(), Direction::Desc)),
            Some(other) => issues.push(Issue::new(
                path.child(field.as_str()),
                format!(
                    "Invalid enum value. Expected 'ASC' | 'DESC', received '{}'",
                    other
                ),
            )),
            None => issues.push(Issue::new(
                path.child(field.as_str()),
                format!(
                    "Expected 'ASC' | 'DESC', received {}",
                    value_kind(direction)
                ),
            )),
        }
    }
}

enum Integer {
    NonNegative(u64),
    Negative,
}

/// Accept integral JSON numbers, including floats such as `10.0`
fn integer(value: &Value) -> Result<Integer, String> {
    let number = match value {
        Value::Number(n) => n,
        other => return Err(format!("Expected number, received {}", value_kind(other))),
    };
    classify(number)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn classify(number: &Number) -> Result<Integer, String> {
    if let Some(n) = number.as_u64() {
        return Ok(Integer::NonNegative(n));
    }
    if number.as_i64().is_some() {
        return Ok(Integer::Negative);
    }
    let f = number.as_f64().unwrap_or(f64::NAN);
    if f.fract() != 0.0 || !f.is_finite() {
        return Err("Expected integer, received float".to_string());
    }
    if f < 0.0 {
        return Ok(Integer::Negative);
    }
    // saturates at u64::MAX; compilers clamp or reject from there
    Ok(Integer::NonNegative(f as u64))
}
