//! Operand validation and normalisation
//!
//! [`validate_operand`] checks the raw JSON value given to an operator
//! against the field's declared type and returns the value to store in the
//! AST. Dates come back as `YYYY-MM-DDTHH:MM:SS.sssZ` strings; everything
//! else is returned unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::registry::{FieldType, Operator};

/// Why an operand was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOperand {
    /// `IN` / `NIN` got a non-array
    #[error("Expected an array")]
    ExpectedArray,
    /// `IN` / `NIN` got `[]`
    #[error("Array must be non-empty")]
    EmptyArray,
    /// One element of an `IN` / `NIN` list failed
    #[error("Bad element at index {index}: {reason}")]
    BadElement {
        /// Position of the element
        index: usize,
        /// Why the element failed
        reason: Box<InvalidOperand>,
    },
    /// `LIKE` / `NLIKE` got a non-string
    #[error("Expected a string pattern")]
    ExpectedPattern,
    /// String field got a non-string
    #[error("Expected a string")]
    ExpectedString,
    /// Number field got a non-number
    #[error("Expected a number")]
    ExpectedNumber,
    /// Boolean field got a non-boolean
    #[error("Expected a boolean")]
    ExpectedBoolean,
    /// Date operand was a string no supported format accepts
    #[error("Invalid date string")]
    InvalidDateString,
    /// Date operand was neither a string nor a date
    #[error("Expected date string or Date")]
    ExpectedDate,
}

/// Validate `raw` as the operand of `op` on a field of type `field_type`
pub fn validate_operand(
    field_type: FieldType,
    op: &Operator,
    raw: &Value,
) -> Result<Value, InvalidOperand> {
    match op {
        Operator::In | Operator::Nin => {
            let items = raw.as_array().ok_or(InvalidOperand::ExpectedArray)?;
            if items.is_empty() {
                return Err(InvalidOperand::EmptyArray);
            }
            let normalized = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    validate_operand(field_type, &Operator::Eq, item).map_err(|reason| {
                        InvalidOperand::BadElement {
                            index,
                            reason: Box::new(reason),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(normalized))
        }
        Operator::Like | Operator::Nlike => match raw {
            Value::String(_) => Ok(raw.clone()),
            _ => Err(InvalidOperand::ExpectedPattern),
        },
        Operator::Before | Operator::After => coerce_date_to_iso(raw).map(Value::String),
        _ => validate_scalar(field_type, raw),
    }
}

/// Comparator / equality operand for each declared type
fn validate_scalar(field_type: FieldType, raw: &Value) -> Result<Value, InvalidOperand> {
    match field_type {
        FieldType::String => match raw {
            Value::String(_) => Ok(raw.clone()),
            _ => Err(InvalidOperand::ExpectedString),
        },
        // serde_json numbers are always finite
        FieldType::Number => match raw {
            Value::Number(_) => Ok(raw.clone()),
            _ => Err(InvalidOperand::ExpectedNumber),
        },
        FieldType::Boolean => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            _ => Err(InvalidOperand::ExpectedBoolean),
        },
        FieldType::Date => coerce_date_to_iso(raw).map(Value::String),
    }
}

/// Offset-less layouts, read as UTC
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%MZ",
];

/// Layouts with a numeric offset that RFC 3339 does not cover
const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
];

/// Parse a date string or pass through an already-serialised date and
/// return it as an ISO-8601 UTC string with millisecond precision.
pub fn coerce_date_to_iso(raw: &Value) -> Result<String, InvalidOperand> {
    let text = match raw {
        Value::String(s) => s.trim(),
        _ => return Err(InvalidOperand::ExpectedDate),
    };

    let parsed = parse_date(text).ok_or(InvalidOperand::InvalidDateString)?;
    let iso = parsed.to_rfc3339_opts(SecondsFormat::Millis, true);
    log::trace!("normalised date '{}' to '{}'", text, iso);
    Ok(iso)
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    parse_calendar_date(text)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `YYYY-MM-DD`, or the reduced `YYYY-MM` / `YYYY` forms naming the first day
fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    if !text.is_ascii() {
        return None;
    }
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    match text.len() {
        10 => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        7 if digits(&text[..4]) && &text[4..5] == "-" && digits(&text[5..]) => {
            NaiveDate::from_ymd_opt(text[..4].parse().ok()?, text[5..].parse().ok()?, 1)
        }
        4 if digits(text) => NaiveDate::from_ymd_opt(text.parse().ok()?, 1, 1),
        _ => None,
    }
}
