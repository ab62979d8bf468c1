//! Rendering errors for logs and HTTP responses
//!
//! [`format_error`] turns a [`SearchDslError`] into a multi-line human
//! report and a serialisable machine payload:
//!
//! ```text
//! Unknown field 'nickname'
//! - $.AND.1.nickname: Field 'nickname' is not allowed here
//! ```

use crmq_shared::JsonPath;
use serde::Serialize;

use crate::error::{ErrorCode, ErrorContext, SearchDslError};

/// Name reported in the machine payload
pub const ERROR_NAME: &str = "SearchDslError";

/// An issue with its path pre-rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineIssue {
    /// Path as an array of keys and indices
    pub path: JsonPath,
    /// What is wrong there
    pub message: String,
    /// Path in `$.a.0.b` form
    pub path_string: String,
}

/// Machine-readable error payload
///
/// `message` is the located problem's message when there is one, otherwise
/// the top-level message; the top-level message is always the first line of
/// the human report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineError {
    /// Always [`ERROR_NAME`]
    pub name: &'static str,
    /// Most specific message available
    pub message: String,
    /// Stable error code
    pub code: ErrorCode,
    /// Location of the problem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<JsonPath>,
    /// Extra context (field, operator, allowed values, ...)
    #[serde(flatten)]
    pub context: ErrorContext,
    /// Every located problem
    pub issues: Vec<MachineIssue>,
}

/// Both renderings of an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedError {
    /// First line is the summary, then one `- $.path: message` per issue
    pub human: String,
    /// Structured payload for API clients
    pub machine: MachineError,
}

impl FormattedError {
    /// Machine payload as a JSON value
    pub fn machine_json(&self) -> serde_json::Value {
        // MachineError holds only strings, numbers, and string lists
        serde_json::to_value(&self.machine).unwrap_or(serde_json::Value::Null)
    }
}

/// Render an error for humans and machines
pub fn format_error(err: &SearchDslError) -> FormattedError {
    let issues = err.issues();

    let mut human = err.message.clone();
    for issue in &issues {
        human.push_str(&format!("\n- {}: {}", issue.path, issue.message));
    }

    let machine = MachineError {
        name: ERROR_NAME,
        message: err.detail.clone().unwrap_or_else(|| err.message.clone()),
        code: err.code,
        path: err.path.clone(),
        context: err.context.clone(),
        issues: issues
            .into_iter()
            .map(|issue| MachineIssue {
                path_string: issue.path.to_string(),
                path: issue.path,
                message: issue.message,
            })
            .collect(),
    };

    FormattedError { human, machine }
}

/// Render any error that is a [`SearchDslError`]; `None` for anything else
pub fn format_any_error(err: &(dyn std::error::Error + 'static)) -> Option<FormattedError> {
    err.downcast_ref::<SearchDslError>().map(format_error)
}
