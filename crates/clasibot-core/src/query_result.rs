//! Uniform outcome envelope returned by every boundary-crossing operation

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{result, message, detail}` envelope
///
/// `message` is a human-readable summary, `detail` carries diagnostics or a
/// serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub result: QueryStatus,
    pub message: String,
    pub detail: String,
}

impl QueryResult {
    pub fn success(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            result: QueryStatus::Success,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn error(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            result: QueryStatus::Error,
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Success envelope with a JSON-serialized payload as detail
    pub fn with_payload<T: Serialize>(message: impl Into<String>, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(detail) => Self::success(message, detail),
            Err(e) => Self::error("Failed to serialize result payload", e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == QueryStatus::Success
    }

    /// Translate a ledger response body into an envelope
    ///
    /// Structured faults (`{"Fault": {"Error": [{"Message", "Detail"}]}}`) keep the
    /// first error's message and detail; anything else is kept verbatim as detail.
    pub fn from_fault(context: &str, body: &str) -> Self {
        match LedgerFaultBody::parse(body) {
            Some((message, detail)) => Self::error(message, detail),
            None => Self::error(context, body),
        }
    }
}

impl From<&Error> for QueryResult {
    fn from(err: &Error) -> Self {
        match err {
            Error::LedgerFault { message, detail } => Self::error(message.clone(), detail.clone()),
            Error::SessionFailure(detail) => Self::error("Synthetic login failed", detail.clone()),
            Error::SourceUnavailable(detail) => {
                Self::error("Classification source unavailable", detail.clone())
            }
            Error::Configuration(detail) => Self::error("Missing configuration", detail.clone()),
            Error::Timeout(detail) => Self::error("Request timed out", detail.clone()),
            other => Self::error("An unexpected error occurred", other.to_string()),
        }
    }
}

impl From<Error> for QueryResult {
    fn from(err: Error) -> Self {
        QueryResult::from(&err)
    }
}

/// Ledger fault wire format
#[derive(Debug, Deserialize)]
pub(crate) struct LedgerFaultBody {
    #[serde(rename = "Fault")]
    fault: FaultInner,
}

#[derive(Debug, Deserialize)]
struct FaultInner {
    #[serde(rename = "Error", default)]
    errors: Vec<FaultError>,
}

#[derive(Debug, Deserialize)]
struct FaultError {
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Detail", default)]
    detail: String,
}

impl LedgerFaultBody {
    /// Extract `(message, detail)` of the first fault error, if the body is a fault
    pub(crate) fn parse(body: &str) -> Option<(String, String)> {
        let parsed: LedgerFaultBody = serde_json::from_str(body).ok()?;
        parsed
            .fault
            .errors
            .into_iter()
            .next()
            .map(|e| (e.message, e.detail))
    }
}
