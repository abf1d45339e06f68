//! Status envelope reported to clients for a stack.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Task submitted but not yet resolved.
pub const PENDING: &str = "PENDING";
/// Task resolved with a failure or a malformed result.
pub const ERROR: &str = "ERROR";
/// Provisioning backend could not create the stack.
pub const CREATE_FAILED: &str = "CREATE_FAILED";
/// Provisioning backend could not resume the stack.
pub const RESUME_FAILED: &str = "RESUME_FAILED";

/// Codes that must not trigger a synchronous re-verification.
const NOT_SUCCESS_SHAPED: [&str; 4] = [ERROR, PENDING, CREATE_FAILED, RESUME_FAILED];

/// Open string enumeration of stack status codes.
///
/// Anything outside the four sentinels is an opaque backend state such as
/// `CREATE_COMPLETE` or `RESUME_COMPLETE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(String);

impl StatusCode {
    /// Wrap a raw status string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Raw status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the code looks like a successful terminal state.
    #[must_use]
    pub fn is_success_shaped(&self) -> bool {
        !NOT_SUCCESS_SHAPED.contains(&self.0.as_str())
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for StatusCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Canonical `{status, errorMessage?}` shape reported to the client.
///
/// Additional keys produced by the provisioning backend are carried
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    /// Current status code.
    pub status: StatusCode,
    /// Diagnostic text for `ERROR` envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Backend-specific keys passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusEnvelope {
    /// Envelope for a task that has not resolved yet.
    #[must_use]
    pub fn pending() -> Self {
        Self::with_code(PENDING)
    }

    /// Envelope for a failed or malformed task result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::with_code(ERROR)
        }
    }

    /// Envelope carrying only a status code.
    #[must_use]
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            status: StatusCode::new(code),
            error_message: None,
            extra: Map::new(),
        }
    }

    /// Interpret a backend result mapping as an envelope.
    ///
    /// Returns `None` unless the mapping carries a string `status`, has no
    /// `error` key, and any `errorMessage` is a string.
    #[must_use]
    pub fn from_mapping(mapping: &Map<String, Value>) -> Option<Self> {
        if mapping.contains_key("error") {
            return None;
        }
        serde_json::from_value(Value::Object(mapping.clone())).ok()
    }
}
