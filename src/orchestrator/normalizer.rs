//! Task outcome to status envelope normalization.

use serde_json::Value;

use crate::models::status::StatusEnvelope;
use crate::models::task::{TaskHandle, TaskState};

/// Prefix of the diagnostic attached to `ERROR` envelopes.
pub const UNEXPECTED_RESULT: &str = "Unexpected result: ";

/// Classify a task handle as pending, success, or error.
///
/// A successful task must produce a mapping with a string `status` and no
/// `error` key; anything else is reported as `ERROR` with the textual form
/// of the offending value.
#[must_use]
pub fn normalize(handle: &TaskHandle) -> StatusEnvelope {
    match &handle.state {
        TaskState::Pending => StatusEnvelope::pending(),
        TaskState::Succeeded(Value::Object(mapping)) => StatusEnvelope::from_mapping(mapping)
            .unwrap_or_else(|| unexpected(&Value::Object(mapping.clone()).to_string())),
        TaskState::Succeeded(value) => unexpected(&value.to_string()),
        TaskState::Failed(cause) => unexpected(cause),
    }
}

fn unexpected(text: &str) -> StatusEnvelope {
    StatusEnvelope::error(format!("{UNEXPECTED_RESULT}{text}"))
}
