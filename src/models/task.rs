//! Task handles and task parameters exchanged with the task client.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque identifier of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a task as observed at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Not resolved yet (queued, delayed, or running).
    Pending,
    /// Task finished and produced a value.
    Succeeded(Value),
    /// Task raised a failure; the cause is kept as text.
    Failed(String),
}

/// Snapshot of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Task identifier.
    pub id: TaskId,
    /// Outcome at the time the handle was produced.
    pub state: TaskState,
}

impl TaskHandle {
    /// Handle for an unresolved task.
    #[must_use]
    pub fn pending(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Pending,
        }
    }

    /// Handle for a task that produced `value`.
    #[must_use]
    pub fn succeeded(id: TaskId, value: Value) -> Self {
        Self {
            id,
            state: TaskState::Succeeded(value),
        }
    }

    /// Handle for a task that failed with `cause`.
    #[must_use]
    pub fn failed(id: TaskId, cause: impl Into<String>) -> Self {
        Self {
            id,
            state: TaskState::Failed(cause.into()),
        }
    }

    /// Whether the task has resolved, successfully or not.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !matches!(self.state, TaskState::Pending)
    }

    /// Whether the task resolved successfully.
    #[must_use]
    pub fn has_succeeded(&self) -> bool {
        matches!(self.state, TaskState::Succeeded(_))
    }
}

/// Parameters of a launch-or-resume task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    /// Name of the stack to launch or resume.
    pub stack_name: String,
    /// Training user created inside the stack.
    pub stack_user_name: String,
    /// Provider connection parameters.
    pub credentials: super::stack::ProviderCredentials,
    /// Orchestration template text.
    pub template: String,
}

/// Parameters of a suspend task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendParams {
    /// Name of the stack to suspend.
    pub stack_name: String,
    /// Provider connection parameters.
    pub credentials: super::stack::ProviderCredentials,
}
