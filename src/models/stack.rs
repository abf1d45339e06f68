//! Per-student stack record and helpers.

use std::fmt::{Debug, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::StatusEnvelope;
use super::task::{LaunchParams, SuspendParams, TaskId};

/// External identity of a stack record: one stack per user per course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StackKey {
    /// Course identifier (opaque).
    pub course_id: String,
    /// Anonymous student identifier (opaque).
    pub user_id: String,
}

impl StackKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(course_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Provider-side stack name derived from the key.
    #[must_use]
    pub fn stack_name(&self) -> String {
        format!("{}_{}", self.course_id, self.user_id)
    }
}

/// Cloud provider connection parameters.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// Identity service endpoint.
    pub auth_url: String,
    /// Tenant (project) name.
    pub tenant_name: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Debug for ProviderCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("auth_url", &self.auth_url)
            .field("tenant_name", &self.tenant_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Durable per-student stack state.
///
/// The orchestrator owns the record for the duration of one request; the
/// store loads it before and writes it back after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRecord {
    /// Store key.
    pub key: StackKey,
    /// Provider-side stack name.
    pub stack_name: String,
    /// Training user inside the stack.
    pub stack_user_name: String,
    /// Orchestration template text.
    pub template_content: String,
    /// In-flight launch/resume task, if any.
    pub launch_task_id: Option<TaskId>,
    /// Pending auto-suspend task, if any.
    pub suspend_task_id: Option<TaskId>,
    /// Last known status.
    pub status: Option<StatusEnvelope>,
    /// Provider credentials supplied by the caller; never persisted.
    pub credentials: ProviderCredentials,
    /// Last time the record was written.
    pub updated_at: DateTime<Utc>,
}

impl StackRecord {
    /// Fresh record with no tasks and no status.
    #[must_use]
    pub fn new(key: StackKey) -> Self {
        Self {
            stack_name: key.stack_name(),
            key,
            stack_user_name: String::new(),
            template_content: String::new(),
            launch_task_id: None,
            suspend_task_id: None,
            status: None,
            credentials: ProviderCredentials::default(),
            updated_at: Utc::now(),
        }
    }

    /// Attach provider credentials for the current request.
    #[must_use]
    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Whether a launch/resume task is currently recorded as in flight.
    #[must_use]
    pub fn has_launch_in_flight(&self) -> bool {
        self.launch_task_id.is_some()
    }

    /// Parameters for a launch-or-resume task on this stack.
    #[must_use]
    pub fn launch_params(&self) -> LaunchParams {
        LaunchParams {
            stack_name: self.stack_name.clone(),
            stack_user_name: self.stack_user_name.clone(),
            credentials: self.credentials.clone(),
            template: self.template_content.clone(),
        }
    }

    /// Parameters for a suspend task on this stack.
    #[must_use]
    pub fn suspend_params(&self) -> SuspendParams {
        SuspendParams {
            stack_name: self.stack_name.clone(),
            credentials: self.credentials.clone(),
        }
    }
}
