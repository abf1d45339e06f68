//! Task client abstraction for launch-or-resume and suspend work.
//!
//! The [`TaskClient`] trait decouples the lifecycle orchestrator from the
//! machinery that actually executes provisioning work. The orchestrator
//! only submits, polls, and revokes; where and how the work runs is the
//! implementation's concern.

pub mod local;
pub mod provisioner;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::models::task::{LaunchParams, SuspendParams, TaskHandle, TaskId};
use crate::Result;

/// Boxed future returned by task client and provisioner methods.
pub type TaskFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Interface to the executor of stack provisioning tasks.
pub trait TaskClient: Send + Sync {
    /// Submit a launch-or-resume task.
    ///
    /// When `synchronous` is set, the returned handle is already ready:
    /// the call resolves only after the work has finished. Otherwise the
    /// handle is typically pending and must be polled with [`fetch`](Self::fetch).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) if the task cannot
    /// be submitted.
    fn submit_launch_or_resume(
        &self,
        params: LaunchParams,
        synchronous: bool,
    ) -> TaskFuture<'_, Result<TaskHandle>>;

    /// Schedule a suspend task to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) if the task cannot
    /// be submitted.
    fn submit_suspend(
        &self,
        params: SuspendParams,
        delay: Duration,
    ) -> TaskFuture<'_, Result<TaskHandle>>;

    /// Fetch the current state of a previously submitted task.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) if the executor
    /// cannot be reached.
    fn fetch(&self, id: &TaskId) -> TaskFuture<'_, Result<TaskHandle>>;

    /// Best-effort cancellation of a task.
    ///
    /// May lose the race against a worker that already started executing
    /// the task. Unknown or finished ids are ignored.
    fn revoke(&self, id: &TaskId) -> TaskFuture<'_, ()>;
}
