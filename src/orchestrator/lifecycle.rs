//! Stack lifecycle orchestration: launch, resume, reconcile, keep alive.
//!
//! Every operation takes the [`StackRecord`] by `&mut` for the duration of
//! one client request; the caller loads it before and stores it after. No
//! lock is held. Two ordering rules keep concurrent requests safe without
//! one:
//!
//! - an asynchronous launch records its task id before the task resolves,
//!   so a concurrent poll sees it in flight instead of submitting another;
//! - the dead man's switch always revokes the previous suspend before
//!   scheduling its replacement.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};

use crate::models::stack::StackRecord;
use crate::models::status::StatusEnvelope;
use crate::models::task::TaskHandle;
use crate::tasks::TaskClient;
use crate::Result;

use super::dead_mans_switch::DeadMansSwitch;
use super::normalizer::normalize;

/// Response body of the terminal URL request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalUrl {
    /// Where the terminal server is running.
    pub terminal_url: String,
}

/// Control logic deciding launch vs. resume and driving the switch.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    tasks: Arc<dyn TaskClient>,
    switch: DeadMansSwitch,
    terminal_url: String,
}

impl LifecycleOrchestrator {
    /// Create an orchestrator over a task client and a dead man's switch.
    #[must_use]
    pub fn new(
        tasks: Arc<dyn TaskClient>,
        switch: DeadMansSwitch,
        terminal_url: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            switch,
            terminal_url: terminal_url.into(),
        }
    }

    /// Launch the stack if it does not exist, resume it if it is suspended.
    ///
    /// The asynchronous variant never submits a second task while the
    /// recorded one is still pending; it reports that task instead. A
    /// recorded task that has already finished is recorded and cleared,
    /// then a fresh one is submitted, since the stack may have been
    /// suspended since.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) if the task cannot
    /// be submitted or fetched.
    pub async fn launch_or_resume(
        &self,
        record: &mut StackRecord,
        synchronous: bool,
    ) -> Result<StatusEnvelope> {
        let span = info_span!(
            "launch_or_resume",
            stack_name = %record.stack_name,
            synchronous
        );
        async {
            if !synchronous {
                if let Some(id) = record.launch_task_id.clone() {
                    let handle = self.tasks.fetch(&id).await?;
                    if !handle.is_ready() {
                        debug!(task_id = %id, "launch already in flight, not resubmitting");
                        return Ok(self.record_result(record, &handle));
                    }
                    debug!(task_id = %id, "recorded launch already finished, resubmitting");
                    self.record_result(record, &handle);
                }
            }

            let handle = self
                .tasks
                .submit_launch_or_resume(record.launch_params(), synchronous)
                .await?;

            if !synchronous {
                // Recorded before the task resolves so concurrent polls see it.
                record.launch_task_id = Some(handle.id.clone());
                info!(task_id = %handle.id, "launch task submitted");
            }

            Ok(self.record_result(record, &handle))
        }
        .instrument(span)
        .await
    }

    /// Normalize a task handle into the record's status.
    ///
    /// The in-flight launch id is cleared once the handle is ready, whatever
    /// the outcome; a pending handle leaves it in place.
    #[allow(clippy::unused_self)]
    pub fn record_result(&self, record: &mut StackRecord, handle: &TaskHandle) -> StatusEnvelope {
        if handle.is_ready() {
            record.launch_task_id = None;
        }
        let envelope = normalize(handle);
        debug!(
            stack_name = %record.stack_name,
            task_id = %handle.id,
            status = %envelope.status,
            "task result recorded"
        );
        record.status = Some(envelope.clone());
        envelope
    }

    /// Reconcile and report the stack status; called on every client poll.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) on submission
    /// failure. The switch stays disarmed in that case; the client's next
    /// poll re-arms it.
    pub async fn get_status(&self, record: &mut StackRecord) -> Result<StatusEnvelope> {
        let span = info_span!("get_status", stack_name = %record.stack_name);
        async {
            // A poll means the client is active.
            self.switch.disarm(record).await;

            let envelope = if let Some(id) = record.launch_task_id.clone() {
                let handle = self.tasks.fetch(&id).await?;
                let envelope = self.record_result(record, &handle);
                if envelope.status.is_success_shaped() {
                    self.reverify(record).await?
                } else {
                    envelope
                }
            } else {
                // Nothing in flight: the stack may need resuming from a suspend.
                self.launch_or_resume(record, false).await?;
                record
                    .status
                    .clone()
                    .unwrap_or_else(StatusEnvelope::pending)
            };

            self.switch.arm(record).await?;
            info!(status = %envelope.status, "status reported");
            Ok(envelope)
        }
        .instrument(span)
        .await
    }

    /// Confirm a success reported by an asynchronous task with a
    /// synchronous launch-or-resume.
    ///
    /// The switch may have suspended the stack between the asynchronous
    /// task finishing and this poll; the synchronous call reports the
    /// current state, resuming the stack if needed.
    async fn reverify(&self, record: &mut StackRecord) -> Result<StatusEnvelope> {
        debug!(stack_name = %record.stack_name, "re-verifying launch result synchronously");
        self.launch_or_resume(record, true).await
    }

    /// Reset the dead man's switch on client activity.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) if the suspend task
    /// cannot be submitted.
    pub async fn keepalive(&self, record: &mut StackRecord) -> Result<()> {
        self.switch.arm(record).await
    }

    /// Make sure the stack is launched when a student opens the lab, then
    /// start the dead man's switch.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) on submission
    /// failure.
    pub async fn view(
        &self,
        record: &mut StackRecord,
        template: Option<String>,
    ) -> Result<StatusEnvelope> {
        record.stack_name = record.key.stack_name();
        if let Some(template) = template {
            record.template_content = template;
        }

        let envelope = self.launch_or_resume(record, false).await?;
        self.switch.arm(record).await?;
        Ok(envelope)
    }

    /// Where the terminal server is running.
    #[must_use]
    pub fn terminal_url(&self) -> TerminalUrl {
        TerminalUrl {
            terminal_url: self.terminal_url.clone(),
        }
    }
}
