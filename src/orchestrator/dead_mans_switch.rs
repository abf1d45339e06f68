//! Self-resetting auto-suspend for idle stacks.
//!
//! Every client activity re-arms the switch: the pending suspend task is
//! revoked and a fresh one is scheduled a full delay into the future. If
//! the client stops pinging, the last scheduled suspend runs and the
//! stack's cloud resources are reclaimed.
//!
//! Revocation is best effort. A suspend that a worker has already picked
//! up keeps running; the next view or poll resumes the stack.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, Instrument};

use crate::models::stack::StackRecord;
use crate::tasks::TaskClient;
use crate::Result;

/// Schedules, reschedules, and cancels the delayed suspend of a stack.
#[derive(Clone)]
pub struct DeadMansSwitch {
    tasks: Arc<dyn TaskClient>,
    delay: Duration,
}

impl DeadMansSwitch {
    /// Create a switch that suspends stacks `delay` after the last activity.
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskClient>, delay: Duration) -> Self {
        Self { tasks, delay }
    }

    /// Configured idle window.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any pending suspend, then schedule a new one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Task`](crate::AppError::Task) if the suspend
    /// task cannot be submitted; the record is left disarmed in that case.
    pub async fn arm(&self, record: &mut StackRecord) -> Result<()> {
        let span = info_span!("arm_switch", stack_name = %record.stack_name);
        async {
            self.disarm(record).await;

            let handle = self
                .tasks
                .submit_suspend(record.suspend_params(), self.delay)
                .await?;
            info!(
                task_id = %handle.id,
                delay_secs = self.delay.as_secs(),
                "dead man's switch armed"
            );
            record.suspend_task_id = Some(handle.id);
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Revoke the pending suspend, if any. No-op when nothing is pending.
    pub async fn disarm(&self, record: &mut StackRecord) {
        if let Some(id) = record.suspend_task_id.take() {
            self.tasks.revoke(&id).await;
            debug!(task_id = %id, stack_name = %record.stack_name, "dead man's switch disarmed");
        }
    }
}
