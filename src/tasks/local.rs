//! In-process task client backed by a bounded tokio worker pool.
//!
//! Launch-or-resume tasks run on spawned tokio tasks, limited to
//! `pool_size` concurrent executions by a semaphore. Suspend tasks sleep
//! for their delay first and can be revoked until they start executing;
//! once a worker has picked one up, revocation no longer stops it.
//!
//! Outcomes are kept in a shared table so [`fetch`](TaskClient::fetch)
//! can report them. Finished entries are pruned after a TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::WorkerConfig;
use crate::models::task::{LaunchParams, SuspendParams, TaskHandle, TaskId, TaskState};
use crate::{AppError, Result};

use super::provisioner::{ProvisionResult, StackProvisioner};
use super::{TaskClient, TaskFuture};

/// Failure cause recorded for a suspend revoked before it started.
pub const REVOKED: &str = "revoked";

struct TaskEntry {
    state: TaskState,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

struct Shared {
    provisioner: Arc<dyn StackProvisioner>,
    permits: Arc<Semaphore>,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    finished_ttl: Duration,
    shutdown: CancellationToken,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_pending(&self, id: &TaskId) -> CancellationToken {
        let cancel = self.shutdown.child_token();
        self.table().insert(
            id.clone(),
            TaskEntry {
                state: TaskState::Pending,
                cancel: cancel.clone(),
                finished_at: None,
            },
        );
        cancel
    }

    fn finish(&self, id: &TaskId, state: TaskState) {
        let mut table = self.table();
        let entry = table.entry(id.clone()).or_insert_with(|| TaskEntry {
            state: TaskState::Pending,
            cancel: CancellationToken::new(),
            finished_at: None,
        });
        entry.state = state;
        entry.finished_at = Some(Instant::now());
    }

    fn prune_finished(&self) {
        let ttl = self.finished_ttl;
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, entry| entry.finished_at.is_none_or(|at| at.elapsed() < ttl));
        let pruned = before - table.len();
        if pruned > 0 {
            debug!(pruned, "pruned finished task entries");
        }
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Task("worker pool closed".into()))
    }
}

fn into_state(outcome: ProvisionResult) -> TaskState {
    match outcome {
        Ok(value) => TaskState::Succeeded(value),
        Err(cause) => TaskState::Failed(cause),
    }
}

/// [`TaskClient`] executing work on the local tokio runtime.
#[derive(Clone)]
pub struct LocalTaskClient {
    shared: Arc<Shared>,
}

impl LocalTaskClient {
    /// Create a client running at most `pool_size` tasks at once.
    #[must_use]
    pub fn new(
        provisioner: Arc<dyn StackProvisioner>,
        pool_size: usize,
        finished_ttl: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provisioner,
                permits: Arc::new(Semaphore::new(pool_size)),
                tasks: Mutex::new(HashMap::new()),
                finished_ttl,
                shutdown,
            }),
        }
    }

    /// Create a client from the worker configuration.
    #[must_use]
    pub fn from_config(
        provisioner: Arc<dyn StackProvisioner>,
        config: &WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self::new(
            provisioner,
            config.pool_size,
            Duration::from_secs(config.finished_task_ttl_seconds),
            shutdown,
        )
    }

    /// Number of tasks currently tracked, finished or not.
    #[must_use]
    pub fn tracked_tasks(&self) -> usize {
        self.shared.table().len()
    }

    /// Stop accepting work and cancel all delayed suspends.
    pub fn close(&self) {
        self.shared.shutdown.cancel();
        self.shared.permits.close();
    }
}

impl TaskClient for LocalTaskClient {
    fn submit_launch_or_resume(
        &self,
        params: LaunchParams,
        synchronous: bool,
    ) -> TaskFuture<'_, Result<TaskHandle>> {
        Box::pin(async move {
            if self.shared.shutdown.is_cancelled() {
                return Err(AppError::Task("task client is shut down".into()));
            }
            self.shared.prune_finished();
            let id = TaskId::generate();
            let span = info_span!(
                "launch_task",
                task_id = %id,
                stack_name = %params.stack_name,
                synchronous
            );

            if synchronous {
                let _permit = self.shared.acquire().await?;
                let state = into_state(
                    self.shared
                        .provisioner
                        .launch_or_resume(params)
                        .instrument(span)
                        .await,
                );
                self.shared.finish(&id, state.clone());
                return Ok(TaskHandle { id, state });
            }

            self.shared.insert_pending(&id);
            let shared = Arc::clone(&self.shared);
            let task_id = id.clone();
            tokio::spawn(
                async move {
                    let state = match shared.acquire().await {
                        Ok(_permit) => {
                            into_state(shared.provisioner.launch_or_resume(params).await)
                        }
                        Err(err) => TaskState::Failed(err.to_string()),
                    };
                    if let TaskState::Failed(ref cause) = state {
                        warn!(%cause, "launch task failed");
                    } else {
                        info!("launch task finished");
                    }
                    shared.finish(&task_id, state);
                }
                .instrument(span),
            );

            Ok(TaskHandle::pending(id))
        })
    }

    fn submit_suspend(
        &self,
        params: SuspendParams,
        delay: Duration,
    ) -> TaskFuture<'_, Result<TaskHandle>> {
        Box::pin(async move {
            if self.shared.shutdown.is_cancelled() {
                return Err(AppError::Task("task client is shut down".into()));
            }
            self.shared.prune_finished();
            let id = TaskId::generate();
            let cancel = self.shared.insert_pending(&id);
            let shared = Arc::clone(&self.shared);
            let task_id = id.clone();
            let span = info_span!(
                "suspend_task",
                task_id = %id,
                stack_name = %params.stack_name,
                delay_secs = delay.as_secs()
            );

            tokio::spawn(
                async move {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            debug!("suspend revoked before its deadline");
                            shared.finish(&task_id, TaskState::Failed(REVOKED.into()));
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }

                    let permit = shared.acquire().await;
                    // Revocation still wins while waiting for a free worker.
                    if cancel.is_cancelled() {
                        debug!("suspend revoked while queued");
                        shared.finish(&task_id, TaskState::Failed(REVOKED.into()));
                        return;
                    }
                    let state = match permit {
                        Ok(_permit) => {
                            info!("dead man's switch fired, suspending stack");
                            into_state(shared.provisioner.suspend(params).await)
                        }
                        Err(err) => TaskState::Failed(err.to_string()),
                    };
                    shared.finish(&task_id, state);
                }
                .instrument(span),
            );

            Ok(TaskHandle::pending(id))
        })
    }

    fn fetch(&self, id: &TaskId) -> TaskFuture<'_, Result<TaskHandle>> {
        let id = id.clone();
        Box::pin(async move {
            let state = self.shared.table().get(&id).map(|entry| entry.state.clone());
            Ok(match state {
                Some(state) => TaskHandle { id, state },
                None => {
                    let cause = format!("unknown task {id}");
                    TaskHandle::failed(id, cause)
                }
            })
        })
    }

    fn revoke(&self, id: &TaskId) -> TaskFuture<'_, ()> {
        let id = id.clone();
        Box::pin(async move {
            if let Some(entry) = self.shared.table().get(&id) {
                if matches!(entry.state, TaskState::Pending) {
                    entry.cancel.cancel();
                    debug!(task_id = %id, "task revoked");
                }
            }
        })
    }
}
