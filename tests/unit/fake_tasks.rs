//! Scripted task client and provisioner shared by the unit tests.
//!
//! `FakeTaskClient` never executes anything: tests decide what each task
//! handle reports and inspect what the orchestrator submitted and revoked.
//! `FakeCloud` is a provisioner that tracks per-stack state in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use lab_stacks::models::task::{LaunchParams, SuspendParams, TaskHandle, TaskId, TaskState};
use lab_stacks::tasks::provisioner::{ProvisionResult, StackProvisioner};
use lab_stacks::tasks::{TaskClient, TaskFuture};
use lab_stacks::{AppError, Result};

#[derive(Default)]
struct FakeState {
    next_id: u32,
    launches: Vec<(LaunchParams, bool)>,
    suspends: Vec<(TaskId, Duration)>,
    revoked: Vec<TaskId>,
    events: Vec<String>,
    states: HashMap<TaskId, TaskState>,
    sync_result: Option<TaskState>,
    fail_suspends: bool,
}

/// Task client whose handles are controlled by the test.
#[derive(Default)]
pub struct FakeTaskClient {
    inner: Mutex<FakeState>,
}

impl FakeTaskClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make task `id` report `state` on the next fetch.
    pub fn set_state(&self, id: &TaskId, state: TaskState) {
        self.inner.lock().unwrap().states.insert(id.clone(), state);
    }

    /// State reported by synchronous launches.
    pub fn set_sync_result(&self, state: TaskState) {
        self.inner.lock().unwrap().sync_result = Some(state);
    }

    pub fn fail_suspends(&self) {
        self.inner.lock().unwrap().fail_suspends = true;
    }

    pub fn async_launches(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.launches.iter().filter(|(_, sync)| !sync).count()
    }

    pub fn sync_launches(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.launches.iter().filter(|(_, sync)| *sync).count()
    }

    pub fn last_launch(&self) -> Option<LaunchParams> {
        let inner = self.inner.lock().unwrap();
        inner.launches.last().map(|(params, _)| params.clone())
    }

    pub fn suspends(&self) -> Vec<(TaskId, Duration)> {
        self.inner.lock().unwrap().suspends.clone()
    }

    pub fn revoked(&self) -> Vec<TaskId> {
        self.inner.lock().unwrap().revoked.clone()
    }

    /// Submissions and revocations in call order, e.g. `"revoke suspend-1"`.
    pub fn events(&self) -> Vec<String> {
        self.inner.lock().unwrap().events.clone()
    }

    fn next_id(inner: &mut FakeState, prefix: &str) -> TaskId {
        inner.next_id += 1;
        TaskId::new(format!("{prefix}-{}", inner.next_id))
    }
}

impl TaskClient for FakeTaskClient {
    fn submit_launch_or_resume(
        &self,
        params: LaunchParams,
        synchronous: bool,
    ) -> TaskFuture<'_, Result<TaskHandle>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let id = Self::next_id(&mut inner, "launch");
            inner.events.push(format!("submit_launch {id}"));
            inner.launches.push((params, synchronous));
            let state = if synchronous {
                inner
                    .sync_result
                    .clone()
                    .unwrap_or_else(|| TaskState::Succeeded(json!({"status": "RESUME_COMPLETE"})))
            } else {
                TaskState::Pending
            };
            inner.states.insert(id.clone(), state.clone());
            Ok(TaskHandle { id, state })
        })
    }

    fn submit_suspend(
        &self,
        _params: SuspendParams,
        delay: Duration,
    ) -> TaskFuture<'_, Result<TaskHandle>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_suspends {
                return Err(AppError::Task("broker unavailable".into()));
            }
            let id = Self::next_id(&mut inner, "suspend");
            inner.events.push(format!("submit_suspend {id}"));
            inner.suspends.push((id.clone(), delay));
            inner.states.insert(id.clone(), TaskState::Pending);
            Ok(TaskHandle::pending(id))
        })
    }

    fn fetch(&self, id: &TaskId) -> TaskFuture<'_, Result<TaskHandle>> {
        let id = id.clone();
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            let state = inner
                .states
                .get(&id)
                .cloned()
                .unwrap_or_else(|| TaskState::Failed(format!("unknown task {id}")));
            Ok(TaskHandle { id, state })
        })
    }

    fn revoke(&self, id: &TaskId) -> TaskFuture<'_, ()> {
        let id = id.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(format!("revoke {id}"));
            inner.revoked.push(id);
        })
    }
}

/// In-memory provisioner modelling the cloud side of each stack.
#[derive(Default)]
pub struct FakeCloud {
    stacks: Mutex<HashMap<String, String>>,
    launch_failure: Mutex<Option<String>>,
    work: Duration,
    pub launch_calls: AtomicUsize,
    pub suspend_calls: AtomicUsize,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provisioner whose every call takes `work` to complete.
    pub fn slow(work: Duration) -> Arc<Self> {
        Arc::new(Self {
            work,
            ..Self::default()
        })
    }

    pub fn fail_launches(&self, cause: &str) {
        *self.launch_failure.lock().unwrap() = Some(cause.to_owned());
    }

    pub fn stack_status(&self, stack_name: &str) -> Option<String> {
        self.stacks.lock().unwrap().get(stack_name).cloned()
    }

    async fn simulate_work(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StackProvisioner for FakeCloud {
    fn launch_or_resume(&self, params: LaunchParams) -> TaskFuture<'_, ProvisionResult> {
        Box::pin(async move {
            self.launch_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_work().await;
            if let Some(cause) = self.launch_failure.lock().unwrap().clone() {
                return Err(cause);
            }
            let mut stacks = self.stacks.lock().unwrap();
            let status = match stacks.get(&params.stack_name).map(String::as_str) {
                None => "CREATE_COMPLETE",
                Some("SUSPEND_COMPLETE") => "RESUME_COMPLETE",
                Some(current) => current,
            }
            .to_owned();
            stacks.insert(params.stack_name.clone(), status.clone());
            Ok(json!({
                "status": status,
                "ip": "10.0.0.5",
                "user": params.stack_user_name,
            }))
        })
    }

    fn suspend(&self, params: SuspendParams) -> TaskFuture<'_, ProvisionResult> {
        Box::pin(async move {
            self.suspend_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_work().await;
            self.stacks
                .lock()
                .unwrap()
                .insert(params.stack_name, "SUSPEND_COMPLETE".into());
            Ok(json!({"status": "SUSPEND_COMPLETE"}))
        })
    }
}
