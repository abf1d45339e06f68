//! End-to-end tests running provisioning through external commands.
//!
//! The lifecycle orchestrator drives the real task client, which spawns
//! small `sh` scripts standing in for the cloud provisioning tools.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use lab_stacks::models::stack::{ProviderCredentials, StackKey, StackRecord};
use lab_stacks::models::status::{StatusEnvelope, ERROR};
use lab_stacks::orchestrator::{DeadMansSwitch, LifecycleOrchestrator};
use lab_stacks::tasks::local::LocalTaskClient;
use lab_stacks::tasks::provisioner::{CommandProvisioner, StackProvisioner};
use lab_stacks::tasks::TaskClient;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn orchestrator(launch: &str, suspend: &str) -> LifecycleOrchestrator {
    let provisioner: Arc<dyn StackProvisioner> =
        Arc::new(CommandProvisioner::new(sh(launch), sh(suspend)));
    let client = LocalTaskClient::new(
        provisioner,
        2,
        Duration::from_secs(3600),
        CancellationToken::new(),
    );
    let tasks: Arc<dyn TaskClient> = Arc::new(client);
    let switch = DeadMansSwitch::new(Arc::clone(&tasks), Duration::from_secs(3600));
    LifecycleOrchestrator::new(tasks, switch, "")
}

fn record() -> StackRecord {
    let mut record = StackRecord::new(StackKey::new("CS101", "frank")).with_credentials(
        ProviderCredentials {
            auth_url: "https://keystone.example.org:5000/v2.0".into(),
            tenant_name: "labs".into(),
            username: "svc".into(),
            password: "pw".into(),
        },
    );
    record.stack_user_name = "training".into();
    record
}

async fn settle(orch: &LifecycleOrchestrator, record: &mut StackRecord) -> StatusEnvelope {
    for _ in 0..200 {
        let envelope = orch.get_status(record).await.expect("status");
        if !record.has_launch_in_flight() {
            return envelope;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("launch never finished");
}

#[tokio::test]
async fn command_output_becomes_stack_status() {
    let orch = orchestrator(
        r#"printf '{"status":"CREATE_COMPLETE","stack":"%s","user":"%s","tenant":"%s"}' "$STACK_NAME" "$STACK_USER_NAME" "$OS_TENANT_NAME""#,
        r#"printf '{"status":"SUSPEND_COMPLETE"}'"#,
    );
    let mut record = record();

    orch.view(&mut record, Some("resources: {}".into()))
        .await
        .expect("view");
    let envelope = settle(&orch, &mut record).await;

    assert_eq!(envelope.status, "CREATE_COMPLETE");
    assert_eq!(envelope.extra["stack"], "CS101_frank");
    assert_eq!(envelope.extra["user"], "training");
    assert_eq!(envelope.extra["tenant"], "labs");
}

#[tokio::test]
async fn failing_command_reports_error_with_stderr() {
    let orch = orchestrator("echo 'no such template' >&2; exit 2", "true");
    let mut record = record();

    orch.view(&mut record, None).await.expect("view");
    let envelope = settle(&orch, &mut record).await;

    assert_eq!(envelope.status, ERROR);
    let message = envelope.error_message.expect("message");
    assert!(message.starts_with("Unexpected result: "), "{message}");
    assert!(message.contains("no such template"), "{message}");
}

#[tokio::test]
async fn non_mapping_output_is_unexpected() {
    let orch = orchestrator("echo 42", "true");
    let mut record = record();

    orch.view(&mut record, None).await.expect("view");
    let envelope = settle(&orch, &mut record).await;

    assert_eq!(envelope.status, ERROR);
    assert_eq!(envelope.error_message.as_deref(), Some("Unexpected result: 42"));
}
