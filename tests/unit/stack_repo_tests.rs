//! Unit tests for the stack record repository.

use std::sync::Arc;

use serde_json::json;

use lab_stacks::models::stack::{ProviderCredentials, StackKey, StackRecord};
use lab_stacks::models::status::StatusEnvelope;
use lab_stacks::models::task::TaskId;
use lab_stacks::persistence::db;
use lab_stacks::persistence::stack_repo::StackRepo;

async fn repo() -> StackRepo {
    let database = db::connect_memory().await.expect("db");
    StackRepo::new(Arc::new(database))
}

fn populated_record() -> StackRecord {
    let mut record = StackRecord::new(StackKey::new("course-1", "bob"));
    record.stack_user_name = "training".into();
    record.template_content = "heat_template_version: 2013-05-23".into();
    record.launch_task_id = Some(TaskId::new("launch-1"));
    record.suspend_task_id = Some(TaskId::new("suspend-1"));
    let mut status = StatusEnvelope::with_code("CREATE_COMPLETE");
    status.extra.insert("ip".into(), json!("10.0.0.1"));
    record.status = Some(status);
    record
}

#[tokio::test]
async fn get_missing_returns_none() {
    let repo = repo().await;

    let record = repo.get(&StackKey::new("c", "u")).await.expect("get");

    assert!(record.is_none());
}

#[tokio::test]
async fn get_or_new_returns_fresh_record() {
    let repo = repo().await;
    let key = StackKey::new("c", "u");

    let record = repo.get_or_new(&key).await.expect("get_or_new");

    assert_eq!(record.key, key);
    assert_eq!(record.stack_name, "c_u");
    assert!(record.launch_task_id.is_none());
    assert!(repo.get(&key).await.expect("get").is_none());
}

#[tokio::test]
async fn upsert_round_trips_all_fields() {
    let repo = repo().await;
    let mut record = populated_record();

    repo.upsert(&mut record).await.expect("upsert");
    let loaded = repo.get(&record.key).await.expect("get").expect("stored");

    assert_eq!(loaded.stack_name, record.stack_name);
    assert_eq!(loaded.stack_user_name, "training");
    assert_eq!(loaded.template_content, record.template_content);
    assert_eq!(loaded.launch_task_id, Some(TaskId::new("launch-1")));
    assert_eq!(loaded.suspend_task_id, Some(TaskId::new("suspend-1")));
    assert_eq!(loaded.status, record.status);
}

#[tokio::test]
async fn credentials_are_never_stored() {
    let repo = repo().await;
    let mut record = populated_record().with_credentials(ProviderCredentials {
        auth_url: "https://keystone.example.org".into(),
        tenant_name: "labs".into(),
        username: "svc".into(),
        password: "hunter2".into(),
    });

    repo.upsert(&mut record).await.expect("upsert");
    let loaded = repo.get(&record.key).await.expect("get").expect("stored");

    assert_eq!(loaded.credentials, ProviderCredentials::default());
}

#[tokio::test]
async fn upsert_overwrites_existing_record() {
    let repo = repo().await;
    let mut record = populated_record();
    repo.upsert(&mut record).await.expect("first upsert");

    record.launch_task_id = None;
    record.suspend_task_id = None;
    record.status = Some(StatusEnvelope::error("Unexpected result: 42"));
    repo.upsert(&mut record).await.expect("second upsert");

    let loaded = repo.get(&record.key).await.expect("get").expect("stored");
    assert!(loaded.launch_task_id.is_none());
    assert!(loaded.suspend_task_id.is_none());
    assert_eq!(
        loaded.status.and_then(|s| s.error_message),
        Some("Unexpected result: 42".to_owned())
    );
}

#[tokio::test]
async fn records_are_keyed_by_course_and_user() {
    let repo = repo().await;
    let mut first = StackRecord::new(StackKey::new("course-1", "bob"));
    first.stack_user_name = "first".into();
    let mut second = StackRecord::new(StackKey::new("course-2", "bob"));
    second.stack_user_name = "second".into();

    repo.upsert(&mut first).await.expect("upsert");
    repo.upsert(&mut second).await.expect("upsert");

    let loaded = repo.get(&first.key).await.expect("get").expect("stored");
    assert_eq!(loaded.stack_user_name, "first");
    let loaded = repo.get(&second.key).await.expect("get").expect("stored");
    assert_eq!(loaded.stack_user_name, "second");
}

#[tokio::test]
async fn list_armed_returns_only_records_with_pending_suspend() {
    let repo = repo().await;
    let mut armed = populated_record();
    let mut idle = StackRecord::new(StackKey::new("course-1", "carol"));
    repo.upsert(&mut armed).await.expect("upsert");
    repo.upsert(&mut idle).await.expect("upsert");

    let listed = repo.list_armed().await.expect("list");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, armed.key);
    assert_eq!(listed[0].suspend_task_id, Some(TaskId::new("suspend-1")));
}
