//! Stack record repository for `SQLite` persistence.
//!
//! Writes are whole-record upserts: concurrent requests on the same stack
//! resolve as last write wins.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::stack::{ProviderCredentials, StackKey, StackRecord};
use crate::models::task::TaskId;
use crate::{AppError, Result};

use super::db::Database;

/// Fixed-width UTC timestamp so stored values sort lexicographically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Repository wrapper around `SQLite` for stack records.
#[derive(Clone)]
pub struct StackRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct StackRow {
    course_id: String,
    user_id: String,
    stack_name: String,
    stack_user_name: String,
    template_content: String,
    launch_task_id: Option<String>,
    suspend_task_id: Option<String>,
    status: Option<String>,
    updated_at: String,
}

impl StackRow {
    /// Convert a database row into the domain model.
    fn into_stack_record(self) -> Result<StackRecord> {
        let status = self
            .status
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid status: {e}")))?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(StackRecord {
            key: StackKey::new(self.course_id, self.user_id),
            stack_name: self.stack_name,
            stack_user_name: self.stack_user_name,
            template_content: self.template_content,
            launch_task_id: self.launch_task_id.map(TaskId::new),
            suspend_task_id: self.suspend_task_id.map(TaskId::new),
            status,
            credentials: ProviderCredentials::default(),
            updated_at,
        })
    }
}

impl StackRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve the record for `key`.
    ///
    /// Returns `Ok(None)` if no record exists yet. Credentials are never
    /// stored and come back empty.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    pub async fn get(&self, key: &StackKey) -> Result<Option<StackRecord>> {
        let row: Option<StackRow> =
            sqlx::query_as("SELECT * FROM stack WHERE course_id = ?1 AND user_id = ?2")
                .bind(&key.course_id)
                .bind(&key.user_id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(StackRow::into_stack_record).transpose()
    }

    /// Retrieve the record for `key`, or a fresh one if none is stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_or_new(&self, key: &StackKey) -> Result<StackRecord> {
        Ok(self
            .get(key)
            .await?
            .unwrap_or_else(|| StackRecord::new(key.clone())))
    }

    /// Insert or replace the record, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert(&self, record: &mut StackRecord) -> Result<()> {
        record.updated_at = Utc::now();
        let status = record
            .status
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Db(format!("serialize status: {e}")))?;

        sqlx::query(
            "INSERT INTO stack (course_id, user_id, stack_name, stack_user_name,
             template_content, launch_task_id, suspend_task_id, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(course_id, user_id) DO UPDATE SET
                stack_name = excluded.stack_name,
                stack_user_name = excluded.stack_user_name,
                template_content = excluded.template_content,
                launch_task_id = excluded.launch_task_id,
                suspend_task_id = excluded.suspend_task_id,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&record.key.course_id)
        .bind(&record.key.user_id)
        .bind(&record.stack_name)
        .bind(&record.stack_user_name)
        .bind(&record.template_content)
        .bind(record.launch_task_id.as_ref().map(TaskId::as_str))
        .bind(record.suspend_task_id.as_ref().map(TaskId::as_str))
        .bind(&status)
        .bind(timestamp(record.updated_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// List all records with a pending suspend recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is corrupt.
    pub async fn list_armed(&self) -> Result<Vec<StackRecord>> {
        let rows: Vec<StackRow> =
            sqlx::query_as("SELECT * FROM stack WHERE suspend_task_id IS NOT NULL")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(StackRow::into_stack_record).collect()
    }
}
