//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` and are safe to
//! re-run on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS stack (
    course_id        TEXT NOT NULL,
    user_id          TEXT NOT NULL,
    stack_name       TEXT NOT NULL,
    stack_user_name  TEXT NOT NULL DEFAULT '',
    template_content TEXT NOT NULL DEFAULT '',
    launch_task_id   TEXT,
    suspend_task_id  TEXT,
    status           TEXT,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (course_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_stack_updated ON stack(updated_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
