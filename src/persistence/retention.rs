//! Retention service for time-based purge of idle stack records.
//!
//! Runs as a background task deleting records that have not been written
//! for longer than `retention_days` and have no launch in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::db::Database;
use super::stack_repo::timestamp;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly until `cancel` fires.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, retention_days).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Delete idle stack records older than `retention_days`.
///
/// Returns the number of deleted records.
///
/// # Errors
///
/// Returns `AppError::Db` if the delete fails.
pub async fn purge(db: &Database, retention_days: u32) -> Result<u64> {
    let cutoff = timestamp(Utc::now() - chrono::Duration::days(i64::from(retention_days)));

    let result =
        sqlx::query("DELETE FROM stack WHERE updated_at < ?1 AND launch_task_id IS NULL")
            .bind(&cutoff)
            .execute(db)
            .await?;

    let purged = result.rows_affected();
    info!(retention_days, purged, "retention purge completed");
    Ok(purged)
}
