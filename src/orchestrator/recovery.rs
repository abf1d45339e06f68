//! Startup recovery of dead man's switches.
//!
//! Delayed suspends live in the task client's memory and are cancelled on
//! shutdown, while stored records keep the id of the suspend they were
//! armed with. On startup every such record is re-armed so idle stacks
//! left over from the previous run are still reclaimed.

use tracing::{info, info_span, warn, Instrument};

use crate::models::stack::ProviderCredentials;
use crate::persistence::stack_repo::StackRepo;
use crate::Result;

use super::dead_mans_switch::DeadMansSwitch;

/// Re-arm the switch of every stored record with a pending suspend.
///
/// Each re-armed record gets a full idle window from now. A record whose
/// suspend cannot be submitted or stored is logged and skipped.
///
/// Returns the number of records re-armed.
///
/// # Errors
///
/// Returns `AppError::Db` if the armed records cannot be listed.
pub async fn rearm_pending_suspends(
    repo: &StackRepo,
    switch: &DeadMansSwitch,
    credentials: &ProviderCredentials,
) -> Result<usize> {
    async {
        let armed = repo.list_armed().await?;
        if armed.is_empty() {
            info!("no armed stacks found on startup");
            return Ok(0);
        }
        info!(count = armed.len(), "re-arming dead man's switches from prior run");

        let mut rearmed = 0usize;
        for record in armed {
            let mut record = record.with_credentials(credentials.clone());
            if let Err(err) = switch.arm(&mut record).await {
                warn!(stack_name = %record.stack_name, %err, "failed to re-arm switch");
                continue;
            }
            if let Err(err) = repo.upsert(&mut record).await {
                warn!(stack_name = %record.stack_name, %err, "failed to store re-armed switch");
                continue;
            }
            rearmed += 1;
        }

        info!(rearmed, "switch recovery complete");
        Ok(rearmed)
    }
    .instrument(info_span!("startup_switch_recovery"))
    .await
}
