use crate::db::AppState;
use crate::error::AppResult;
use crate::sync::{RefreshReport, SyncOutcome, SyncSnapshot};

pub async fn get_sync_state(state: &AppState) -> SyncSnapshot {
  state.engine.snapshot()
}

pub async fn is_online(state: &AppState) -> bool {
  state.monitor.is_online()
}

/// Run a pass now and wait for it
pub async fn trigger_sync(state: &AppState) -> SyncOutcome {
  state.engine.sync_all().await
}

/// Re-queue records the server rejected, then ask for a pass
pub async fn retry_rejected(state: &AppState) -> AppResult<u64> {
  state.current_user().await?;
  let requeued = state.engine.retry_rejected().await?;
  state.after_local_change().await;
  Ok(requeued)
}

pub async fn refresh_from_remote(state: &AppState) -> AppResult<RefreshReport> {
  let owner_id = state.current_user().await?;
  state.engine.refresh_from_remote(&owner_id).await
}
