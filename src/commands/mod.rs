//! UI-facing operations. Every command acts on behalf of the signed-in user
//! and returns errors that serialize to a plain message.

pub mod logs;
pub mod sessions;
pub mod sync;
pub mod templates;

use crate::db::AppState;
use crate::error::AppResult;

impl AppState {
  pub(crate) async fn current_user(&self) -> AppResult<String> {
    self.auth.require_user().await
  }

  /// Refresh the pending count and nudge the worker. Never waits on the network.
  pub(crate) async fn after_local_change(&self) {
    if let Err(e) = self.engine.refresh_pending_count().await {
      tracing::warn!(error = %e, "failed to refresh pending count");
    }
    if let Some(trigger) = &self.sync_trigger {
      if self.monitor.is_online() {
        trigger.trigger();
      }
    }
  }
}
