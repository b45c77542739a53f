//! Aggregate sync state shown to the UI.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
  Idle,
  Syncing,
  Synced,
  Failed,
  Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
  pub status: SyncPhase,
  /// Templates and logs not yet on the remote store
  pub pending_count: i64,
  /// Epoch millis of the last pass that finished without record failures
  pub last_sync_time: Option<i64>,
  pub error_message: Option<String>,
  /// 0.0 ..= 1.0 while syncing
  pub progress: Option<f32>,
}

impl Default for SyncSnapshot {
  fn default() -> Self {
    Self {
      status: SyncPhase::Idle,
      pending_count: 0,
      last_sync_time: None,
      error_message: None,
      progress: None,
    }
  }
}

/// Counts for one `sync_all` pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
  pub templates_pushed: usize,
  pub exercise_sets_pushed: usize,
  pub logs_pushed: usize,
  pub deletes_confirmed: usize,
  pub failed: usize,
  pub errors: Vec<String>,
}

impl SyncReport {
  pub fn pushed(&self) -> usize {
    self.templates_pushed + self.exercise_sets_pushed + self.logs_pushed
  }

  pub fn record_failure(&mut self, what: String) {
    self.failed += 1;
    self.errors.push(what);
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
  /// Nothing was attempted
  Offline,
  /// Another pass was running; it will go round once more for this request
  Coalesced,
  Completed(SyncReport),
}

/// Counts for one pull from the remote store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
  pub templates_upserted: usize,
  pub logs_upserted: usize,
  pub skipped_pending: usize,
  pub purged: u64,
}
