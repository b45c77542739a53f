//! Per-record sync bookkeeping.
//!
//! Every syncable row stores two columns, `sync_status` and
//! `pending_operation`, plus a `failure_kind` that distinguishes a transient
//! failure from a server rejection. In memory they are folded into a single
//! [`SyncState`] so the invariant "an operation is pending if and only if the
//! record is not SYNCED" cannot be broken by construction.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
/// Sync Status: reconciliation state relative to the remote store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
  Synced,
  PendingSync,
  SyncFailed,
}

impl std::fmt::Display for SyncStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Synced => write!(f, "SYNCED"),
      Self::PendingSync => write!(f, "PENDING_SYNC"),
      Self::SyncFailed => write!(f, "SYNC_FAILED"),
    }
  }
}

impl std::str::FromStr for SyncStatus {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "SYNCED" => Ok(Self::Synced),
      "PENDING_SYNC" => Ok(Self::PendingSync),
      "SYNC_FAILED" => Ok(Self::SyncFailed),
      _ => Err(format!("Unknown sync status: {}", s)),
    }
  }
}

// ---------------------------------------------------------------------------
/// Pending Operation: what must be replayed against the remote store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingOperation {
  Create,
  Update,
  Delete,
}

impl std::fmt::Display for PendingOperation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Create => write!(f, "CREATE"),
      Self::Update => write!(f, "UPDATE"),
      Self::Delete => write!(f, "DELETE"),
    }
  }
}

impl std::str::FromStr for PendingOperation {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "CREATE" => Ok(Self::Create),
      "UPDATE" => Ok(Self::Update),
      "DELETE" => Ok(Self::Delete),
      _ => Err(format!("Unknown pending operation: {}", s)),
    }
  }
}

impl PendingOperation {
  /// Fold a new local mutation into the operation already waiting for sync.
  ///
  /// - nothing pending: the new operation
  /// - CREATE then UPDATE: still CREATE (the insert carries the latest data)
  /// - anything then DELETE: DELETE
  /// - UPDATE then UPDATE: UPDATE
  /// - DELETE then CREATE/UPDATE: refused until the delete has synced
  /// - CREATE over a pending CREATE/UPDATE: refused, ids are never reused
  pub fn merge(
    existing: Option<PendingOperation>,
    incoming: PendingOperation,
  ) -> Result<PendingOperation, AppError> {
    use PendingOperation::*;

    match (existing, incoming) {
      (None, op) => Ok(op),
      (Some(Delete), Delete) => Ok(Delete),
      (Some(Delete), _) => Err(AppError::invalid(
        "record is pending deletion and cannot be modified until sync completes",
      )),
      (Some(_), Delete) => Ok(Delete),
      (Some(Create), Update) => Ok(Create),
      (Some(Update), Update) => Ok(Update),
      (Some(Create), Create) | (Some(Update), Create) => {
        Err(AppError::invalid("record already exists"))
      }
    }
  }
}

// ---------------------------------------------------------------------------
/// Failure Kind: whether a failed record is retried automatically
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// Retries exhausted on an I/O-class error; picked up by the next pass.
  Transient,
  /// Server rejected the payload; waits for a new edit or a user retry.
  Rejected,
}

impl FailureKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Transient => "transient",
      Self::Rejected => "rejected",
    }
  }
}

impl std::str::FromStr for FailureKind {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "transient" => Ok(Self::Transient),
      "rejected" => Ok(Self::Rejected),
      _ => Err(format!("Unknown failure kind: {}", s)),
    }
  }
}

// ---------------------------------------------------------------------------
/// Sync State: the status/operation pair as one tagged value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncState {
  Synced,
  Pending {
    op: PendingOperation,
  },
  Failed {
    op: PendingOperation,
    failure: FailureKind,
  },
}

impl SyncState {
  pub fn pending(op: PendingOperation) -> Self {
    SyncState::Pending { op }
  }

  pub fn status(&self) -> SyncStatus {
    match self {
      SyncState::Synced => SyncStatus::Synced,
      SyncState::Pending { .. } => SyncStatus::PendingSync,
      SyncState::Failed { .. } => SyncStatus::SyncFailed,
    }
  }

  pub fn pending_operation(&self) -> Option<PendingOperation> {
    match self {
      SyncState::Synced => None,
      SyncState::Pending { op } | SyncState::Failed { op, .. } => Some(*op),
    }
  }

  pub fn failure_kind(&self) -> Option<FailureKind> {
    match self {
      SyncState::Failed { failure, .. } => Some(*failure),
      SyncState::Synced | SyncState::Pending { .. } => None,
    }
  }

  /// State after a local mutation of kind `incoming`.
  pub fn after_local_mutation(&self, incoming: PendingOperation) -> Result<SyncState, AppError> {
    let op = PendingOperation::merge(self.pending_operation(), incoming)?;
    Ok(SyncState::Pending { op })
  }

  /// State after a failed sync attempt. A synced record has nothing to fail.
  pub fn after_failure(&self, failure: FailureKind) -> SyncState {
    match self.pending_operation() {
      Some(op) => SyncState::Failed { op, failure },
      None => SyncState::Synced,
    }
  }

  /// Column values `(sync_status, pending_operation, failure_kind)`.
  pub fn to_columns(&self) -> (String, Option<String>, Option<&'static str>) {
    (
      self.status().to_string(),
      self.pending_operation().map(|op| op.to_string()),
      self.failure_kind().map(|f| f.as_str()),
    )
  }

  /// Decode the stored columns, rejecting rows that break the invariant.
  pub fn from_columns(
    status: &str,
    pending_operation: Option<&str>,
    failure_kind: Option<&str>,
  ) -> Result<SyncState, AppError> {
    let status: SyncStatus = status.parse().map_err(AppError::Storage)?;
    let op = pending_operation
      .map(str::parse::<PendingOperation>)
      .transpose()
      .map_err(AppError::Storage)?;

    match (status, op) {
      (SyncStatus::Synced, None) => Ok(SyncState::Synced),
      (SyncStatus::PendingSync, Some(op)) => Ok(SyncState::Pending { op }),
      (SyncStatus::SyncFailed, Some(op)) => {
        let failure = failure_kind
          .map(str::parse::<FailureKind>)
          .transpose()
          .map_err(AppError::Storage)?
          .unwrap_or(FailureKind::Transient);
        Ok(SyncState::Failed { op, failure })
      }
      (status, op) => Err(AppError::Storage(format!(
        "Inconsistent sync columns: status={} pending_operation={:?}",
        status, op
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use PendingOperation::*;

  fn all_states() -> Vec<SyncState> {
    let mut states = vec![SyncState::Synced];
    for op in [Create, Update, Delete] {
      states.push(SyncState::Pending { op });
      states.push(SyncState::Failed {
        op,
        failure: FailureKind::Transient,
      });
      states.push(SyncState::Failed {
        op,
        failure: FailureKind::Rejected,
      });
    }
    states
  }

  #[test]
  fn test_operation_present_iff_not_synced() {
    for state in all_states() {
      let has_op = state.pending_operation().is_some();
      let unsynced = matches!(state.status(), SyncStatus::PendingSync | SyncStatus::SyncFailed);
      assert_eq!(has_op, unsynced, "invariant broken for {:?}", state);
    }
  }

  #[test]
  fn test_columns_round_trip_every_state() {
    for state in all_states() {
      let (status, op, failure) = state.to_columns();
      let decoded = SyncState::from_columns(&status, op.as_deref(), failure).unwrap();
      assert_eq!(decoded, state);
    }
  }

  #[test]
  fn test_inconsistent_columns_rejected() {
    assert!(SyncState::from_columns("SYNCED", Some("CREATE"), None).is_err());
    assert!(SyncState::from_columns("PENDING_SYNC", None, None).is_err());
    assert!(SyncState::from_columns("SYNC_FAILED", None, None).is_err());
    assert!(SyncState::from_columns("BOGUS", None, None).is_err());
  }

  #[test]
  fn test_merge_create_then_update_stays_create() {
    assert_eq!(PendingOperation::merge(Some(Create), Update).unwrap(), Create);
  }

  #[test]
  fn test_merge_anything_then_delete_is_delete() {
    for existing in [None, Some(Create), Some(Update), Some(Delete)] {
      assert_eq!(PendingOperation::merge(existing, Delete).unwrap(), Delete);
    }
  }

  #[test]
  fn test_merge_delete_is_never_overwritten() {
    assert!(PendingOperation::merge(Some(Delete), Update).is_err());
    assert!(PendingOperation::merge(Some(Delete), Create).is_err());
  }

  #[test]
  fn test_merge_update_then_update() {
    assert_eq!(PendingOperation::merge(Some(Update), Update).unwrap(), Update);
    assert_eq!(PendingOperation::merge(None, Update).unwrap(), Update);
  }

  #[test]
  fn test_failed_record_mutation_requeues_as_pending() {
    let failed = SyncState::Failed {
      op: Create,
      failure: FailureKind::Rejected,
    };
    assert_eq!(
      failed.after_local_mutation(Update).unwrap(),
      SyncState::Pending { op: Create }
    );
  }

  #[test]
  fn test_after_failure_keeps_operation() {
    let pending = SyncState::pending(Update);
    assert_eq!(
      pending.after_failure(FailureKind::Transient),
      SyncState::Failed {
        op: Update,
        failure: FailureKind::Transient
      }
    );
    assert_eq!(SyncState::Synced.after_failure(FailureKind::Rejected), SyncState::Synced);
  }
}
