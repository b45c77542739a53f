//! Push local changes to the remote store and pull remote changes back.
//!
//! Each syncable row carries its own pending operation, so the queue is just
//! the set of rows with `pending_operation IS NOT NULL`. A pass replays each
//! row's operation, then marks it SYNCED or SYNC_FAILED. One row failing never
//! stops the others.

pub mod retry;
pub mod state;
pub mod worker;

use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::clock::{millis_to_iso, now_millis};
use crate::error::{AppError, AppResult, RemoteError};
use crate::models::{
  FailureKind, PendingOperation, SyncStatus, TemplateExercise, WorkoutLog, WorkoutTemplate,
};
use crate::network::NetworkMonitor;
use crate::remote::dto::{self, RemoteTemplate, RemoteTemplateExercise, RemoteWorkoutLog};
use crate::remote::{Filter, RemoteGateway, RemoteTable};
use crate::store::{self, logs, templates};

pub use retry::{retry_with_backoff, RetryPolicy};
pub use state::{RefreshReport, SyncOutcome, SyncPhase, SyncReport, SyncSnapshot};
pub use worker::{SyncTrigger, SyncWorker, SyncWorkerHandle};

/// How a template's exercise rows reach the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSyncStrategy {
  /// Delete every remote row for the parent, then insert the full local list.
  /// Reordering and removals need no diffing.
  ReplaceAllChildren,
}

fn failure_kind(e: &RemoteError) -> FailureKind {
  if e.is_retryable() {
    FailureKind::Transient
  } else {
    FailureKind::Rejected
  }
}

pub struct SyncEngine {
  pool: SqlitePool,
  gateway: Arc<dyn RemoteGateway>,
  monitor: Arc<NetworkMonitor>,
  policy: RetryPolicy,
  child_strategy: ChildSyncStrategy,
  /// Held for the duration of a pass
  running: Mutex<()>,
  /// Set when a request arrives mid-pass
  rerun: AtomicBool,
  snapshot: watch::Sender<SyncSnapshot>,
}

impl SyncEngine {
  pub fn new(
    pool: SqlitePool,
    gateway: Arc<dyn RemoteGateway>,
    monitor: Arc<NetworkMonitor>,
    policy: RetryPolicy,
  ) -> Self {
    let (snapshot, _) = watch::channel(SyncSnapshot::default());
    Self {
      pool,
      gateway,
      monitor,
      policy,
      child_strategy: ChildSyncStrategy::ReplaceAllChildren,
      running: Mutex::new(()),
      rerun: AtomicBool::new(false),
      snapshot,
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
    self.snapshot.subscribe()
  }

  pub fn snapshot(&self) -> SyncSnapshot {
    self.snapshot.borrow().clone()
  }

  pub fn is_online(&self) -> bool {
    self.monitor.is_online()
  }

  /// Recount unsynced records after a local mutation
  pub async fn refresh_pending_count(&self) -> AppResult<i64> {
    let pending = store::pending_count(&self.pool).await?;
    self.snapshot.send_modify(|s| s.pending_count = pending);
    Ok(pending)
  }

  /// ---------------------------------------------------------------------------
  /// Push
  /// ---------------------------------------------------------------------------

  /// Replay every pending operation. At most one pass runs at a time; a call
  /// made while one is running makes that pass go round once more.
  pub async fn sync_all(&self) -> SyncOutcome {
    // The request is raised before trying the lock and checked again after
    // the lock is released, so a request racing a finishing pass is never lost.
    self.rerun.store(true, Ordering::SeqCst);
    let mut outcome = SyncOutcome::Coalesced;

    loop {
      let running = match self.running.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
          if matches!(outcome, SyncOutcome::Coalesced) {
            tracing::debug!("sync already running, coalescing request");
          }
          return outcome;
        }
      };
      self.rerun.store(false, Ordering::SeqCst);

      if !self.monitor.is_online() {
        tracing::info!("offline, skipping sync");
        let pending = store::pending_count(&self.pool).await.unwrap_or_else(|e| {
          tracing::error!(error = %e, "failed to count pending records");
          0
        });
        self.snapshot.send_modify(|s| {
          s.status = SyncPhase::Offline;
          s.pending_count = pending;
          s.progress = None;
        });
        return SyncOutcome::Offline;
      }

      outcome = SyncOutcome::Completed(self.run_pass().await);
      drop(running);

      if !self.rerun.load(Ordering::SeqCst) {
        return outcome;
      }
      tracing::debug!("changes arrived during sync, running again");
    }
  }

  async fn run_pass(&self) -> SyncReport {
    let mut report = SyncReport::default();
    self.snapshot.send_modify(|s| {
      s.status = SyncPhase::Syncing;
      s.progress = Some(0.0);
      s.error_message = None;
    });

    let (pending_templates, pending_logs) = match self.load_pending().await {
      Ok(pending) => pending,
      Err(e) => {
        tracing::error!(error = %e, "failed to read pending records");
        report.record_failure(format!("local store: {}", e));
        self.finish_pass(&report).await;
        return report;
      }
    };

    let total = pending_templates.len() + pending_logs.len();
    let mut done = 0;
    let mut children_attempted = HashSet::new();

    for template in &pending_templates {
      if self.push_template(template, &mut report).await {
        children_attempted.insert(template.id.clone());
        if template.sync_state.pending_operation() != Some(PendingOperation::Delete) {
          self
            .push_template_exercises(&template.id, template.updated_at, &mut report)
            .await;
        }
      }
      done += 1;
      self.publish_progress(done, total);
    }

    // Exercise lists that changed under an already synced template, or whose
    // earlier push failed after the template itself went through.
    match templates::templates_with_unsynced_exercises(&self.pool).await {
      Ok(waiting) => {
        for template in waiting.iter().filter(|t| !children_attempted.contains(&t.id)) {
          self
            .push_template_exercises(&template.id, template.updated_at, &mut report)
            .await;
        }
      }
      Err(e) => report.record_failure(format!("local store: {}", e)),
    }

    for log in &pending_logs {
      self.push_log(log, &mut report).await;
      done += 1;
      self.publish_progress(done, total);
    }

    self.finish_pass(&report).await;
    report
  }

  async fn load_pending(&self) -> AppResult<(Vec<WorkoutTemplate>, Vec<WorkoutLog>)> {
    Ok((
      templates::pending_templates(&self.pool).await?,
      logs::pending_logs(&self.pool).await?,
    ))
  }

  /// Returns true when the template row reached the remote store
  async fn push_template(&self, template: &WorkoutTemplate, report: &mut SyncReport) -> bool {
    let Some(op) = template.sync_state.pending_operation() else {
      return false;
    };
    let pushed_at = template.updated_at;
    let table = RemoteTable::WorkoutTemplates;
    let by_id = Filter::eq("id", &template.id);

    let result = match dto::encode(&RemoteTemplate::from(template)) {
      Err(e) => Err(e),
      Ok(row) => match op {
        PendingOperation::Create => {
          retry_with_backoff(&self.policy, || self.gateway.insert(table, vec![row.clone()])).await
        }
        PendingOperation::Update => {
          retry_with_backoff(&self.policy, || self.gateway.update(table, &by_id, row.clone())).await
        }
        PendingOperation::Delete => {
          let patch = json!({ "is_deleted": true, "updated_at": millis_to_iso(pushed_at) });
          retry_with_backoff(&self.policy, || self.gateway.update(table, &by_id, patch.clone())).await
        }
      },
    };

    match result {
      Ok(()) => {
        let stored = if op == PendingOperation::Delete {
          templates::purge_template(&self.pool, &template.id).await.map(|_| true)
        } else {
          templates::mark_template_synced(&self.pool, &template.id, pushed_at).await
        };
        match stored {
          Ok(applied) => {
            if op == PendingOperation::Delete {
              report.deletes_confirmed += 1;
            } else {
              report.templates_pushed += 1;
            }
            tracing::debug!(record_id = %template.id, %table, %op, applied, "template synced");
            applied
          }
          Err(e) => {
            tracing::error!(record_id = %template.id, error = %e, "failed to record template sync");
            report.record_failure(format!("template {}: {}", template.id, e));
            false
          }
        }
      }
      Err(e) => {
        let kind = failure_kind(&e);
        tracing::warn!(record_id = %template.id, %table, %op, error = %e, failure = kind.as_str(), "template sync failed");
        if let Err(store_err) =
          templates::mark_template_failed(&self.pool, &template.id, pushed_at, kind).await
        {
          tracing::error!(record_id = %template.id, error = %store_err, "failed to record template failure");
        }
        report.record_failure(format!("template {}: {}", template.id, e));
        false
      }
    }
  }

  async fn push_template_exercises(&self, template_id: &str, pushed_at: i64, report: &mut SyncReport) {
    let exercises = match templates::get_template_exercises(&self.pool, template_id).await {
      Ok(exercises) => exercises,
      Err(e) => {
        report.record_failure(format!("exercises of {}: {}", template_id, e));
        return;
      }
    };
    if exercises.iter().all(|e| e.sync_status == SyncStatus::Synced) {
      return;
    }

    let result = match self.child_strategy {
      ChildSyncStrategy::ReplaceAllChildren => {
        self.replace_all_exercises(template_id, &exercises).await
      }
    };

    let table = RemoteTable::TemplateExercises;
    match result {
      Ok(()) => match templates::mark_exercises_synced(&self.pool, template_id, pushed_at).await {
        Ok(_) => {
          report.exercise_sets_pushed += 1;
          tracing::debug!(record_id = %template_id, %table, count = exercises.len(), "exercises synced");
        }
        Err(e) => report.record_failure(format!("exercises of {}: {}", template_id, e)),
      },
      Err(e) => {
        let kind = failure_kind(&e);
        tracing::warn!(record_id = %template_id, %table, error = %e, failure = kind.as_str(), "exercise sync failed");
        if let Err(store_err) =
          templates::mark_exercises_failed(&self.pool, template_id, pushed_at, kind).await
        {
          tracing::error!(record_id = %template_id, error = %store_err, "failed to record exercise failure");
        }
        report.record_failure(format!("exercises of {}: {}", template_id, e));
      }
    }
  }

  async fn replace_all_exercises(
    &self,
    template_id: &str,
    exercises: &[TemplateExercise],
  ) -> Result<(), RemoteError> {
    let table = RemoteTable::TemplateExercises;
    let rows = exercises
      .iter()
      .map(|e| dto::encode(&RemoteTemplateExercise::from(e)))
      .collect::<Result<Vec<_>, _>>()?;
    let by_parent = Filter::eq("template_id", template_id);

    retry_with_backoff(&self.policy, || self.gateway.delete(table, &by_parent)).await?;
    retry_with_backoff(&self.policy, || self.gateway.insert(table, rows.clone())).await
  }

  async fn push_log(&self, log: &WorkoutLog, report: &mut SyncReport) {
    let Some(op) = log.sync_state.pending_operation() else {
      return;
    };
    let pushed_at = log.updated_at;
    let table = RemoteTable::WorkoutLogs;
    let by_id = Filter::eq("id", &log.id);

    let result = match op {
      PendingOperation::Delete => {
        let deleted_at = log.deleted_at.unwrap_or(pushed_at);
        let patch = json!({
          "deleted_at": millis_to_iso(deleted_at),
          "updated_at": millis_to_iso(pushed_at),
        });
        retry_with_backoff(&self.policy, || self.gateway.update(table, &by_id, patch.clone())).await
      }
      PendingOperation::Create | PendingOperation::Update => {
        match self.encode_log(log).await {
          Err(e) => Err(e),
          Ok(row) if op == PendingOperation::Create => {
            retry_with_backoff(&self.policy, || self.gateway.insert(table, vec![row.clone()])).await
          }
          Ok(row) => {
            retry_with_backoff(&self.policy, || self.gateway.update(table, &by_id, row.clone())).await
          }
        }
      }
    };

    match result {
      Ok(()) => {
        let stored = if op == PendingOperation::Delete {
          logs::purge_log(&self.pool, &log.id).await.map(|_| true)
        } else {
          logs::mark_log_synced(&self.pool, &log.id, pushed_at).await
        };
        match stored {
          Ok(applied) => {
            if op == PendingOperation::Delete {
              report.deletes_confirmed += 1;
            } else {
              report.logs_pushed += 1;
            }
            tracing::debug!(record_id = %log.id, %table, %op, applied, "log synced");
          }
          Err(e) => report.record_failure(format!("log {}: {}", log.id, e)),
        }
      }
      Err(e) => {
        let kind = failure_kind(&e);
        tracing::warn!(record_id = %log.id, %table, %op, error = %e, failure = kind.as_str(), "log sync failed");
        if let Err(store_err) = logs::mark_log_failed(&self.pool, &log.id, pushed_at, kind).await {
          tracing::error!(record_id = %log.id, error = %store_err, "failed to record log failure");
        }
        report.record_failure(format!("log {}: {}", log.id, e));
      }
    }
  }

  async fn encode_log(&self, log: &WorkoutLog) -> Result<serde_json::Value, RemoteError> {
    let exercises = logs::get_exercise_logs(&self.pool, &log.id)
      .await
      .map_err(|e| RemoteError::Decode(e.to_string()))?;
    dto::encode(&RemoteWorkoutLog::from_local(log, &exercises))
  }

  fn publish_progress(&self, done: usize, total: usize) {
    if total == 0 {
      return;
    }
    let progress = done as f32 / total as f32;
    self.snapshot.send_modify(|s| s.progress = Some(progress));
  }

  async fn finish_pass(&self, report: &SyncReport) {
    let pending = store::pending_count(&self.pool).await.unwrap_or_else(|e| {
      tracing::error!(error = %e, "failed to count pending records");
      0
    });

    if report.failed > 0 {
      tracing::warn!(failed = report.failed, pushed = report.pushed(), pending, "sync finished with failures");
    } else {
      tracing::info!(pushed = report.pushed(), deletes = report.deletes_confirmed, "sync finished");
    }

    self.snapshot.send_modify(|s| {
      s.pending_count = pending;
      s.progress = None;
      if report.failed > 0 {
        s.status = SyncPhase::Failed;
        s.error_message = report.errors.last().cloned();
      } else {
        s.status = SyncPhase::Synced;
        s.error_message = None;
        s.last_sync_time = Some(now_millis());
      }
    });
  }

  /// ---------------------------------------------------------------------------
  /// Retry & Pull
  /// ---------------------------------------------------------------------------

  /// Put every rejected record back in the queue. The next pass retries them.
  pub async fn retry_rejected(&self) -> AppResult<u64> {
    let requeued = templates::requeue_rejected_templates(&self.pool).await?
      + logs::requeue_rejected_logs(&self.pool).await?;
    tracing::info!(requeued, "rejected records re-queued");
    Ok(requeued)
  }

  /// Bring the owner's remote templates and logs into the local store. A
  /// local record with a pending operation wins until it has been pushed;
  /// synced local records the remote store no longer has are removed.
  pub async fn refresh_from_remote(&self, owner_id: &str) -> AppResult<RefreshReport> {
    crate::validation::require_id("owner_id", owner_id)?;
    if !self.monitor.is_online() {
      return Err(AppError::Remote(RemoteError::Network("offline".to_string())));
    }

    let result = {
      let _running = self.running.lock().await;
      self.pull(owner_id).await
    };

    // Sync requests turned away while the pull held the lock run now.
    if self.rerun.load(Ordering::SeqCst) {
      tracing::debug!("sync requested during refresh, running it now");
      self.sync_all().await;
    }
    result
  }

  async fn pull(&self, owner_id: &str) -> AppResult<RefreshReport> {
    let mut report = RefreshReport::default();
    let by_owner = Filter::eq("owner_id", owner_id);

    let rows = retry_with_backoff(&self.policy, || {
      self.gateway.query(RemoteTable::WorkoutTemplates, &by_owner)
    })
    .await?;
    let mut remote_templates = HashSet::new();
    for row in rows {
      let template = dto::decode::<RemoteTemplate>(row)?.into_local()?;
      if template.is_deleted {
        continue;
      }
      remote_templates.insert(template.id.clone());

      let by_parent = Filter::eq("template_id", &template.id);
      let exercise_rows = retry_with_backoff(&self.policy, || {
        self.gateway.query(RemoteTable::TemplateExercises, &by_parent)
      })
      .await?;
      let exercises = exercise_rows
        .into_iter()
        .map(|r| dto::decode::<RemoteTemplateExercise>(r).map(Into::into))
        .collect::<Result<Vec<TemplateExercise>, _>>()?;

      if templates::upsert_remote_template(&self.pool, &template, &exercises).await? {
        report.templates_upserted += 1;
      } else {
        report.skipped_pending += 1;
      }
    }
    report.purged +=
      templates::purge_synced_templates_except(&self.pool, owner_id, &remote_templates).await?;

    let rows = retry_with_backoff(&self.policy, || {
      self.gateway.query(RemoteTable::WorkoutLogs, &by_owner)
    })
    .await?;
    let mut remote_logs = HashSet::new();
    for row in rows {
      let (log, exercises) = dto::decode::<RemoteWorkoutLog>(row)?.into_local()?;
      if log.deleted_at.is_some() {
        continue;
      }
      remote_logs.insert(log.id.clone());
      if logs::upsert_remote_log(&self.pool, &log, &exercises).await? {
        report.logs_upserted += 1;
      } else {
        report.skipped_pending += 1;
      }
    }
    report.purged += logs::purge_synced_logs_except(&self.pool, owner_id, &remote_logs).await?;

    tracing::info!(
      owner_id,
      templates = report.templates_upserted,
      logs = report.logs_upserted,
      skipped = report.skipped_pending,
      purged = report.purged,
      "refreshed from remote"
    );
    let pending = store::pending_count(&self.pool).await?;
    self.snapshot.send_modify(|s| s.pending_count = pending);
    Ok(report)
  }
}
