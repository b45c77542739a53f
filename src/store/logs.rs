//! Finished workouts and their exercise entries.
//!
//! Exercise entries travel inside their parent log when pushed, so their
//! status always follows the parent's.

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;

use crate::clock::monotonic_after;
use crate::error::{AppError, AppResult};
use crate::models::{
  ExerciseLog, FailureKind, PendingOperation, SyncState, SyncStatus, WorkoutLog, WorkoutSet,
};
use crate::validation::{require_id, validate_optional_text, MAX_NOTES_LENGTH};

/// ---------------------------------------------------------------------------
/// Row Mapping
/// ---------------------------------------------------------------------------

const LOG_COLUMNS: &str = "id, owner_id, template_id, template_name, date, start_time, end_time, \
   total_volume, total_sets, total_reps, notes, sync_status, pending_operation, failure_kind, \
   deleted_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
  id: String,
  owner_id: String,
  template_id: Option<String>,
  template_name: String,
  date: i64,
  start_time: i64,
  end_time: i64,
  total_volume: f64,
  total_sets: i64,
  total_reps: i64,
  notes: Option<String>,
  sync_status: String,
  pending_operation: Option<String>,
  failure_kind: Option<String>,
  deleted_at: Option<i64>,
  created_at: i64,
  updated_at: i64,
}

impl TryFrom<LogRow> for WorkoutLog {
  type Error = AppError;

  fn try_from(row: LogRow) -> Result<Self, Self::Error> {
    let sync_state = SyncState::from_columns(
      &row.sync_status,
      row.pending_operation.as_deref(),
      row.failure_kind.as_deref(),
    )?;
    Ok(WorkoutLog {
      id: row.id,
      owner_id: row.owner_id,
      template_id: row.template_id,
      template_name: row.template_name,
      date: row.date,
      start_time: row.start_time,
      end_time: row.end_time,
      total_volume: row.total_volume,
      total_sets: row.total_sets,
      total_reps: row.total_reps,
      notes: row.notes,
      sync_state,
      deleted_at: row.deleted_at,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(Debug, sqlx::FromRow)]
struct ExerciseLogRow {
  id: String,
  workout_log_id: String,
  exercise_id: String,
  exercise_name: String,
  category: String,
  order_index: i64,
  sets_json: String,
  sync_status: String,
}

impl TryFrom<ExerciseLogRow> for ExerciseLog {
  type Error = AppError;

  fn try_from(row: ExerciseLogRow) -> Result<Self, Self::Error> {
    let sets: Vec<WorkoutSet> = serde_json::from_str(&row.sets_json)?;
    Ok(ExerciseLog {
      id: row.id,
      workout_log_id: row.workout_log_id,
      exercise_id: row.exercise_id,
      exercise_name: row.exercise_name,
      category: row.category,
      order_index: row.order_index,
      sets,
      sync_status: row.sync_status.parse().map_err(AppError::Storage)?,
    })
  }
}

fn collect_logs(rows: Vec<LogRow>) -> AppResult<Vec<WorkoutLog>> {
  rows.into_iter().map(WorkoutLog::try_from).collect()
}

/// ---------------------------------------------------------------------------
/// Local Mutations
/// ---------------------------------------------------------------------------

/// Write a log and its exercise entries on the caller's connection, normally
/// an open transaction, so the insert commits together with whatever else the
/// caller does.
pub async fn insert_log(
  conn: &mut SqliteConnection,
  log: &WorkoutLog,
  exercises: &[ExerciseLog],
) -> AppResult<()> {
  require_id("owner_id", &log.owner_id)?;
  write_log(conn, log).await?;
  write_exercise_logs(conn, exercises).await
}

pub async fn update_log_notes(
  pool: &SqlitePool,
  log_id: &str,
  owner_id: &str,
  notes: Option<&str>,
  now: i64,
) -> AppResult<WorkoutLog> {
  require_id("log_id", log_id)?;
  require_id("owner_id", owner_id)?;
  let notes = validate_optional_text("notes", notes, MAX_NOTES_LENGTH)?;

  let mut log = load_owned_live(pool, log_id, owner_id).await?;
  log.sync_state = log.sync_state.after_local_mutation(PendingOperation::Update)?;
  log.notes = notes;
  log.updated_at = monotonic_after(log.updated_at, now);

  let mut conn = pool.acquire().await?;
  write_log(&mut conn, &log).await?;
  Ok(log)
}

/// Soft delete: stamp `deleted_at` and queue DELETE
pub async fn delete_log(
  pool: &SqlitePool,
  log_id: &str,
  owner_id: &str,
  now: i64,
) -> AppResult<WorkoutLog> {
  require_id("log_id", log_id)?;
  require_id("owner_id", owner_id)?;

  let mut log = load_owned_live(pool, log_id, owner_id).await?;
  log.sync_state = log.sync_state.after_local_mutation(PendingOperation::Delete)?;
  log.updated_at = monotonic_after(log.updated_at, now);
  log.deleted_at = Some(log.updated_at);

  let mut conn = pool.acquire().await?;
  write_log(&mut conn, &log).await?;
  Ok(log)
}

/// ---------------------------------------------------------------------------
/// Queries
/// ---------------------------------------------------------------------------

pub async fn get_log(pool: &SqlitePool, log_id: &str) -> AppResult<Option<WorkoutLog>> {
  let row = sqlx::query_as::<_, LogRow>(&format!(
    "SELECT {} FROM workout_logs WHERE id = ?1",
    LOG_COLUMNS
  ))
  .bind(log_id)
  .fetch_optional(pool)
  .await?;

  row.map(WorkoutLog::try_from).transpose()
}

/// Workout history for an owner, newest first
pub async fn list_logs(pool: &SqlitePool, owner_id: &str) -> AppResult<Vec<WorkoutLog>> {
  let rows = sqlx::query_as::<_, LogRow>(&format!(
    "SELECT {} FROM workout_logs WHERE owner_id = ?1 AND deleted_at IS NULL \
     ORDER BY date DESC, start_time DESC",
    LOG_COLUMNS
  ))
  .bind(owner_id)
  .fetch_all(pool)
  .await?;

  collect_logs(rows)
}

pub async fn get_exercise_logs(pool: &SqlitePool, log_id: &str) -> AppResult<Vec<ExerciseLog>> {
  let rows = sqlx::query_as::<_, ExerciseLogRow>(
    r#"
    SELECT id, workout_log_id, exercise_id, exercise_name, category, order_index,
           sets_json, sync_status
    FROM exercise_logs
    WHERE workout_log_id = ?1
    ORDER BY order_index
    "#,
  )
  .bind(log_id)
  .fetch_all(pool)
  .await?;

  rows.into_iter().map(ExerciseLog::try_from).collect()
}

/// Logs with an operation to replay, skipping rejected ones
pub async fn pending_logs(pool: &SqlitePool) -> AppResult<Vec<WorkoutLog>> {
  let rows = sqlx::query_as::<_, LogRow>(&format!(
    "SELECT {} FROM workout_logs \
     WHERE pending_operation IS NOT NULL \
       AND (failure_kind IS NULL OR failure_kind != 'rejected') \
     ORDER BY updated_at, id",
    LOG_COLUMNS
  ))
  .fetch_all(pool)
  .await?;

  collect_logs(rows)
}

pub async fn count_unsynced_logs(pool: &SqlitePool) -> AppResult<i64> {
  let count: i64 =
    sqlx::query_scalar("SELECT COUNT(*) FROM workout_logs WHERE pending_operation IS NOT NULL")
      .fetch_one(pool)
      .await?;
  Ok(count)
}

/// ---------------------------------------------------------------------------
/// Sync Status Transitions
/// ---------------------------------------------------------------------------

/// Mark the log and its entries SYNCED unless it was edited after `pushed_at`
pub async fn mark_log_synced(pool: &SqlitePool, log_id: &str, pushed_at: i64) -> AppResult<bool> {
  let (status, op, failure) = SyncState::Synced.to_columns();
  let mut tx = pool.begin().await?;

  let result = sqlx::query(
    r#"
    UPDATE workout_logs
    SET sync_status = ?1, pending_operation = ?2, failure_kind = ?3
    WHERE id = ?4 AND updated_at = ?5
    "#,
  )
  .bind(status)
  .bind(op)
  .bind(failure)
  .bind(log_id)
  .bind(pushed_at)
  .execute(&mut *tx)
  .await?;

  let applied = result.rows_affected() > 0;
  if applied {
    set_children_status(&mut tx, log_id, SyncStatus::Synced).await?;
  }
  tx.commit().await?;
  Ok(applied)
}

pub async fn mark_log_failed(
  pool: &SqlitePool,
  log_id: &str,
  pushed_at: i64,
  failure: FailureKind,
) -> AppResult<bool> {
  let mut tx = pool.begin().await?;

  let result = sqlx::query(
    r#"
    UPDATE workout_logs
    SET sync_status = ?1, failure_kind = ?2
    WHERE id = ?3 AND updated_at = ?4 AND pending_operation IS NOT NULL
    "#,
  )
  .bind(SyncStatus::SyncFailed.to_string())
  .bind(failure.as_str())
  .bind(log_id)
  .bind(pushed_at)
  .execute(&mut *tx)
  .await?;

  let applied = result.rows_affected() > 0;
  if applied {
    set_children_status(&mut tx, log_id, SyncStatus::SyncFailed).await?;
  }
  tx.commit().await?;
  Ok(applied)
}

/// Remove a log for good once its remote delete is confirmed
pub async fn purge_log(pool: &SqlitePool, log_id: &str) -> AppResult<()> {
  let mut tx = pool.begin().await?;
  sqlx::query("DELETE FROM exercise_logs WHERE workout_log_id = ?1")
    .bind(log_id)
    .execute(&mut *tx)
    .await?;
  sqlx::query("DELETE FROM workout_logs WHERE id = ?1")
    .bind(log_id)
    .execute(&mut *tx)
    .await?;
  tx.commit().await?;
  Ok(())
}

pub async fn requeue_rejected_logs(pool: &SqlitePool) -> AppResult<u64> {
  let result = sqlx::query(
    r#"
    UPDATE workout_logs
    SET sync_status = 'PENDING_SYNC', failure_kind = NULL
    WHERE failure_kind = 'rejected' AND pending_operation IS NOT NULL
    "#,
  )
  .execute(pool)
  .await?;
  Ok(result.rows_affected())
}

/// ---------------------------------------------------------------------------
/// Pull Reconciliation
/// ---------------------------------------------------------------------------

/// Store a remote log as SYNCED, unless the local copy still has an operation
/// waiting. Returns whether anything was written.
pub async fn upsert_remote_log(
  pool: &SqlitePool,
  log: &WorkoutLog,
  exercises: &[ExerciseLog],
) -> AppResult<bool> {
  let mut tx = pool.begin().await?;

  let local_op: Option<Option<String>> =
    sqlx::query_scalar("SELECT pending_operation FROM workout_logs WHERE id = ?1")
      .bind(&log.id)
      .fetch_optional(&mut *tx)
      .await?;
  if matches!(local_op, Some(Some(_))) {
    return Ok(false);
  }

  let synced = WorkoutLog {
    sync_state: SyncState::Synced,
    ..log.clone()
  };
  write_log(&mut tx, &synced).await?;

  sqlx::query("DELETE FROM exercise_logs WHERE workout_log_id = ?1")
    .bind(&log.id)
    .execute(&mut *tx)
    .await?;
  let synced_children: Vec<ExerciseLog> = exercises
    .iter()
    .cloned()
    .map(|e| ExerciseLog {
      workout_log_id: log.id.clone(),
      sync_status: SyncStatus::Synced,
      ..e
    })
    .collect();
  write_exercise_logs(&mut tx, &synced_children).await?;

  tx.commit().await?;
  Ok(true)
}

/// Drop synced local logs of `owner_id` missing from the remote listing
pub async fn purge_synced_logs_except(
  pool: &SqlitePool,
  owner_id: &str,
  remote_ids: &HashSet<String>,
) -> AppResult<u64> {
  let local_ids: Vec<String> = sqlx::query_scalar(
    "SELECT id FROM workout_logs WHERE owner_id = ?1 AND sync_status = 'SYNCED'",
  )
  .bind(owner_id)
  .fetch_all(pool)
  .await?;

  let mut purged = 0;
  for id in local_ids.into_iter().filter(|id| !remote_ids.contains(id)) {
    purge_log(pool, &id).await?;
    purged += 1;
  }
  Ok(purged)
}

/// ---------------------------------------------------------------------------
/// Internal Helpers
/// ---------------------------------------------------------------------------

async fn load_owned_live(pool: &SqlitePool, log_id: &str, owner_id: &str) -> AppResult<WorkoutLog> {
  match get_log(pool, log_id).await? {
    Some(log) if log.owner_id == owner_id && log.deleted_at.is_none() => Ok(log),
    _ => Err(AppError::not_found("workout log", log_id)),
  }
}

async fn write_log(conn: &mut SqliteConnection, log: &WorkoutLog) -> AppResult<()> {
  let (status, op, failure) = log.sync_state.to_columns();
  sqlx::query(
    r#"
    INSERT INTO workout_logs (
      id, owner_id, template_id, template_name, date, start_time, end_time,
      total_volume, total_sets, total_reps, notes, sync_status,
      pending_operation, failure_kind, deleted_at, created_at, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
    ON CONFLICT(id) DO UPDATE SET
      owner_id = excluded.owner_id,
      template_id = excluded.template_id,
      template_name = excluded.template_name,
      date = excluded.date,
      start_time = excluded.start_time,
      end_time = excluded.end_time,
      total_volume = excluded.total_volume,
      total_sets = excluded.total_sets,
      total_reps = excluded.total_reps,
      notes = excluded.notes,
      sync_status = excluded.sync_status,
      pending_operation = excluded.pending_operation,
      failure_kind = excluded.failure_kind,
      deleted_at = excluded.deleted_at,
      updated_at = excluded.updated_at
    "#,
  )
  .bind(&log.id)
  .bind(&log.owner_id)
  .bind(&log.template_id)
  .bind(&log.template_name)
  .bind(log.date)
  .bind(log.start_time)
  .bind(log.end_time)
  .bind(log.total_volume)
  .bind(log.total_sets)
  .bind(log.total_reps)
  .bind(&log.notes)
  .bind(status)
  .bind(op)
  .bind(failure)
  .bind(log.deleted_at)
  .bind(log.created_at)
  .bind(log.updated_at)
  .execute(&mut *conn)
  .await?;
  Ok(())
}

async fn write_exercise_logs(conn: &mut SqliteConnection, exercises: &[ExerciseLog]) -> AppResult<()> {
  for exercise in exercises {
    let sets_json = serde_json::to_string(&exercise.sets)?;
    sqlx::query(
      r#"
      INSERT INTO exercise_logs (
        id, workout_log_id, exercise_id, exercise_name, category, order_index,
        sets_json, sync_status
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
    )
    .bind(&exercise.id)
    .bind(&exercise.workout_log_id)
    .bind(&exercise.exercise_id)
    .bind(&exercise.exercise_name)
    .bind(&exercise.category)
    .bind(exercise.order_index)
    .bind(sets_json)
    .bind(exercise.sync_status.to_string())
    .execute(&mut *conn)
    .await?;
  }
  Ok(())
}

async fn set_children_status(
  conn: &mut SqliteConnection,
  log_id: &str,
  status: SyncStatus,
) -> AppResult<()> {
  sqlx::query("UPDATE exercise_logs SET sync_status = ?1 WHERE workout_log_id = ?2")
    .bind(status.to_string())
    .bind(log_id)
    .execute(&mut *conn)
    .await?;
  Ok(())
}
