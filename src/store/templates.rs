//! Workout templates and their exercise slots.

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::clock::monotonic_after;
use crate::error::{AppError, AppResult};
use crate::models::{
  FailureKind, NewTemplateExercise, NewWorkoutTemplate, PendingOperation, SyncState, SyncStatus,
  TemplateExercise, TemplateUpdate, WorkoutTemplate,
};
use crate::validation::{
  require_id, validate_name, validate_optional_text, validate_template_exercises,
  MAX_DESCRIPTION_LENGTH,
};

/// ---------------------------------------------------------------------------
/// Row Mapping
/// ---------------------------------------------------------------------------

const TEMPLATE_COLUMNS: &str = "id, owner_id, name, description, is_deleted, sync_status, \
   pending_operation, failure_kind, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
  id: String,
  owner_id: String,
  name: String,
  description: Option<String>,
  is_deleted: bool,
  sync_status: String,
  pending_operation: Option<String>,
  failure_kind: Option<String>,
  created_at: i64,
  updated_at: i64,
}

impl TryFrom<TemplateRow> for WorkoutTemplate {
  type Error = AppError;

  fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
    let sync_state = SyncState::from_columns(
      &row.sync_status,
      row.pending_operation.as_deref(),
      row.failure_kind.as_deref(),
    )?;
    Ok(WorkoutTemplate {
      id: row.id,
      owner_id: row.owner_id,
      name: row.name,
      description: row.description,
      is_deleted: row.is_deleted,
      sync_state,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(Debug, sqlx::FromRow)]
struct ExerciseRow {
  template_id: String,
  exercise_id: String,
  order_index: i64,
  target_sets: i64,
  target_reps: i64,
  rest_seconds: i64,
  sync_status: String,
}

impl TryFrom<ExerciseRow> for TemplateExercise {
  type Error = AppError;

  fn try_from(row: ExerciseRow) -> Result<Self, Self::Error> {
    Ok(TemplateExercise {
      template_id: row.template_id,
      exercise_id: row.exercise_id,
      order_index: row.order_index,
      target_sets: row.target_sets,
      target_reps: row.target_reps,
      rest_seconds: row.rest_seconds,
      sync_status: row.sync_status.parse().map_err(AppError::Storage)?,
    })
  }
}

fn collect_templates(rows: Vec<TemplateRow>) -> AppResult<Vec<WorkoutTemplate>> {
  rows.into_iter().map(WorkoutTemplate::try_from).collect()
}

/// ---------------------------------------------------------------------------
/// Local Mutations
/// ---------------------------------------------------------------------------

/// Validate and store a new template with its exercises, queued as CREATE.
pub async fn create_template(
  pool: &SqlitePool,
  new: NewWorkoutTemplate,
  now: i64,
) -> AppResult<WorkoutTemplate> {
  require_id("owner_id", &new.owner_id)?;
  let name = validate_name("template name", &new.name)?;
  let description =
    validate_optional_text("description", new.description.as_deref(), MAX_DESCRIPTION_LENGTH)?;
  validate_template_exercises(&new.exercises)?;

  let template = WorkoutTemplate {
    id: Uuid::new_v4().to_string(),
    owner_id: new.owner_id,
    name,
    description,
    is_deleted: false,
    sync_state: SyncState::pending(PendingOperation::Create),
    created_at: now,
    updated_at: now,
  };

  let mut tx = pool.begin().await?;
  write_template(&mut tx, &template).await?;
  insert_exercises(&mut tx, &template.id, &new.exercises, SyncStatus::PendingSync).await?;
  tx.commit().await?;

  tracing::debug!(template_id = %template.id, "template created");
  Ok(template)
}

/// Apply a partial edit. Queues UPDATE, merged with whatever is already pending.
pub async fn update_template(
  pool: &SqlitePool,
  template_id: &str,
  owner_id: &str,
  update: TemplateUpdate,
  now: i64,
) -> AppResult<WorkoutTemplate> {
  require_id("template_id", template_id)?;
  require_id("owner_id", owner_id)?;
  let name = update
    .name
    .as_deref()
    .map(|n| validate_name("template name", n))
    .transpose()?;
  let description =
    validate_optional_text("description", update.description.as_deref(), MAX_DESCRIPTION_LENGTH)?;
  if let Some(exercises) = &update.exercises {
    validate_template_exercises(exercises)?;
  }

  let mut template = load_owned_live(pool, template_id, owner_id).await?;
  template.sync_state = template
    .sync_state
    .after_local_mutation(PendingOperation::Update)?;
  if let Some(name) = name {
    template.name = name;
  }
  if update.description.is_some() {
    template.description = description;
  }
  template.updated_at = monotonic_after(template.updated_at, now);

  let mut tx = pool.begin().await?;
  write_template(&mut tx, &template).await?;
  if let Some(exercises) = &update.exercises {
    replace_exercises(&mut tx, &template.id, exercises).await?;
  }
  tx.commit().await?;

  Ok(template)
}

/// Replace only the exercise list. The template row keeps its sync state; the
/// new children are PENDING_SYNC and get pushed on their own.
pub async fn replace_template_exercises(
  pool: &SqlitePool,
  template_id: &str,
  owner_id: &str,
  exercises: &[NewTemplateExercise],
  now: i64,
) -> AppResult<Vec<TemplateExercise>> {
  require_id("template_id", template_id)?;
  validate_template_exercises(exercises)?;
  let template = load_owned_live(pool, template_id, owner_id).await?;

  let mut tx = pool.begin().await?;
  sqlx::query("UPDATE workout_templates SET updated_at = ?1 WHERE id = ?2")
    .bind(monotonic_after(template.updated_at, now))
    .bind(template_id)
    .execute(&mut *tx)
    .await?;
  replace_exercises(&mut tx, template_id, exercises).await?;
  tx.commit().await?;

  get_template_exercises(pool, template_id).await
}

/// Soft delete: hide the template and queue DELETE. The row is purged once the
/// remote delete is confirmed.
pub async fn delete_template(
  pool: &SqlitePool,
  template_id: &str,
  owner_id: &str,
  now: i64,
) -> AppResult<WorkoutTemplate> {
  require_id("template_id", template_id)?;
  require_id("owner_id", owner_id)?;

  let mut template = load_owned_live(pool, template_id, owner_id).await?;
  template.sync_state = template
    .sync_state
    .after_local_mutation(PendingOperation::Delete)?;
  template.is_deleted = true;
  template.updated_at = monotonic_after(template.updated_at, now);

  let mut conn = pool.acquire().await?;
  write_template(&mut conn, &template).await?;
  Ok(template)
}

/// ---------------------------------------------------------------------------
/// Queries
/// ---------------------------------------------------------------------------

pub async fn get_template(pool: &SqlitePool, template_id: &str) -> AppResult<Option<WorkoutTemplate>> {
  let row = sqlx::query_as::<_, TemplateRow>(&format!(
    "SELECT {} FROM workout_templates WHERE id = ?1",
    TEMPLATE_COLUMNS
  ))
  .bind(template_id)
  .fetch_optional(pool)
  .await?;

  row.map(WorkoutTemplate::try_from).transpose()
}

/// Visible templates for an owner, most recently edited first
pub async fn list_templates(pool: &SqlitePool, owner_id: &str) -> AppResult<Vec<WorkoutTemplate>> {
  let rows = sqlx::query_as::<_, TemplateRow>(&format!(
    "SELECT {} FROM workout_templates WHERE owner_id = ?1 AND is_deleted = 0 \
     ORDER BY updated_at DESC",
    TEMPLATE_COLUMNS
  ))
  .bind(owner_id)
  .fetch_all(pool)
  .await?;

  collect_templates(rows)
}

pub async fn get_template_exercises(
  pool: &SqlitePool,
  template_id: &str,
) -> AppResult<Vec<TemplateExercise>> {
  let rows = sqlx::query_as::<_, ExerciseRow>(
    r#"
    SELECT template_id, exercise_id, order_index, target_sets, target_reps,
           rest_seconds, sync_status
    FROM template_exercises
    WHERE template_id = ?1
    ORDER BY order_index
    "#,
  )
  .bind(template_id)
  .fetch_all(pool)
  .await?;

  rows.into_iter().map(TemplateExercise::try_from).collect()
}

/// Templates with an operation to replay. Rejected records wait for a new
/// edit or an explicit retry.
pub async fn pending_templates(pool: &SqlitePool) -> AppResult<Vec<WorkoutTemplate>> {
  let rows = sqlx::query_as::<_, TemplateRow>(&format!(
    "SELECT {} FROM workout_templates \
     WHERE pending_operation IS NOT NULL \
       AND (failure_kind IS NULL OR failure_kind != 'rejected') \
     ORDER BY updated_at, id",
    TEMPLATE_COLUMNS
  ))
  .fetch_all(pool)
  .await?;

  collect_templates(rows)
}

/// Synced, live templates whose exercise list still needs pushing. Lists the
/// server rejected wait for a new edit or an explicit retry.
pub async fn templates_with_unsynced_exercises(
  pool: &SqlitePool,
) -> AppResult<Vec<WorkoutTemplate>> {
  let rows = sqlx::query_as::<_, TemplateRow>(&format!(
    "SELECT {} FROM workout_templates t \
     WHERE t.sync_status = 'SYNCED' AND t.is_deleted = 0 \
       AND EXISTS (SELECT 1 FROM template_exercises e \
                   WHERE e.template_id = t.id AND e.sync_status != 'SYNCED' \
                     AND (e.failure_kind IS NULL OR e.failure_kind != 'rejected')) \
     ORDER BY t.updated_at, t.id",
    TEMPLATE_COLUMNS
  ))
  .fetch_all(pool)
  .await?;

  collect_templates(rows)
}

/// Templates waiting on anything: the row itself or its exercises
pub async fn count_unsynced_templates(pool: &SqlitePool) -> AppResult<i64> {
  let count: i64 = sqlx::query_scalar(
    r#"
    SELECT COUNT(*) FROM workout_templates t
    WHERE t.pending_operation IS NOT NULL
       OR EXISTS (SELECT 1 FROM template_exercises e
                  WHERE e.template_id = t.id AND e.sync_status != 'SYNCED')
    "#,
  )
  .fetch_one(pool)
  .await?;
  Ok(count)
}

/// ---------------------------------------------------------------------------
/// Sync Status Transitions
/// ---------------------------------------------------------------------------

/// Clear the pending operation, provided the row was not edited after
/// `pushed_at`. Returns false when a newer edit is still waiting.
pub async fn mark_template_synced(
  pool: &SqlitePool,
  template_id: &str,
  pushed_at: i64,
) -> AppResult<bool> {
  let (status, op, failure) = SyncState::Synced.to_columns();
  let result = sqlx::query(
    r#"
    UPDATE workout_templates
    SET sync_status = ?1, pending_operation = ?2, failure_kind = ?3
    WHERE id = ?4 AND updated_at = ?5
    "#,
  )
  .bind(status)
  .bind(op)
  .bind(failure)
  .bind(template_id)
  .bind(pushed_at)
  .execute(pool)
  .await?;

  Ok(result.rows_affected() > 0)
}

/// Move a pending template to SYNC_FAILED, keeping its operation.
pub async fn mark_template_failed(
  pool: &SqlitePool,
  template_id: &str,
  pushed_at: i64,
  failure: FailureKind,
) -> AppResult<bool> {
  let result = sqlx::query(
    r#"
    UPDATE workout_templates
    SET sync_status = ?1, failure_kind = ?2
    WHERE id = ?3 AND updated_at = ?4 AND pending_operation IS NOT NULL
    "#,
  )
  .bind(SyncStatus::SyncFailed.to_string())
  .bind(failure.as_str())
  .bind(template_id)
  .bind(pushed_at)
  .execute(pool)
  .await?;

  Ok(result.rows_affected() > 0)
}

pub async fn mark_exercises_synced(
  pool: &SqlitePool,
  template_id: &str,
  pushed_at: i64,
) -> AppResult<u64> {
  set_exercise_status(pool, template_id, pushed_at, SyncStatus::Synced, None).await
}

pub async fn mark_exercises_failed(
  pool: &SqlitePool,
  template_id: &str,
  pushed_at: i64,
  failure: FailureKind,
) -> AppResult<u64> {
  set_exercise_status(pool, template_id, pushed_at, SyncStatus::SyncFailed, Some(failure)).await
}

async fn set_exercise_status(
  pool: &SqlitePool,
  template_id: &str,
  pushed_at: i64,
  status: SyncStatus,
  failure: Option<FailureKind>,
) -> AppResult<u64> {
  // A replace after `pushed_at` bumps the parent's updated_at, so the guard
  // keeps newer children pending.
  let result = sqlx::query(
    r#"
    UPDATE template_exercises
    SET sync_status = ?1, failure_kind = ?4
    WHERE template_id = ?2
      AND sync_status != 'SYNCED'
      AND EXISTS (SELECT 1 FROM workout_templates WHERE id = ?2 AND updated_at = ?3)
    "#,
  )
  .bind(status.to_string())
  .bind(template_id)
  .bind(pushed_at)
  .bind(failure.map(|f| f.as_str()))
  .execute(pool)
  .await?;

  Ok(result.rows_affected())
}

/// Physically remove a template after its remote delete went through
pub async fn purge_template(pool: &SqlitePool, template_id: &str) -> AppResult<()> {
  let mut tx = pool.begin().await?;
  sqlx::query("DELETE FROM template_exercises WHERE template_id = ?1")
    .bind(template_id)
    .execute(&mut *tx)
    .await?;
  sqlx::query("DELETE FROM workout_templates WHERE id = ?1")
    .bind(template_id)
    .execute(&mut *tx)
    .await?;
  tx.commit().await?;
  Ok(())
}

/// User-initiated retry: put rejected templates and rejected exercise lists
/// back in the queue. Returns how many templates were affected.
pub async fn requeue_rejected_templates(pool: &SqlitePool) -> AppResult<u64> {
  let mut tx = pool.begin().await?;

  let affected: i64 = sqlx::query_scalar(
    r#"
    SELECT COUNT(*) FROM workout_templates t
    WHERE (t.failure_kind = 'rejected' AND t.pending_operation IS NOT NULL)
       OR EXISTS (SELECT 1 FROM template_exercises e
                  WHERE e.template_id = t.id AND e.failure_kind = 'rejected')
    "#,
  )
  .fetch_one(&mut *tx)
  .await?;
  sqlx::query(
    r#"
    UPDATE template_exercises
    SET sync_status = 'PENDING_SYNC', failure_kind = NULL
    WHERE failure_kind = 'rejected'
    "#,
  )
  .execute(&mut *tx)
  .await?;

  sqlx::query(
    r#"
    UPDATE workout_templates
    SET sync_status = 'PENDING_SYNC', failure_kind = NULL
    WHERE failure_kind = 'rejected' AND pending_operation IS NOT NULL
    "#,
  )
  .execute(&mut *tx)
  .await?;

  tx.commit().await?;
  Ok(affected as u64)
}

/// ---------------------------------------------------------------------------
/// Pull Reconciliation
/// ---------------------------------------------------------------------------

/// Store a template read from the remote store as SYNCED. A local copy with
/// a pending operation, or with an exercise list not yet pushed, wins and is
/// left alone; returns whether anything was written.
pub async fn upsert_remote_template(
  pool: &SqlitePool,
  template: &WorkoutTemplate,
  exercises: &[TemplateExercise],
) -> AppResult<bool> {
  let mut tx = pool.begin().await?;

  let locally_pending: Option<bool> = sqlx::query_scalar(
    r#"
    SELECT t.pending_operation IS NOT NULL
        OR EXISTS (SELECT 1 FROM template_exercises e
                   WHERE e.template_id = t.id AND e.sync_status != 'SYNCED')
    FROM workout_templates t
    WHERE t.id = ?1
    "#,
  )
  .bind(&template.id)
  .fetch_optional(&mut *tx)
  .await?;
  if locally_pending == Some(true) {
    return Ok(false);
  }

  let synced = WorkoutTemplate {
    sync_state: SyncState::Synced,
    ..template.clone()
  };
  write_template(&mut tx, &synced).await?;

  sqlx::query("DELETE FROM template_exercises WHERE template_id = ?1")
    .bind(&template.id)
    .execute(&mut *tx)
    .await?;
  for exercise in exercises {
    sqlx::query(
      r#"
      INSERT INTO template_exercises (
        template_id, exercise_id, order_index, target_sets, target_reps,
        rest_seconds, sync_status
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'SYNCED')
      "#,
    )
    .bind(&template.id)
    .bind(&exercise.exercise_id)
    .bind(exercise.order_index)
    .bind(exercise.target_sets)
    .bind(exercise.target_reps)
    .bind(exercise.rest_seconds)
    .execute(&mut *tx)
    .await?;
  }

  tx.commit().await?;
  Ok(true)
}

/// Drop synced local templates of `owner_id` that the remote store no longer has
pub async fn purge_synced_templates_except(
  pool: &SqlitePool,
  owner_id: &str,
  remote_ids: &HashSet<String>,
) -> AppResult<u64> {
  let local_ids: Vec<String> = sqlx::query_scalar(
    "SELECT id FROM workout_templates WHERE owner_id = ?1 AND sync_status = 'SYNCED'",
  )
  .bind(owner_id)
  .fetch_all(pool)
  .await?;

  let mut purged = 0;
  for id in local_ids.into_iter().filter(|id| !remote_ids.contains(id)) {
    purge_template(pool, &id).await?;
    purged += 1;
  }
  Ok(purged)
}

/// ---------------------------------------------------------------------------
/// Internal Helpers
/// ---------------------------------------------------------------------------

async fn load_owned_live(
  pool: &SqlitePool,
  template_id: &str,
  owner_id: &str,
) -> AppResult<WorkoutTemplate> {
  match get_template(pool, template_id).await? {
    Some(t) if t.owner_id == owner_id && !t.is_deleted => Ok(t),
    _ => Err(AppError::not_found("workout template", template_id)),
  }
}

/// Insert-or-update on the primary key without a delete, so the exercise
/// rows referencing the template are never cascaded away.
async fn write_template(conn: &mut SqliteConnection, template: &WorkoutTemplate) -> AppResult<()> {
  let (status, op, failure) = template.sync_state.to_columns();
  sqlx::query(
    r#"
    INSERT INTO workout_templates (
      id, owner_id, name, description, is_deleted, sync_status,
      pending_operation, failure_kind, created_at, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(id) DO UPDATE SET
      owner_id = excluded.owner_id,
      name = excluded.name,
      description = excluded.description,
      is_deleted = excluded.is_deleted,
      sync_status = excluded.sync_status,
      pending_operation = excluded.pending_operation,
      failure_kind = excluded.failure_kind,
      updated_at = excluded.updated_at
    "#,
  )
  .bind(&template.id)
  .bind(&template.owner_id)
  .bind(&template.name)
  .bind(&template.description)
  .bind(template.is_deleted)
  .bind(status)
  .bind(op)
  .bind(failure)
  .bind(template.created_at)
  .bind(template.updated_at)
  .execute(&mut *conn)
  .await?;
  Ok(())
}

async fn insert_exercises(
  conn: &mut SqliteConnection,
  template_id: &str,
  exercises: &[NewTemplateExercise],
  status: SyncStatus,
) -> AppResult<()> {
  for (index, exercise) in exercises.iter().enumerate() {
    sqlx::query(
      r#"
      INSERT INTO template_exercises (
        template_id, exercise_id, order_index, target_sets, target_reps,
        rest_seconds, sync_status
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      "#,
    )
    .bind(template_id)
    .bind(&exercise.exercise_id)
    .bind(index as i64)
    .bind(exercise.target_sets)
    .bind(exercise.target_reps)
    .bind(exercise.rest_seconds)
    .bind(status.to_string())
    .execute(&mut *conn)
    .await?;
  }
  Ok(())
}

async fn replace_exercises(
  conn: &mut SqliteConnection,
  template_id: &str,
  exercises: &[NewTemplateExercise],
) -> AppResult<()> {
  sqlx::query("DELETE FROM template_exercises WHERE template_id = ?1")
    .bind(template_id)
    .execute(&mut *conn)
    .await?;
  insert_exercises(conn, template_id, exercises, SyncStatus::PendingSync).await
}
