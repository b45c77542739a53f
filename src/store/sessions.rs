//! The in-progress workout, one per user.
//!
//! Sessions are written on every meaningful change so a restarted app can
//! pick up where it left off. They are never queued for sync; only the log
//! produced by [`finish`] is.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
  ActiveSession, ExerciseLog, NewSession, PendingOperation, RestTimer, SessionExercise, SyncState,
  SyncStatus, WorkoutLog, WorkoutTotals,
};
use crate::clock::start_of_day;
use crate::store::logs;
use crate::validation::{require_id, validate_name};

const SESSION_COLUMNS: &str = "id, user_id, template_id, template_name, start_time, is_paused, \
   total_paused_time_ms, last_pause_time, current_exercise_index, exercises_json, \
   rest_timer_json, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
  id: String,
  user_id: String,
  template_id: Option<String>,
  template_name: String,
  start_time: i64,
  is_paused: bool,
  total_paused_time_ms: i64,
  last_pause_time: Option<i64>,
  current_exercise_index: i64,
  exercises_json: String,
  rest_timer_json: Option<String>,
  updated_at: i64,
}

impl TryFrom<SessionRow> for ActiveSession {
  type Error = AppError;

  fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
    let exercises: Vec<SessionExercise> = serde_json::from_str(&row.exercises_json)?;
    let rest_timer: Option<RestTimer> = row
      .rest_timer_json
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;

    Ok(ActiveSession {
      id: row.id,
      user_id: row.user_id,
      template_id: row.template_id,
      template_name: row.template_name,
      start_time: row.start_time,
      is_paused: row.is_paused,
      total_paused_time_ms: row.total_paused_time_ms,
      last_pause_time: row.last_pause_time,
      current_exercise_index: row.current_exercise_index,
      exercises,
      rest_timer,
      updated_at: row.updated_at,
    })
  }
}

/// Begin a workout for `user_id`, discarding any session they left open
pub async fn start(
  pool: &SqlitePool,
  user_id: &str,
  new: NewSession,
  now: i64,
) -> AppResult<ActiveSession> {
  require_id("user_id", user_id)?;
  let template_name = validate_name("template name", &new.template_name)?;
  if new.exercises.is_empty() {
    return Err(AppError::invalid("a session needs at least one exercise"));
  }
  for exercise in &new.exercises {
    require_id("exercise_id", &exercise.exercise_id)?;
  }

  let session = ActiveSession {
    id: Uuid::new_v4().to_string(),
    user_id: user_id.to_string(),
    template_id: new.template_id,
    template_name,
    start_time: now,
    is_paused: false,
    total_paused_time_ms: 0,
    last_pause_time: None,
    current_exercise_index: 0,
    exercises: new.exercises,
    rest_timer: None,
    updated_at: now,
  };

  let mut tx = pool.begin().await?;
  let replaced = sqlx::query("DELETE FROM active_sessions WHERE user_id = ?1")
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
  write_session(&mut tx, &session).await?;
  tx.commit().await?;

  if replaced > 0 {
    tracing::info!(user_id, "previous active session replaced");
  }
  Ok(session)
}

/// Persist the full in-memory state of a running session. A session that was
/// finished or cancelled in the meantime stays gone.
pub async fn update(pool: &SqlitePool, session: &ActiveSession) -> AppResult<()> {
  let (exercises_json, rest_timer_json) = encode_progress(session)?;

  let result = sqlx::query(
    r#"
    UPDATE active_sessions
    SET is_paused = ?1,
        total_paused_time_ms = ?2,
        last_pause_time = ?3,
        current_exercise_index = ?4,
        exercises_json = ?5,
        rest_timer_json = ?6,
        updated_at = ?7
    WHERE id = ?8 AND user_id = ?9
    "#,
  )
  .bind(session.is_paused)
  .bind(session.total_paused_time_ms)
  .bind(session.last_pause_time)
  .bind(session.current_exercise_index)
  .bind(exercises_json)
  .bind(rest_timer_json)
  .bind(session.updated_at)
  .bind(&session.id)
  .bind(&session.user_id)
  .execute(pool)
  .await?;

  if result.rows_affected() == 0 {
    return Err(AppError::not_found("active session", &session.id));
  }
  Ok(())
}

pub async fn get_for_user(pool: &SqlitePool, user_id: &str) -> AppResult<Option<ActiveSession>> {
  let row = sqlx::query_as::<_, SessionRow>(&format!(
    "SELECT {} FROM active_sessions WHERE user_id = ?1",
    SESSION_COLUMNS
  ))
  .bind(user_id)
  .fetch_optional(pool)
  .await?;

  row.map(ActiveSession::try_from).transpose()
}

pub async fn get(pool: &SqlitePool, session_id: &str) -> AppResult<Option<ActiveSession>> {
  let row = sqlx::query_as::<_, SessionRow>(&format!(
    "SELECT {} FROM active_sessions WHERE id = ?1",
    SESSION_COLUMNS
  ))
  .bind(session_id)
  .fetch_optional(pool)
  .await?;

  row.map(ActiveSession::try_from).transpose()
}

/// Turn a session into a pending-CREATE log and remove the session, on the
/// caller's transaction. Nothing is visible until the caller commits.
pub async fn convert_session_to_log(
  conn: &mut SqliteConnection,
  session: &ActiveSession,
  end_time: i64,
) -> AppResult<WorkoutLog> {
  let end_time = end_time.max(session.start_time);
  let log_id = Uuid::new_v4().to_string();

  let exercises: Vec<ExerciseLog> = session
    .exercises
    .iter()
    .filter(|e| !e.sets.is_empty())
    .enumerate()
    .map(|(index, e)| ExerciseLog {
      id: Uuid::new_v4().to_string(),
      workout_log_id: log_id.clone(),
      exercise_id: e.exercise_id.clone(),
      exercise_name: e.exercise_name.clone(),
      category: e.category.clone(),
      order_index: index as i64,
      sets: e.sets.clone(),
      sync_status: SyncStatus::PendingSync,
    })
    .collect();

  let totals = WorkoutTotals::from_sets(exercises.iter().flat_map(|e| e.sets.iter()));

  let log = WorkoutLog {
    id: log_id,
    owner_id: session.user_id.clone(),
    template_id: session.template_id.clone(),
    template_name: session.template_name.clone(),
    date: start_of_day(session.start_time),
    start_time: session.start_time,
    end_time,
    total_volume: totals.total_volume,
    total_sets: totals.total_sets,
    total_reps: totals.total_reps,
    notes: None,
    sync_state: SyncState::pending(PendingOperation::Create),
    deleted_at: None,
    created_at: end_time,
    updated_at: end_time,
  };

  logs::insert_log(&mut *conn, &log, &exercises).await?;

  sqlx::query("DELETE FROM active_sessions WHERE id = ?1")
    .bind(&session.id)
    .execute(&mut *conn)
    .await?;

  Ok(log)
}

/// Finalize the session into a workout log atomically
pub async fn finish(pool: &SqlitePool, session_id: &str, end_time: i64) -> AppResult<WorkoutLog> {
  require_id("session_id", session_id)?;

  let mut tx = pool.begin().await?;
  let row = sqlx::query_as::<_, SessionRow>(&format!(
    "SELECT {} FROM active_sessions WHERE id = ?1",
    SESSION_COLUMNS
  ))
  .bind(session_id)
  .fetch_optional(&mut *tx)
  .await?;
  let session = match row {
    Some(row) => ActiveSession::try_from(row)?,
    None => return Err(AppError::not_found("active session", session_id)),
  };

  let log = convert_session_to_log(&mut tx, &session, end_time).await?;
  tx.commit().await?;

  tracing::info!(
    log_id = %log.id,
    total_sets = log.total_sets,
    total_volume = log.total_volume,
    "workout finished"
  );
  Ok(log)
}

/// Drop the user's session without recording anything
pub async fn cancel(pool: &SqlitePool, user_id: &str) -> AppResult<bool> {
  require_id("user_id", user_id)?;
  let result = sqlx::query("DELETE FROM active_sessions WHERE user_id = ?1")
    .bind(user_id)
    .execute(pool)
    .await?;
  Ok(result.rows_affected() > 0)
}

fn encode_progress(session: &ActiveSession) -> AppResult<(String, Option<String>)> {
  let exercises_json = serde_json::to_string(&session.exercises)?;
  let rest_timer_json = session
    .rest_timer
    .as_ref()
    .map(serde_json::to_string)
    .transpose()?;
  Ok((exercises_json, rest_timer_json))
}

async fn write_session(conn: &mut SqliteConnection, session: &ActiveSession) -> AppResult<()> {
  let (exercises_json, rest_timer_json) = encode_progress(session)?;

  sqlx::query(
    r#"
    INSERT INTO active_sessions (
      id, user_id, template_id, template_name, start_time, is_paused,
      total_paused_time_ms, last_pause_time, current_exercise_index,
      exercises_json, rest_timer_json, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
    "#,
  )
  .bind(&session.id)
  .bind(&session.user_id)
  .bind(&session.template_id)
  .bind(&session.template_name)
  .bind(session.start_time)
  .bind(session.is_paused)
  .bind(session.total_paused_time_ms)
  .bind(session.last_pause_time)
  .bind(session.current_exercise_index)
  .bind(exercises_json)
  .bind(rest_timer_json)
  .bind(session.updated_at)
  .execute(&mut *conn)
  .await?;
  Ok(())
}
