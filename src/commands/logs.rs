use serde::Serialize;

use crate::clock::now_millis;
use crate::db::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{ExerciseLog, WorkoutLog};
use crate::store::logs as store;

#[derive(Debug, Clone, Serialize)]
pub struct LogDetail {
  pub log: WorkoutLog,
  pub exercises: Vec<ExerciseLog>,
}

pub async fn list_logs(state: &AppState) -> AppResult<Vec<WorkoutLog>> {
  let owner_id = state.current_user().await?;
  store::list_logs(&state.db, &owner_id).await
}

pub async fn get_log(state: &AppState, log_id: String) -> AppResult<LogDetail> {
  let owner_id = state.current_user().await?;
  let log = match store::get_log(&state.db, &log_id).await? {
    Some(log) if log.owner_id == owner_id && log.deleted_at.is_none() => log,
    _ => return Err(AppError::not_found("workout log", log_id)),
  };
  let exercises = store::get_exercise_logs(&state.db, &log.id).await?;
  Ok(LogDetail { log, exercises })
}

pub async fn update_log_notes(
  state: &AppState,
  log_id: String,
  notes: Option<String>,
) -> AppResult<WorkoutLog> {
  let owner_id = state.current_user().await?;
  let log =
    store::update_log_notes(&state.db, &log_id, &owner_id, notes.as_deref(), now_millis()).await?;
  state.after_local_change().await;
  Ok(log)
}

pub async fn delete_log(state: &AppState, log_id: String) -> AppResult<()> {
  let owner_id = state.current_user().await?;
  store::delete_log(&state.db, &log_id, &owner_id, now_millis()).await?;
  state.after_local_change().await;
  Ok(())
}
