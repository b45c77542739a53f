//! Session commands load the user's session, apply one change in memory and
//! write it straight back.

use crate::clock::now_millis;
use crate::db::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{ActiveSession, NewSession, WorkoutLog, WorkoutSet};
use crate::store::sessions as store;

async fn load_active(state: &AppState) -> AppResult<ActiveSession> {
  let user_id = state.current_user().await?;
  store::get_for_user(&state.db, &user_id)
    .await?
    .ok_or_else(|| AppError::not_found("active session", user_id))
}

async fn modify<F>(state: &AppState, change: F) -> AppResult<ActiveSession>
where
  F: FnOnce(&mut ActiveSession, i64) -> AppResult<()>,
{
  let mut session = load_active(state).await?;
  change(&mut session, now_millis())?;
  store::update(&state.db, &session).await?;
  Ok(session)
}

pub async fn start_session(state: &AppState, new: NewSession) -> AppResult<ActiveSession> {
  let user_id = state.current_user().await?;
  store::start(&state.db, &user_id, new, now_millis()).await
}

pub async fn get_active_session(state: &AppState) -> AppResult<Option<ActiveSession>> {
  let user_id = state.current_user().await?;
  store::get_for_user(&state.db, &user_id).await
}

/// Persist a session the caller changed wholesale
pub async fn update_session(state: &AppState, session: ActiveSession) -> AppResult<ActiveSession> {
  let user_id = state.current_user().await?;
  if session.user_id != user_id {
    return Err(AppError::not_found("active session", session.id));
  }
  store::update(&state.db, &session).await?;
  Ok(session)
}

pub async fn pause_session(state: &AppState) -> AppResult<ActiveSession> {
  modify(state, |session, now| {
    session.pause(now);
    Ok(())
  })
  .await
}

pub async fn resume_session(state: &AppState) -> AppResult<ActiveSession> {
  modify(state, |session, now| {
    session.resume(now);
    Ok(())
  })
  .await
}

pub async fn complete_set(
  state: &AppState,
  exercise_index: usize,
  reps: i64,
  weight: f64,
) -> AppResult<WorkoutSet> {
  let session = modify(state, |session, now| {
    session.complete_set(exercise_index, reps, weight, now).map(|_| ())
  })
  .await?;

  session
    .exercises
    .get(exercise_index)
    .and_then(|e| e.sets.last())
    .cloned()
    .ok_or_else(|| AppError::Storage("completed set missing after save".to_string()))
}

pub async fn advance_exercise(state: &AppState) -> AppResult<ActiveSession> {
  modify(state, |session, now| {
    if !session.advance_exercise(now) {
      return Err(AppError::invalid("already at the last exercise"));
    }
    Ok(())
  })
  .await
}

pub async fn skip_rest(state: &AppState) -> AppResult<ActiveSession> {
  modify(state, |session, now| {
    session.skip_rest(now);
    Ok(())
  })
  .await
}

/// Elapsed workout time in millis, pauses excluded
pub async fn get_elapsed_ms(state: &AppState) -> AppResult<i64> {
  Ok(load_active(state).await?.elapsed_ms(now_millis()))
}

pub async fn finish_session(state: &AppState) -> AppResult<WorkoutLog> {
  let session = load_active(state).await?;
  let log = store::finish(&state.db, &session.id, now_millis()).await?;
  state.after_local_change().await;
  Ok(log)
}

pub async fn cancel_session(state: &AppState) -> AppResult<bool> {
  let user_id = state.current_user().await?;
  store::cancel(&state.db, &user_id).await
}
