//! In-progress workout state.
//!
//! All time arguments are epoch millis supplied by the caller, which keeps the
//! pause arithmetic deterministic.

use serde::{Deserialize, Serialize};

use super::workout::WorkoutSet;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExercise {
  pub exercise_id: String,
  pub exercise_name: String,
  pub category: String,
  pub target_sets: i64,
  pub target_reps: i64,
  pub rest_seconds: i64,
  pub sets: Vec<WorkoutSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestTimer {
  pub started_at: i64,
  pub duration_seconds: i64,
}

impl RestTimer {
  pub fn remaining_ms(&self, now: i64) -> i64 {
    (self.started_at + self.duration_seconds * 1000 - now).max(0)
  }
}

/// What the caller knows when a workout starts. Exercise names and categories
/// come from the catalog, which this crate does not own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
  pub template_id: Option<String>,
  pub template_name: String,
  pub exercises: Vec<SessionExercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
  pub id: String,
  pub user_id: String,
  pub template_id: Option<String>,
  pub template_name: String,
  pub start_time: i64,
  pub is_paused: bool,
  pub total_paused_time_ms: i64,
  pub last_pause_time: Option<i64>,
  pub current_exercise_index: i64,
  pub exercises: Vec<SessionExercise>,
  pub rest_timer: Option<RestTimer>,
  pub updated_at: i64,
}

impl ActiveSession {
  /// Wall time since start minus every paused interval, including an open one.
  pub fn elapsed_ms(&self, now: i64) -> i64 {
    let open_pause = match (self.is_paused, self.last_pause_time) {
      (true, Some(paused_at)) => now - paused_at,
      _ => 0,
    };
    (now - self.start_time - self.total_paused_time_ms - open_pause).max(0)
  }

  pub fn pause(&mut self, now: i64) {
    if self.is_paused {
      return;
    }
    self.is_paused = true;
    self.last_pause_time = Some(now);
    self.updated_at = now;
  }

  pub fn resume(&mut self, now: i64) {
    if !self.is_paused {
      return;
    }
    if let Some(paused_at) = self.last_pause_time.take() {
      self.total_paused_time_ms += (now - paused_at).max(0);
    }
    self.is_paused = false;
    self.updated_at = now;
  }

  /// Record a finished set on the exercise at `exercise_index` and start the
  /// exercise's rest timer.
  pub fn complete_set(
    &mut self,
    exercise_index: usize,
    reps: i64,
    weight: f64,
    now: i64,
  ) -> Result<&WorkoutSet, AppError> {
    if reps < 0 || weight < 0.0 || !weight.is_finite() {
      return Err(AppError::invalid("reps and weight must be non-negative"));
    }
    let exercise = self
      .exercises
      .get_mut(exercise_index)
      .ok_or_else(|| AppError::invalid(format!("no exercise at index {}", exercise_index)))?;

    let set_number = exercise.sets.len() as i64 + 1;
    exercise.sets.push(WorkoutSet {
      set_number,
      reps,
      weight,
      completed: true,
    });
    self.rest_timer = Some(RestTimer {
      started_at: now,
      duration_seconds: exercise.rest_seconds,
    });
    self.updated_at = now;

    exercise
      .sets
      .last()
      .ok_or_else(|| AppError::Storage("set vanished after push".to_string()))
  }

  pub fn advance_exercise(&mut self, now: i64) -> bool {
    let next = self.current_exercise_index + 1;
    if next as usize >= self.exercises.len() {
      return false;
    }
    self.current_exercise_index = next;
    self.rest_timer = None;
    self.updated_at = now;
    true
  }

  pub fn skip_rest(&mut self, now: i64) {
    self.rest_timer = None;
    self.updated_at = now;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECOND: i64 = 1000;

  fn session_started_at(start: i64) -> ActiveSession {
    ActiveSession {
      id: "s1".to_string(),
      user_id: "u1".to_string(),
      template_id: None,
      template_name: "Push Day".to_string(),
      start_time: start,
      is_paused: false,
      total_paused_time_ms: 0,
      last_pause_time: None,
      current_exercise_index: 0,
      exercises: vec![SessionExercise {
        exercise_id: "bench".to_string(),
        exercise_name: "Bench Press".to_string(),
        category: "chest".to_string(),
        target_sets: 3,
        target_reps: 8,
        rest_seconds: 90,
        sets: vec![],
      }],
      rest_timer: None,
      updated_at: start,
    }
  }

  #[test]
  fn test_elapsed_excludes_completed_pause() {
    let mut session = session_started_at(0);
    session.pause(60 * SECOND);
    session.resume(90 * SECOND);

    assert_eq!(session.elapsed_ms(120 * SECOND), 90 * SECOND);
  }

  #[test]
  fn test_elapsed_excludes_open_pause() {
    let mut session = session_started_at(0);
    session.pause(60 * SECOND);

    assert_eq!(session.elapsed_ms(120 * SECOND), 60 * SECOND);
  }

  #[test]
  fn test_double_pause_keeps_first_timestamp() {
    let mut session = session_started_at(0);
    session.pause(10 * SECOND);
    session.pause(20 * SECOND);
    session.resume(30 * SECOND);

    assert_eq!(session.total_paused_time_ms, 20 * SECOND);
  }

  #[test]
  fn test_complete_set_starts_rest_timer() {
    let mut session = session_started_at(0);
    session.complete_set(0, 8, 60.0, 5 * SECOND).unwrap();

    assert_eq!(session.exercises[0].sets.len(), 1);
    let timer = session.rest_timer.clone().unwrap();
    assert_eq!(timer.remaining_ms(35 * SECOND), 60 * SECOND);
    assert!(session.complete_set(3, 8, 60.0, 6 * SECOND).is_err());
  }

  #[test]
  fn test_advance_stops_at_last_exercise() {
    let mut session = session_started_at(0);
    assert!(!session.advance_exercise(SECOND));
    assert_eq!(session.current_exercise_index, 0);
  }
}
