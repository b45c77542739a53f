use serde::{Deserialize, Serialize};

use super::sync::{SyncState, SyncStatus};

/// A finished workout. Survives deletion of the template it was started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
  pub id: String,
  pub owner_id: String,
  pub template_id: Option<String>,
  pub template_name: String,
  /// Epoch millis of the start of the day the workout happened
  pub date: i64,
  pub start_time: i64,
  pub end_time: i64,
  pub total_volume: f64,
  pub total_sets: i64,
  pub total_reps: i64,
  pub notes: Option<String>,
  pub sync_state: SyncState,
  pub deleted_at: Option<i64>,
  pub created_at: i64,
  pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
  pub set_number: i64,
  pub reps: i64,
  pub weight: f64,
  pub completed: bool,
}

impl WorkoutSet {
  pub fn volume(&self) -> f64 {
    self.reps as f64 * self.weight
  }
}

/// Child of a [`WorkoutLog`]; exercise name and category are copied so the
/// log reads the same after catalog changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseLog {
  pub id: String,
  pub workout_log_id: String,
  pub exercise_id: String,
  pub exercise_name: String,
  pub category: String,
  pub order_index: i64,
  pub sets: Vec<WorkoutSet>,
  pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkoutTotals {
  pub total_volume: f64,
  pub total_sets: i64,
  pub total_reps: i64,
}

impl WorkoutTotals {
  /// Sum over completed sets only
  pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a WorkoutSet>) -> Self {
    sets
      .into_iter()
      .filter(|s| s.completed)
      .fold(WorkoutTotals::default(), |mut acc, s| {
        acc.total_volume += s.volume();
        acc.total_sets += 1;
        acc.total_reps += s.reps;
        acc
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_totals_ignore_incomplete_sets() {
    let sets = vec![
      WorkoutSet { set_number: 1, reps: 10, weight: 50.0, completed: true },
      WorkoutSet { set_number: 2, reps: 8, weight: 55.0, completed: true },
      WorkoutSet { set_number: 3, reps: 8, weight: 55.0, completed: false },
    ];

    let totals = WorkoutTotals::from_sets(&sets);
    assert_eq!(totals.total_sets, 2);
    assert_eq!(totals.total_reps, 18);
    assert_eq!(totals.total_volume, 940.0);
  }
}
