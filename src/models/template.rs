use serde::{Deserialize, Serialize};

use super::sync::{SyncState, SyncStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutTemplate {
  pub id: String,
  pub owner_id: String,
  pub name: String,
  pub description: Option<String>,
  pub is_deleted: bool,
  pub sync_state: SyncState,
  /// Epoch millis
  pub created_at: i64,
  /// Epoch millis, never decreases for a given template
  pub updated_at: i64,
}

/// One exercise slot of a template, keyed by (template_id, exercise_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExercise {
  pub template_id: String,
  pub exercise_id: String,
  pub order_index: i64,
  pub target_sets: i64,
  pub target_reps: i64,
  pub rest_seconds: i64,
  pub sync_status: SyncStatus,
}

/// Caller-supplied exercise slot (order comes from list position)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplateExercise {
  pub exercise_id: String,
  pub target_sets: i64,
  pub target_reps: i64,
  pub rest_seconds: i64,
}

/// For creating templates (id and timestamps are assigned by the store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkoutTemplate {
  pub owner_id: String,
  pub name: String,
  pub description: Option<String>,
  pub exercises: Vec<NewTemplateExercise>,
}

/// Partial update; `None` leaves the field as is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateUpdate {
  pub name: Option<String>,
  pub description: Option<String>,
  pub exercises: Option<Vec<NewTemplateExercise>>,
}
