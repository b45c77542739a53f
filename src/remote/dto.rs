//! Wire shapes of the remote tables: snake_case columns, ISO-8601 timestamps.
//! Sync bookkeeping never leaves the device.

use serde::{Deserialize, Serialize};

use crate::clock::{iso_to_millis, millis_to_iso};
use crate::error::RemoteError;
use crate::models::{
  ExerciseLog, SyncState, SyncStatus, TemplateExercise, WorkoutLog, WorkoutSet, WorkoutTemplate,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTemplate {
  pub id: String,
  pub owner_id: String,
  pub name: String,
  pub description: Option<String>,
  #[serde(default)]
  pub is_deleted: bool,
  pub created_at: String,
  pub updated_at: String,
}

impl From<&WorkoutTemplate> for RemoteTemplate {
  fn from(t: &WorkoutTemplate) -> Self {
    Self {
      id: t.id.clone(),
      owner_id: t.owner_id.clone(),
      name: t.name.clone(),
      description: t.description.clone(),
      is_deleted: t.is_deleted,
      created_at: millis_to_iso(t.created_at),
      updated_at: millis_to_iso(t.updated_at),
    }
  }
}

impl RemoteTemplate {
  pub fn into_local(self) -> Result<WorkoutTemplate, RemoteError> {
    Ok(WorkoutTemplate {
      created_at: iso_to_millis(&self.created_at)?,
      updated_at: iso_to_millis(&self.updated_at)?,
      id: self.id,
      owner_id: self.owner_id,
      name: self.name,
      description: self.description,
      is_deleted: self.is_deleted,
      sync_state: SyncState::Synced,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTemplateExercise {
  pub template_id: String,
  pub exercise_id: String,
  pub order_index: i64,
  pub target_sets: i64,
  pub target_reps: i64,
  pub rest_seconds: i64,
}

impl From<&TemplateExercise> for RemoteTemplateExercise {
  fn from(e: &TemplateExercise) -> Self {
    Self {
      template_id: e.template_id.clone(),
      exercise_id: e.exercise_id.clone(),
      order_index: e.order_index,
      target_sets: e.target_sets,
      target_reps: e.target_reps,
      rest_seconds: e.rest_seconds,
    }
  }
}

impl From<RemoteTemplateExercise> for TemplateExercise {
  fn from(e: RemoteTemplateExercise) -> Self {
    Self {
      template_id: e.template_id,
      exercise_id: e.exercise_id,
      order_index: e.order_index,
      target_sets: e.target_sets,
      target_reps: e.target_reps,
      rest_seconds: e.rest_seconds,
      sync_status: SyncStatus::Synced,
    }
  }
}

/// Exercise entry embedded in its parent log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteExerciseLog {
  pub id: String,
  pub exercise_id: String,
  pub exercise_name: String,
  pub category: String,
  pub order_index: i64,
  pub sets: Vec<WorkoutSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteWorkoutLog {
  pub id: String,
  pub owner_id: String,
  pub template_id: Option<String>,
  pub template_name: String,
  pub date: String,
  pub start_time: String,
  pub end_time: String,
  pub total_volume: f64,
  pub total_sets: i64,
  pub total_reps: i64,
  pub notes: Option<String>,
  #[serde(default)]
  pub exercises: Vec<RemoteExerciseLog>,
  pub deleted_at: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RemoteWorkoutLog {
  pub fn from_local(log: &WorkoutLog, exercises: &[ExerciseLog]) -> Self {
    Self {
      id: log.id.clone(),
      owner_id: log.owner_id.clone(),
      template_id: log.template_id.clone(),
      template_name: log.template_name.clone(),
      date: millis_to_iso(log.date),
      start_time: millis_to_iso(log.start_time),
      end_time: millis_to_iso(log.end_time),
      total_volume: log.total_volume,
      total_sets: log.total_sets,
      total_reps: log.total_reps,
      notes: log.notes.clone(),
      exercises: exercises
        .iter()
        .map(|e| RemoteExerciseLog {
          id: e.id.clone(),
          exercise_id: e.exercise_id.clone(),
          exercise_name: e.exercise_name.clone(),
          category: e.category.clone(),
          order_index: e.order_index,
          sets: e.sets.clone(),
        })
        .collect(),
      deleted_at: log.deleted_at.map(millis_to_iso),
      created_at: millis_to_iso(log.created_at),
      updated_at: millis_to_iso(log.updated_at),
    }
  }

  pub fn into_local(self) -> Result<(WorkoutLog, Vec<ExerciseLog>), RemoteError> {
    let deleted_at = self.deleted_at.as_deref().map(iso_to_millis).transpose()?;
    let log = WorkoutLog {
      id: self.id.clone(),
      owner_id: self.owner_id,
      template_id: self.template_id,
      template_name: self.template_name,
      date: iso_to_millis(&self.date)?,
      start_time: iso_to_millis(&self.start_time)?,
      end_time: iso_to_millis(&self.end_time)?,
      total_volume: self.total_volume,
      total_sets: self.total_sets,
      total_reps: self.total_reps,
      notes: self.notes,
      sync_state: SyncState::Synced,
      deleted_at,
      created_at: iso_to_millis(&self.created_at)?,
      updated_at: iso_to_millis(&self.updated_at)?,
    };
    let exercises = self
      .exercises
      .into_iter()
      .map(|e| ExerciseLog {
        id: e.id,
        workout_log_id: self.id.clone(),
        exercise_id: e.exercise_id,
        exercise_name: e.exercise_name,
        category: e.category,
        order_index: e.order_index,
        sets: e.sets,
        sync_status: SyncStatus::Synced,
      })
      .collect();
    Ok((log, exercises))
  }
}

/// Decode one JSON row into a wire struct
pub fn decode<T: serde::de::DeserializeOwned>(row: serde_json::Value) -> Result<T, RemoteError> {
  serde_json::from_value(row).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Encode a wire struct as a JSON row
pub fn encode<T: Serialize>(row: &T) -> Result<serde_json::Value, RemoteError> {
  serde_json::to_value(row).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_remote_template_timestamps_are_iso() {
    let row = json!({
      "id": "t1",
      "owner_id": "u1",
      "name": "Push",
      "description": null,
      "created_at": "2024-05-31T16:08:37.123Z",
      "updated_at": "2024-05-31T16:08:38.000+00:00"
    });

    let template = decode::<RemoteTemplate>(row).unwrap().into_local().unwrap();
    assert_eq!(template.created_at, 1_717_171_717_123);
    assert_eq!(template.updated_at, 1_717_171_718_000);
    assert!(!template.is_deleted);
    assert_eq!(template.sync_state, SyncState::Synced);
  }

  #[test]
  fn test_bad_timestamp_is_decode_error() {
    let remote = RemoteTemplate {
      id: "t1".into(),
      owner_id: "u1".into(),
      name: "Push".into(),
      description: None,
      is_deleted: false,
      created_at: "not a date".into(),
      updated_at: "2024-01-01T00:00:00Z".into(),
    };
    assert!(matches!(remote.into_local(), Err(RemoteError::Decode(_))));
  }

  #[test]
  fn test_log_row_embeds_exercises() {
    let row = json!({
      "id": "l1",
      "owner_id": "u1",
      "template_id": null,
      "template_name": "Legs",
      "date": "2024-03-10T00:00:00Z",
      "start_time": "2024-03-10T08:00:00Z",
      "end_time": "2024-03-10T09:00:00Z",
      "total_volume": 1000.0,
      "total_sets": 1,
      "total_reps": 10,
      "notes": null,
      "exercises": [{
        "id": "e1",
        "exercise_id": "squat",
        "exercise_name": "Squat",
        "category": "legs",
        "order_index": 0,
        "sets": [{"set_number": 1, "reps": 10, "weight": 100.0, "completed": true}]
      }],
      "deleted_at": null,
      "created_at": "2024-03-10T09:00:00Z",
      "updated_at": "2024-03-10T09:00:00Z"
    });

    let (log, exercises) = decode::<RemoteWorkoutLog>(row).unwrap().into_local().unwrap();
    assert_eq!(log.template_id, None);
    assert_eq!(exercises.len(), 1);
    assert_eq!(exercises[0].workout_log_id, "l1");
    assert_eq!(exercises[0].sets[0].volume(), 1000.0);
  }
}
