//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories and seeders
//! - A scripted in-memory remote gateway

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::{millis_to_iso, start_of_day};
use crate::error::RemoteError;
use crate::models::{
  ExerciseLog, NewSession, NewTemplateExercise, NewWorkoutTemplate, PendingOperation,
  SessionExercise, SyncState, SyncStatus, WorkoutLog, WorkoutSet, WorkoutTemplate, WorkoutTotals,
};
use crate::remote::{Filter, RemoteGateway, RemoteTable};
use crate::store::{logs, templates};
use crate::sync::RetryPolicy;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
  sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
    .fetch_one(pool)
    .await
    .expect("Failed to count rows")
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn mock_new_template(owner_id: &str, name: &str) -> NewWorkoutTemplate {
  NewWorkoutTemplate {
    owner_id: owner_id.to_string(),
    name: name.to_string(),
    description: None,
    exercises: vec![
      NewTemplateExercise {
        exercise_id: "bench-press".to_string(),
        target_sets: 3,
        target_reps: 8,
        rest_seconds: 90,
      },
      NewTemplateExercise {
        exercise_id: "overhead-press".to_string(),
        target_sets: 3,
        target_reps: 10,
        rest_seconds: 60,
      },
    ],
  }
}

pub fn mock_new_session(template_name: &str) -> NewSession {
  let exercise = |id: &str, name: &str, rest_seconds| SessionExercise {
    exercise_id: id.to_string(),
    exercise_name: name.to_string(),
    category: "chest".to_string(),
    target_sets: 3,
    target_reps: 8,
    rest_seconds,
    sets: vec![],
  };

  NewSession {
    template_id: None,
    template_name: template_name.to_string(),
    exercises: vec![
      exercise("bench-press", "Bench Press", 90),
      exercise("dips", "Dips", 60),
    ],
  }
}

/// A finished workout waiting to be created remotely
pub fn mock_log(owner_id: &str, start_time: i64) -> (WorkoutLog, Vec<ExerciseLog>) {
  let log_id = Uuid::new_v4().to_string();
  let sets = vec![
    WorkoutSet { set_number: 1, reps: 5, weight: 100.0, completed: true },
    WorkoutSet { set_number: 2, reps: 5, weight: 100.0, completed: true },
  ];
  let totals = WorkoutTotals::from_sets(&sets);
  let end_time = start_time + 3_600_000;

  let exercises = vec![ExerciseLog {
    id: Uuid::new_v4().to_string(),
    workout_log_id: log_id.clone(),
    exercise_id: "squat".to_string(),
    exercise_name: "Back Squat".to_string(),
    category: "legs".to_string(),
    order_index: 0,
    sets,
    sync_status: SyncStatus::PendingSync,
  }];

  let log = WorkoutLog {
    id: log_id,
    owner_id: owner_id.to_string(),
    template_id: None,
    template_name: "Leg Day".to_string(),
    date: start_of_day(start_time),
    start_time,
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

  (log, exercises)
}

pub fn remote_template_row(id: &str, owner_id: &str, name: &str) -> Value {
  json!({
    "id": id,
    "owner_id": owner_id,
    "name": name,
    "description": null,
    "is_deleted": false,
    "created_at": millis_to_iso(1_700_000_000_000),
    "updated_at": millis_to_iso(1_700_000_000_000),
  })
}

/// Quick retries so failure tests do not sleep for real
pub fn fast_retry_policy() -> RetryPolicy {
  RetryPolicy {
    times: 2,
    initial_delay: Duration::from_millis(1),
    max_delay: Duration::from_millis(5),
    factor: 2,
  }
}

/// ---------------------------------------------------------------------------
/// Seeders
/// ---------------------------------------------------------------------------

/// A template (with exercises) that is already on the remote store
pub async fn seed_synced_template(pool: &SqlitePool, owner_id: &str, name: &str) -> WorkoutTemplate {
  let template = templates::create_template(pool, mock_new_template(owner_id, name), 10_000)
    .await
    .expect("Failed to seed template");
  templates::mark_template_synced(pool, &template.id, template.updated_at)
    .await
    .expect("Failed to mark template synced");
  templates::mark_exercises_synced(pool, &template.id, template.updated_at)
    .await
    .expect("Failed to mark exercises synced");

  templates::get_template(pool, &template.id)
    .await
    .expect("Failed to reload template")
    .expect("Seeded template missing")
}

pub async fn seed_pending_log(pool: &SqlitePool, owner_id: &str) -> (WorkoutLog, Vec<ExerciseLog>) {
  let (log, exercises) = mock_log(owner_id, 1_700_000_000_000);
  let mut tx = pool.begin().await.expect("Failed to begin");
  logs::insert_log(&mut tx, &log, &exercises)
    .await
    .expect("Failed to seed log");
  tx.commit().await.expect("Failed to commit");
  (log, exercises)
}

pub async fn seed_synced_log(pool: &SqlitePool, owner_id: &str) -> WorkoutLog {
  let (log, _) = seed_pending_log(pool, owner_id).await;
  logs::mark_log_synced(pool, &log.id, log.updated_at)
    .await
    .expect("Failed to mark log synced");
  logs::get_log(pool, &log.id)
    .await
    .expect("Failed to reload log")
    .expect("Seeded log missing")
}

/// ---------------------------------------------------------------------------
/// Fake Remote Gateway
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  pub method: &'static str,
  pub table: RemoteTable,
  /// Record id (template id for exercise rows) the call targets
  pub key: Option<String>,
  pub payload: Option<Value>,
}

/// Records every call and fails the ones matching a scripted rule. Queries
/// are answered from rows put in with [`FakeGateway::put_rows`].
#[derive(Default)]
pub struct FakeGateway {
  calls: Mutex<Vec<Call>>,
  failures: Mutex<Vec<(RemoteTable, String, RemoteError)>>,
  rows: Mutex<HashMap<RemoteTable, Vec<Value>>>,
}

impl FakeGateway {
  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  /// Fail every call on `table` targeting `key` until cleared
  pub fn fail(&self, table: RemoteTable, key: &str, error: RemoteError) {
    self.failures.lock().unwrap().push((table, key.to_string(), error));
  }

  pub fn clear_failures(&self) {
    self.failures.lock().unwrap().clear();
  }

  pub fn put_rows(&self, table: RemoteTable, rows: Vec<Value>) {
    self.rows.lock().unwrap().insert(table, rows);
  }

  fn record(
    &self,
    method: &'static str,
    table: RemoteTable,
    key: Option<String>,
    payload: Option<Value>,
  ) -> Result<(), RemoteError> {
    self.calls.lock().unwrap().push(Call {
      method,
      table,
      key: key.clone(),
      payload,
    });

    let failures = self.failures.lock().unwrap();
    match failures
      .iter()
      .find(|(t, k, _)| *t == table && key.as_deref() == Some(k.as_str()))
    {
      Some((_, _, error)) => Err(error.clone()),
      None => Ok(()),
    }
  }
}

fn row_key(table: RemoteTable, row: &Value) -> Option<String> {
  let column = match table {
    RemoteTable::TemplateExercises => "template_id",
    RemoteTable::WorkoutTemplates | RemoteTable::WorkoutLogs => "id",
  };
  row.get(column).and_then(Value::as_str).map(str::to_string)
}

fn filter_key(filter: &Filter) -> Option<String> {
  filter.clauses.first().map(|(_, value)| value.clone())
}

#[async_trait]
impl RemoteGateway for FakeGateway {
  async fn insert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError> {
    let key = rows.first().and_then(|r| row_key(table, r));
    self.record("insert", table, key, Some(Value::Array(rows)))
  }

  async fn update(&self, table: RemoteTable, filter: &Filter, patch: Value) -> Result<(), RemoteError> {
    self.record("update", table, filter_key(filter), Some(patch))
  }

  async fn delete(&self, table: RemoteTable, filter: &Filter) -> Result<(), RemoteError> {
    self.record("delete", table, filter_key(filter), None)
  }

  async fn query(&self, table: RemoteTable, filter: &Filter) -> Result<Vec<Value>, RemoteError> {
    self.record("query", table, filter_key(filter), None)?;

    let rows = self.rows.lock().unwrap();
    let matching = rows
      .get(&table)
      .map(|rows| {
        rows
          .iter()
          .filter(|row| {
            filter
              .clauses
              .iter()
              .all(|(column, value)| row.get(column).and_then(Value::as_str) == Some(value.as_str()))
          })
          .cloned()
          .collect()
      })
      .unwrap_or_default();
    Ok(matching)
  }
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN \
       ('workout_templates', 'template_exercises', 'workout_logs', 'exercise_logs', 'active_sessions')",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 5);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_seeded_template_is_fully_synced() {
    let pool = setup_test_db().await;

    let template = seed_synced_template(&pool, "u1", "Push").await;
    assert_eq!(template.sync_state, SyncState::Synced);
    assert!(templates::templates_with_unsynced_exercises(&pool)
      .await
      .unwrap()
      .is_empty());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_fake_gateway_fails_only_matching_calls() {
    let gateway = FakeGateway::default();
    gateway.fail(RemoteTable::WorkoutLogs, "l1", RemoteError::Network("down".into()));

    let hit = gateway
      .update(RemoteTable::WorkoutLogs, &Filter::eq("id", "l1"), json!({}))
      .await;
    let miss = gateway
      .update(RemoteTable::WorkoutLogs, &Filter::eq("id", "l2"), json!({}))
      .await;

    assert!(hit.is_err());
    assert!(miss.is_ok());
    assert_eq!(gateway.calls().len(), 2);
  }
}
