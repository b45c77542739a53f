//! Remote data gateway.
//!
//! The sync engine talks to the backend only through [`RemoteGateway`], which
//! speaks in generic JSON rows against a handful of named tables.

pub mod dto;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

pub use rest::RestGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteTable {
  WorkoutTemplates,
  TemplateExercises,
  WorkoutLogs,
}

impl RemoteTable {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::WorkoutTemplates => "workout_templates",
      Self::TemplateExercises => "template_exercises",
      Self::WorkoutLogs => "workout_logs",
    }
  }
}

impl std::fmt::Display for RemoteTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Conjunction of column equality predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
  pub clauses: Vec<(String, String)>,
}

impl Filter {
  pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
    Self::default().and_eq(column, value)
  }

  pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
    self.clauses.push((column.into(), value.into()));
    self
  }
}

#[async_trait]
pub trait RemoteGateway: Send + Sync {
  /// Insert rows; an existing row with the same key is overwritten
  async fn insert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError>;

  async fn update(&self, table: RemoteTable, filter: &Filter, patch: Value) -> Result<(), RemoteError>;

  async fn delete(&self, table: RemoteTable, filter: &Filter) -> Result<(), RemoteError>;

  async fn query(&self, table: RemoteTable, filter: &Filter) -> Result<Vec<Value>, RemoteError>;
}
