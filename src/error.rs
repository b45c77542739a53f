//! Error types shared across the store, gateway and sync layers.

use serde::Serialize;

/// ---------------------------------------------------------------------------
/// Remote Errors
/// ---------------------------------------------------------------------------

/// Failure reported by a [`crate::remote::RemoteGateway`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
  /// No connectivity, DNS failure, connection reset, timeout.
  #[error("Network error: {0}")]
  Network(String),

  /// Server reachable but temporarily unable to serve (408/425/429/5xx).
  #[error("Remote unavailable (HTTP {status}): {message}")]
  Unavailable { status: u16, message: String },

  /// Server refused the payload. Not retried automatically.
  #[error("Remote rejected request (HTTP {status}): {message}")]
  Rejected { status: u16, message: String },

  /// Response body could not be understood.
  #[error("Failed to decode remote response: {0}")]
  Decode(String),
}

impl RemoteError {
  /// Whether the failure is I/O-class and may succeed on a later attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(self, RemoteError::Network(_) | RemoteError::Unavailable { .. })
  }

  /// Classify an HTTP status that was not a success.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    let message = message.into();
    match status {
      408 | 425 | 429 | 500..=599 => RemoteError::Unavailable { status, message },
      _ => RemoteError::Rejected { status, message },
    }
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      return RemoteError::Decode(e.to_string());
    }
    if let Some(status) = e.status() {
      return RemoteError::from_status(status.as_u16(), e.to_string());
    }
    RemoteError::Network(e.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Application Errors
/// ---------------------------------------------------------------------------

/// Errors surfaced synchronously to callers of local mutations and commands.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
  #[error("Not authenticated")]
  NotAuthenticated,

  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("{entity} with id {id} not found")]
  NotFound { entity: &'static str, id: String },

  #[error("Storage error: {0}")]
  Storage(String),

  #[error("Missing or invalid configuration: {0}")]
  Config(String),

  #[error(transparent)]
  Remote(#[from] RemoteError),
}

impl AppError {
  pub fn invalid(message: impl Into<String>) -> Self {
    AppError::InvalidInput(message.into())
  }

  pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
    AppError::NotFound {
      entity,
      id: id.into(),
    }
  }
}

impl From<sqlx::Error> for AppError {
  fn from(e: sqlx::Error) -> Self {
    AppError::Storage(e.to_string())
  }
}

impl From<sqlx::migrate::MigrateError> for AppError {
  fn from(e: sqlx::migrate::MigrateError) -> Self {
    AppError::Storage(format!("Migration failed: {}", e))
  }
}

impl From<serde_json::Error> for AppError {
  fn from(e: serde_json::Error) -> Self {
    AppError::Storage(format!("Serialization failed: {}", e))
  }
}

impl Serialize for AppError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert!(RemoteError::from_status(503, "down").is_retryable());
    assert!(RemoteError::from_status(429, "slow down").is_retryable());
    assert!(RemoteError::from_status(408, "timeout").is_retryable());
    assert!(!RemoteError::from_status(400, "bad").is_retryable());
    assert!(!RemoteError::from_status(409, "conflict").is_retryable());
    assert!(!RemoteError::from_status(401, "auth").is_retryable());
  }

  #[test]
  fn test_network_and_decode_retryability() {
    assert!(RemoteError::Network("reset".into()).is_retryable());
    assert!(!RemoteError::Decode("garbage".into()).is_retryable());
  }

  #[test]
  fn test_app_error_serializes_as_message() {
    let err = AppError::invalid("name is blank");
    let json = serde_json::to_string(&err).unwrap();
    assert_eq!(json, "\"Invalid input: name is blank\"");
  }
}
