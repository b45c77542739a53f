use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::AuthContext;
use crate::error::AppError;
use crate::network::NetworkMonitor;
use crate::sync::{SyncEngine, SyncTrigger};

pub type DbPool = SqlitePool;

/// Open (creating if needed) the database file and run migrations
pub async fn initialize_db(db_path: &Path) -> Result<DbPool, AppError> {
  if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)
      .map_err(|e| AppError::Storage(format!("Failed to create data dir: {}", e)))?;
  }

  let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
  tracing::info!(path = %db_path.display(), "initializing database");

  let options = SqliteConnectOptions::from_str(&db_url)?.foreign_keys(true);

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect_with(options)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  tracing::info!("database initialized");

  Ok(pool)
}

/// Everything the command layer needs, shared behind an `Arc`
pub struct AppState {
  pub db: DbPool,
  pub engine: Arc<SyncEngine>,
  pub monitor: Arc<NetworkMonitor>,
  pub auth: Arc<AuthContext>,
  /// Absent when no background worker runs
  pub sync_trigger: Option<SyncTrigger>,
}
