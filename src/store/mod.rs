//! Local record store backed by SQLite.

pub mod logs;
pub mod sessions;
pub mod templates;

use sqlx::SqlitePool;

use crate::error::AppResult;

/// Records (templates and logs) still waiting to reach the remote store
pub async fn pending_count(pool: &SqlitePool) -> AppResult<i64> {
  Ok(templates::count_unsynced_templates(pool).await? + logs::count_unsynced_logs(pool).await?)
}
