pub mod auth;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod network;
pub mod remote;
pub mod store;
pub mod sync;
mod validation;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use auth::AuthContext;
use config::AppConfig;
use db::AppState;
use error::AppResult;
use network::{HttpProbe, NetworkMonitor};
use remote::RestGateway;
use sync::{RetryPolicy, SyncEngine, SyncWorker, SyncWorkerHandle};

/// A running instance: shared state plus the background tasks feeding it
pub struct App {
  pub state: Arc<AppState>,
  worker: SyncWorkerHandle,
  probe: JoinHandle<()>,
  probe_shutdown: watch::Sender<bool>,
}

impl App {
  /// Stop the probe and the sync worker, letting a running pass finish
  pub async fn shutdown(self) {
    let _ = self.probe_shutdown.send(true);
    if let Err(e) = self.probe.await {
      tracing::warn!(error = %e, "connectivity probe ended abnormally");
    }
    self.worker.shutdown().await;
    self.state.db.close().await;
    tracing::info!("shutdown complete");
  }
}

pub async fn run(config: AppConfig) -> AppResult<App> {
  let pool = db::initialize_db(&config.db_path).await?;
  let auth = Arc::new(AuthContext::new());

  // Start optimistic; the first failed probe rounds flip it.
  let monitor = Arc::new(NetworkMonitor::new(
    config.network.offline_after_failures,
    true,
  ));

  let gateway = Arc::new(RestGateway::new(&config.remote, Some(auth.clone()))?);
  let engine = Arc::new(SyncEngine::new(
    pool.clone(),
    gateway,
    monitor.clone(),
    RetryPolicy::from(&config.sync),
  ));
  if let Err(e) = engine.refresh_pending_count().await {
    tracing::warn!(error = %e, "failed to load pending count");
  }

  let (probe_shutdown, probe_shutdown_rx) = watch::channel(false);
  let http_probe = HttpProbe::new(config.remote.base_url.clone(), config.remote.timeout)?;
  let probe = network::spawn_probe(
    monitor.clone(),
    Arc::new(http_probe),
    &config.network,
    probe_shutdown_rx,
  );

  let worker = SyncWorker::spawn(engine.clone(), &monitor);

  let state = Arc::new(AppState {
    db: pool,
    engine,
    monitor,
    auth,
    sync_trigger: Some(worker.trigger_handle()),
  });

  tracing::info!(remote = %config.remote.base_url, "workout sync started");

  Ok(App {
    state,
    worker,
    probe,
    probe_shutdown,
  })
}
