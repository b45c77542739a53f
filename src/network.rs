//! Connectivity signal for the sync engine.
//!
//! Going online is published at once. Going offline is only published after
//! several failed probes in a row, so one dropped request does not flap the
//! engine into offline mode.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::error::RemoteError;

/// ---------------------------------------------------------------------------
/// Debounce
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Debouncer {
  offline_after: u32,
  consecutive_failures: u32,
  online: bool,
}

impl Debouncer {
  pub fn new(offline_after: u32, initially_online: bool) -> Self {
    Self {
      offline_after: offline_after.max(1),
      consecutive_failures: 0,
      online: initially_online,
    }
  }

  /// Feed one sample, returning the debounced state
  pub fn observe(&mut self, reachable: bool) -> bool {
    if reachable {
      self.consecutive_failures = 0;
      self.online = true;
    } else {
      self.consecutive_failures = self.consecutive_failures.saturating_add(1);
      if self.consecutive_failures >= self.offline_after {
        self.online = false;
      }
    }
    self.online
  }
}

/// ---------------------------------------------------------------------------
/// Monitor
/// ---------------------------------------------------------------------------

pub struct NetworkMonitor {
  sender: watch::Sender<bool>,
  debouncer: Mutex<Debouncer>,
}

impl NetworkMonitor {
  pub fn new(offline_after_failures: u32, initially_online: bool) -> Self {
    let (sender, _) = watch::channel(initially_online);
    Self {
      sender,
      debouncer: Mutex::new(Debouncer::new(offline_after_failures, initially_online)),
    }
  }

  pub fn is_online(&self) -> bool {
    *self.sender.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.sender.subscribe()
  }

  /// Record a connectivity sample. Subscribers only wake on an actual change.
  pub async fn report(&self, reachable: bool) {
    let online = self.debouncer.lock().await.observe(reachable);
    let changed = self.sender.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      *current = online;
      true
    });
    if changed {
      tracing::info!(online, "network availability changed");
    }
  }
}

/// ---------------------------------------------------------------------------
/// Probing
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
  async fn probe(&self) -> bool;
}

/// Any HTTP response from the backend counts as reachable; only transport
/// failures count as offline.
pub struct HttpProbe {
  client: reqwest::Client,
  url: url::Url,
}

impl HttpProbe {
  pub fn new(url: url::Url, timeout: Duration) -> Result<Self, RemoteError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| RemoteError::Network(format!("Failed to build probe client: {}", e)))?;
    Ok(Self { client, url })
  }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
  async fn probe(&self) -> bool {
    match self.client.head(self.url.clone()).send().await {
      Ok(_) => true,
      Err(e) => {
        tracing::debug!(error = %e, "connectivity probe failed");
        false
      }
    }
  }
}

/// Sample `probe` on a fixed interval until `shutdown` flips to true
pub fn spawn_probe(
  monitor: Arc<NetworkMonitor>,
  probe: Arc<dyn ConnectivityProbe>,
  config: &NetworkConfig,
  mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
  let interval = config.probe_interval;
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        _ = ticker.tick() => {
          let reachable = probe.probe().await;
          monitor.report(reachable).await;
        }
        _ = shutdown.changed() => {
          if *shutdown.borrow() {
            break;
          }
        }
      }
    }
    tracing::debug!("connectivity probe stopped");
  })
}
