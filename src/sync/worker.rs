//! Background task that decides when to run a sync pass.
//!
//! It owns its inputs (network signal, trigger channel, shutdown signal) and
//! runs passes one after another, never concurrently.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{SyncEngine, SyncOutcome};
use crate::network::NetworkMonitor;

pub struct SyncWorker {
  engine: Arc<SyncEngine>,
  network: watch::Receiver<bool>,
  triggers: mpsc::Receiver<()>,
  shutdown: watch::Receiver<bool>,
}

/// Cheap, cloneable way to ask the worker for a pass
#[derive(Debug, Clone)]
pub struct SyncTrigger(mpsc::Sender<()>);

impl SyncTrigger {
  /// Never blocks; a request already waiting absorbs this one.
  pub fn trigger(&self) {
    match self.0.try_send(()) {
      Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
      Err(mpsc::error::TrySendError::Closed(())) => {
        tracing::warn!("sync worker is gone, trigger dropped");
      }
    }
  }
}

pub struct SyncWorkerHandle {
  trigger: SyncTrigger,
  shutdown: watch::Sender<bool>,
  task: JoinHandle<()>,
}

impl SyncWorker {
  /// Start the worker. It syncs once right away if online, then on every
  /// offline to online transition and on every trigger.
  pub fn spawn(engine: Arc<SyncEngine>, monitor: &NetworkMonitor) -> SyncWorkerHandle {
    // One slot: triggers that pile up while a pass runs collapse into one.
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = SyncWorker {
      engine,
      network: monitor.subscribe(),
      triggers: trigger_rx,
      shutdown: shutdown_rx,
    };
    let task = tokio::spawn(worker.run());

    SyncWorkerHandle {
      trigger: SyncTrigger(trigger_tx),
      shutdown: shutdown_tx,
      task,
    }
  }

  async fn run(mut self) {
    let mut was_online = *self.network.borrow_and_update();
    if was_online {
      self.pass("startup").await;
    }

    loop {
      tokio::select! {
        changed = self.network.changed() => {
          if changed.is_err() {
            break;
          }
          let online = *self.network.borrow_and_update();
          if online && !was_online {
            self.pass("back online").await;
          }
          was_online = online;
        }
        Some(()) = self.triggers.recv() => {
          self.pass("trigger").await;
        }
        _ = self.shutdown.changed() => {
          break;
        }
      }
    }
    tracing::info!("sync worker stopped");
  }

  async fn pass(&self, reason: &'static str) {
    tracing::debug!(reason, "starting sync pass");
    if let SyncOutcome::Completed(report) = self.engine.sync_all().await {
      if report.failed > 0 {
        tracing::warn!(reason, failed = report.failed, "sync pass left failures");
      }
    }
  }
}

impl SyncWorkerHandle {
  pub fn trigger(&self) {
    self.trigger.trigger();
  }

  pub fn trigger_handle(&self) -> SyncTrigger {
    self.trigger.clone()
  }

  /// Stop after the pass in progress, if any, has finished
  pub async fn shutdown(self) {
    let _ = self.shutdown.send(true);
    if let Err(e) = self.task.await {
      tracing::error!(error = %e, "sync worker panicked");
    }
  }
}
