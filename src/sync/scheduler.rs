//! Background task that turns reconnects, a periodic tick and explicit
//! requests into sync passes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{SyncEngine, SyncResult};
use crate::network::ListenerId;

/// Why a pass was considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// Connectivity came back
  Reconnected,
  /// Periodic timer
  Tick,
  /// Explicit request; always runs
  Requested,
}

pub struct SyncScheduler {
  engine: Arc<SyncEngine>,
  reconnect: ListenerId,
  tx: mpsc::UnboundedSender<Trigger>,
  worker: JoinHandle<()>,
  ticker: JoinHandle<()>,
}

impl SyncScheduler {
  /// Start the scheduler. `on_result` sees every pass that actually ran.
  pub fn start<F>(engine: Arc<SyncEngine>, interval: Duration, on_result: F) -> Self
  where
    F: Fn(Trigger, &SyncResult) + Send + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let reconnect_tx = tx.clone();
    let reconnect = engine.network().on_online(move || {
      // Ignore send errors - scheduler may have shut down
      let _ = reconnect_tx.send(Trigger::Reconnected);
    });

    let tick_tx = tx.clone();
    let ticker = tokio::spawn(async move {
      let mut timer = tokio::time::interval(interval);
      timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      // First tick completes immediately
      timer.tick().await;
      loop {
        timer.tick().await;
        if tick_tx.send(Trigger::Tick).is_err() {
          break;
        }
      }
    });

    let worker_engine = engine.clone();
    let worker = tokio::spawn(async move {
      let engine = worker_engine;
      while let Some(trigger) = rx.recv().await {
        if !should_run(&engine, trigger) {
          debug!(?trigger, "sync not due");
          continue;
        }
        let result = engine.sync_when_online().await;
        if !result.skipped {
          on_result(trigger, &result);
        }
      }
    });

    Self {
      engine,
      reconnect,
      tx,
      worker,
      ticker,
    }
  }

  /// Ask for a pass now.
  pub fn request(&self) {
    let _ = self.tx.send(Trigger::Requested);
  }

  /// Stop both tasks and unregister the reconnect listener.
  pub fn shutdown(self) {
    self.engine.network().remove_listener(self.reconnect);
    self.ticker.abort();
    self.worker.abort();
  }
}

/// Reconnects and ticks only run when there is pending work or the last
/// pass is stale.
fn should_run(engine: &SyncEngine, trigger: Trigger) -> bool {
  if trigger == Trigger::Requested {
    return true;
  }
  if !engine.network().is_online() {
    return false;
  }

  match (engine.has_pending_work(), engine.is_sync_needed()) {
    (Ok(pending), Ok(stale)) => pending || stale,
    (Err(e), _) | (_, Err(e)) => {
      // Let the pass itself report the store failure
      warn!("cannot decide whether sync is due: {}", e);
      true
    }
  }
}
