use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pollsync::config::Config;
use pollsync::network::Transition;
use pollsync::store::{SettingKey, SettingValue};
use pollsync::sync::{SyncEngine, SyncScheduler};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run the scheduler, reachability probe and cache cleanup until Ctrl-C.
pub async fn run(
  engine: Arc<SyncEngine>,
  authority: Option<(String, u16)>,
  config: &Config,
) -> Result<()> {
  let scheduler = SyncScheduler::start(
    engine.clone(),
    Duration::from_secs(config.sync.interval_secs.max(1)),
    |trigger, result| {
      info!(
        ?trigger,
        votes = result.votes_synced,
        drafts = result.drafts_synced,
        errors = result.errors.len(),
        "scheduled sync finished"
      );
      for error in &result.errors {
        warn!("{}", error);
      }
    },
  );

  let probe = match authority {
    Some((host, port)) => Some(spawn_probe(
      engine.clone(),
      host,
      port,
      Duration::from_secs(config.sync.probe_interval_secs.max(1)),
    )),
    None => {
      warn!("remote URL has no host, reachability probe disabled");
      None
    }
  };
  let cleanup = spawn_cleanup(engine.clone(), config.cache_max_age()?);

  if engine.network().is_online() {
    match engine.download_recent_polls(config.sync.recent_limit).await {
      Ok(polls) => debug!(count = polls.len(), "initial cache refresh"),
      Err(e) => warn!("initial cache refresh failed: {}", e),
    }
  }
  scheduler.request();

  info!(identity = %engine.identity(), "daemon running, press Ctrl-C to stop");
  let signal = tokio::signal::ctrl_c()
    .await
    .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e));

  info!("shutting down");
  scheduler.shutdown();
  if let Some(probe) = probe {
    probe.abort();
  }
  cleanup.abort();

  signal
}

/// Feed the network monitor from TCP reachability of the backend.
fn spawn_probe(
  engine: Arc<SyncEngine>,
  host: String,
  port: u16,
  every: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
      timer.tick().await;
      let reachable = matches!(
        tokio::time::timeout(every, TcpStream::connect((host.as_str(), port))).await,
        Ok(Ok(_))
      );
      match engine.network().set_online(reachable) {
        Some(Transition::Online) => info!(%host, port, "backend reachable"),
        Some(Transition::Offline) => warn!(%host, port, "backend unreachable"),
        None => {}
      }
    }
  })
}

fn spawn_cleanup(engine: Arc<SyncEngine>, max_age: chrono::Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut timer = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
      timer.tick().await;
      let store = engine.store();
      match store.cleanup_older_than(max_age) {
        Ok(removed) => {
          debug!(removed, "cache cleanup");
          let now = SettingValue::Timestamp(Utc::now());
          if let Err(e) = store.set_setting(SettingKey::LastCleanup, &now) {
            warn!("cannot record cleanup time: {}", e);
          }
        }
        Err(e) => warn!("cache cleanup failed: {}", e),
      }
    }
  })
}
