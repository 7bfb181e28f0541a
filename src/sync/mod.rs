//! Sync engine: pushes pending local writes to the remote backend and
//! refreshes the poll cache from it.
//!
//! A pass runs `Idle -> Syncing -> Idle`. Only one pass runs at a time; a
//! second request while one is in flight returns a skipped result instead of
//! queueing. Going offline mid-pass does not cancel it; remote calls simply
//! fail and their records stay pending for the next pass.

mod conflict;
mod drafts;
mod pull;
mod scheduler;
mod votes;


use chrono::{DateTime, Utc};
use color_eyre::Result;
use futures::{stream, Future, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::network::NetworkMonitor;
use crate::remote::{GatewayError, RemoteGateway};
use crate::store::{Choice, LocalStore, PendingVote, SettingKey, SettingValue, Voter};

pub use conflict::{resolve_duplicate_vote, ConflictResolution};
pub use scheduler::{SyncScheduler, Trigger};

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct SyncOptions {
  /// A pass is due once the last one is older than this
  pub staleness: chrono::Duration,
  /// Upper bound for each remote call
  pub remote_timeout: std::time::Duration,
  /// Records pushed concurrently within one drain
  pub concurrency: usize,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      staleness: chrono::Duration::minutes(5),
      remote_timeout: std::time::Duration::from_secs(15),
      concurrency: 1,
    }
  }
}

/// Outcome of one sync pass.
///
/// Per-record failures land in `errors` without failing the pass; `success`
/// is false only when the pass was skipped or the local store failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
  pub success: bool,
  pub skipped: bool,
  pub votes_synced: usize,
  pub drafts_synced: usize,
  pub errors: Vec<String>,
}

impl SyncResult {
  fn skipped(reason: &str) -> Self {
    Self {
      success: false,
      skipped: true,
      errors: vec![reason.to_string()],
      ..Default::default()
    }
  }
}

/// Read-only snapshot for status badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
  pub online: bool,
  pub last_sync: Option<DateTime<Utc>>,
  pub pending_votes: usize,
  pub pending_drafts: usize,
  pub in_progress: bool,
}

/// What `clear_sync_queue` discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedQueue {
  pub votes: usize,
  pub drafts: usize,
}

/// Resets the in-progress flag even if the pass future is dropped.
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
  fn enter(flag: &'a AtomicBool) -> Self {
    flag.store(true, Ordering::SeqCst);
    Self(flag)
  }
}

impl Drop for InProgress<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

pub struct SyncEngine {
  store: Arc<LocalStore>,
  gateway: Arc<dyn RemoteGateway>,
  network: Arc<NetworkMonitor>,
  identity: Voter,
  options: SyncOptions,
  /// Single slot: held for the whole pass
  gate: Mutex<()>,
  in_progress: AtomicBool,
}

impl SyncEngine {
  pub fn new(
    store: Arc<LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    network: Arc<NetworkMonitor>,
    identity: Voter,
    options: SyncOptions,
  ) -> Self {
    Self {
      store,
      gateway,
      network,
      identity,
      options,
      gate: Mutex::new(()),
      in_progress: AtomicBool::new(false),
    }
  }

  /// The configured user, or this device's anonymous identity.
  pub fn resolve_identity(store: &LocalStore, user_id: Option<&str>) -> Result<Voter> {
    match user_id {
      Some(id) => Ok(Voter::User(id.to_string())),
      None => Ok(Voter::Device(store.device_id()?)),
    }
  }

  pub fn store(&self) -> &LocalStore {
    &self.store
  }

  pub fn network(&self) -> &NetworkMonitor {
    &self.network
  }

  pub fn identity(&self) -> &Voter {
    &self.identity
  }

  /// Run one pass: drain votes, drain drafts, record `last_sync`.
  ///
  /// Skipped (with `success = false`) when offline or when another pass is
  /// already running.
  pub async fn sync_when_online(&self) -> SyncResult {
    if !self.network.is_online() {
      debug!("offline, skipping sync");
      return SyncResult::skipped("Device is offline");
    }

    let Ok(_slot) = self.gate.try_lock() else {
      debug!("sync already in progress, skipping");
      return SyncResult::skipped("Sync already in progress");
    };
    let _running = InProgress::enter(&self.in_progress);

    let started = Instant::now();
    let result = self.run_pass().await;
    info!(
      success = result.success,
      votes = result.votes_synced,
      drafts = result.drafts_synced,
      errors = result.errors.len(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "sync pass finished"
    );
    result
  }

  /// User-triggered refresh; same as [`Self::sync_when_online`].
  pub async fn force_sync(&self) -> SyncResult {
    self.sync_when_online().await
  }

  async fn run_pass(&self) -> SyncResult {
    let mut result = SyncResult {
      success: true,
      ..Default::default()
    };

    match self.store.list_unsynced_votes() {
      Ok(votes) => {
        let (synced, errors) = self.drain_votes(votes).await;
        result.votes_synced = synced;
        result.errors.extend(errors);
      }
      Err(e) => {
        error!("cannot read pending votes: {}", e);
        result.success = false;
        result.errors.push(format!("Failed to read pending votes: {}", e));
        return result;
      }
    }

    match self.store.list_unsynced_drafts() {
      Ok(drafts) => {
        let (synced, errors) = self.drain_drafts(drafts).await;
        result.drafts_synced = synced;
        result.errors.extend(errors);
      }
      Err(e) => {
        error!("cannot read pending drafts: {}", e);
        result.success = false;
        result.errors.push(format!("Failed to read pending drafts: {}", e));
        return result;
      }
    }

    if let Err(e) = self
      .store
      .set_setting(SettingKey::LastSync, &SettingValue::Timestamp(Utc::now()))
    {
      error!("cannot record last sync: {}", e);
      result.success = false;
      result.errors.push(format!("Failed to record last sync: {}", e));
    }

    result
  }

  /// Run `push` over `records`, up to `concurrency` at a time, and count the
  /// successes.
  async fn drain<T, F, Fut>(&self, records: Vec<T>, push: F) -> (usize, Vec<String>)
  where
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<(), String>>,
  {
    let outcomes: Vec<std::result::Result<(), String>> = stream::iter(records)
      .map(push)
      .buffered(self.options.concurrency.max(1))
      .collect()
      .await;

    let mut synced = 0;
    let mut errors = Vec::new();
    for outcome in outcomes {
      match outcome {
        Ok(()) => synced += 1,
        Err(e) => errors.push(e),
      }
    }
    (synced, errors)
  }

  /// Bound a remote call by the configured timeout.
  async fn remote<T, Fut>(&self, call: Fut) -> std::result::Result<T, GatewayError>
  where
    Fut: Future<Output = std::result::Result<T, GatewayError>>,
  {
    match tokio::time::timeout(self.options.remote_timeout, call).await {
      Ok(result) => result,
      Err(_) => Err(GatewayError::Timeout(self.options.remote_timeout)),
    }
  }

  pub fn get_sync_status(&self) -> Result<SyncStatus> {
    Ok(SyncStatus {
      online: self.network.is_online(),
      last_sync: self.last_sync()?,
      pending_votes: self.store.count_unsynced_votes()?,
      pending_drafts: self.store.count_unsynced_drafts()?,
      in_progress: self.in_progress.load(Ordering::SeqCst),
    })
  }

  fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
    Ok(
      self
        .store
        .get_setting(SettingKey::LastSync)?
        .and_then(|v| v.as_timestamp()),
    )
  }

  /// True if no pass has ever completed or the last one is stale.
  pub fn is_sync_needed(&self) -> Result<bool> {
    Ok(match self.last_sync()? {
      Some(last) => Utc::now() - last > self.options.staleness,
      None => true,
    })
  }

  pub fn has_pending_work(&self) -> Result<bool> {
    Ok(self.store.count_unsynced_votes()? > 0 || self.store.count_unsynced_drafts()? > 0)
  }

  /// Abandon all pending votes and drafts without pushing them.
  pub fn clear_sync_queue(&self) -> Result<ClearedQueue> {
    let cleared = ClearedQueue {
      votes: self.store.mark_all_votes_synced()?,
      drafts: self.store.delete_unsynced_drafts()?,
    };
    info!(
      votes = cleared.votes,
      drafts = cleared.drafts,
      "discarded pending changes"
    );
    Ok(cleared)
  }

  /// Record a vote locally and re-estimate the cached poll's counts.
  ///
  /// The vote stays pending until the next pass pushes it.
  pub fn cast_vote(&self, poll_id: &str, choice: Choice) -> Result<PendingVote> {
    let previous = self.pending_choice(poll_id)?;
    let vote = PendingVote::new(poll_id, choice, self.identity.clone());
    self.store.put_vote(&vote)?;

    if let Some(mut poll) = self.store.get_poll(poll_id)? {
      match previous.or(poll.user_vote) {
        Some(prior) => poll.counts.shift(prior, choice),
        None => poll.counts.add(choice),
      }
      poll.user_vote = Some(choice);
      self.store.put_poll(&poll)?;
    }

    debug!(poll_id, %choice, vote_id = %vote.id, "vote recorded locally");
    Ok(vote)
  }

  /// This identity's unsynced choice on a poll.
  fn pending_choice(&self, poll_id: &str) -> Result<Option<Choice>> {
    Ok(
      self
        .store
        .list_votes(Some(poll_id))?
        .into_iter()
        .find(|v| !v.synced && v.voter == self.identity)
        .map(|v| v.choice),
    )
  }
}
