//! Pull path: download polls into the offline cache.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info};

use super::SyncEngine;
use crate::remote::RemotePoll;
use crate::store::{CachedPoll, Choice, Voter};

impl SyncEngine {
  /// Fetch one poll and cache it. `Ok(None)` if the poll does not exist.
  pub async fn download_poll(&self, id: &str) -> Result<Option<CachedPoll>> {
    self.ensure_online()?;

    let remote = self
      .remote(self.gateway.fetch_poll(id))
      .await
      .map_err(|e| eyre!("Failed to download poll {}: {}", id, e))?;

    match remote {
      Some(remote) => self.cache_remote_poll(remote).map(Some),
      None => {
        debug!(poll_id = id, "poll not found remotely");
        Ok(None)
      }
    }
  }

  /// Fetch the newest polls and cache them.
  pub async fn download_recent_polls(&self, limit: usize) -> Result<Vec<CachedPoll>> {
    self.ensure_online()?;

    let remote = self
      .remote(self.gateway.fetch_recent_polls(limit))
      .await
      .map_err(|e| eyre!("Failed to download recent polls: {}", e))?;

    let cached = remote
      .into_iter()
      .map(|poll| self.cache_remote_poll(poll))
      .collect::<Result<Vec<_>>>()?;

    info!(count = cached.len(), "cached recent polls");
    Ok(cached)
  }

  fn ensure_online(&self) -> Result<()> {
    if self.network.is_online() {
      Ok(())
    } else {
      Err(eyre!("Cannot download polls while offline"))
    }
  }

  /// Server counts overwrite any local estimate.
  fn cache_remote_poll(&self, remote: RemotePoll) -> Result<CachedPoll> {
    let pending = self.pending_choice(&remote.id)?;
    let poll = to_cached_poll(remote, &self.identity, pending, Utc::now());
    self.store.put_poll(&poll)?;
    Ok(poll)
  }
}

/// Snapshot a remote poll. `user_vote` prefers the server's record of
/// `identity`, then a pending local vote.
pub(crate) fn to_cached_poll(
  remote: RemotePoll,
  identity: &Voter,
  pending: Option<Choice>,
  cached_at: DateTime<Utc>,
) -> CachedPoll {
  let counts = remote.counts();
  let user_vote = remote.choice_of(identity).or(pending);

  CachedPoll {
    id: remote.id,
    title: remote.title,
    description: remote.description,
    option_a: remote.option_a,
    option_b: remote.option_b,
    creator_id: remote.creator_id,
    created_at: remote.created_at,
    expires_at: remote.expires_at,
    is_public: remote.is_public,
    counts,
    user_vote,
    cached_at,
  }
}
