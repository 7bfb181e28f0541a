//! Vote drain.

use tracing::{debug, warn};

use super::conflict::{resolve_duplicate_vote, ConflictResolution};
use super::SyncEngine;
use crate::remote::{GatewayError, NewVote};
use crate::store::PendingVote;

impl SyncEngine {
  /// Push every vote independently; one failure never blocks the others.
  pub(super) async fn drain_votes(&self, votes: Vec<PendingVote>) -> (usize, Vec<String>) {
    if votes.is_empty() {
      return (0, Vec::new());
    }
    debug!(count = votes.len(), "draining pending votes");
    self.drain(votes, |vote| self.push_vote(vote)).await
  }

  async fn push_vote(&self, vote: PendingVote) -> Result<(), String> {
    let request = NewVote::from(&vote);

    match self.remote(self.gateway.insert_vote(&request)).await {
      Ok(_) => {
        debug!(vote_id = %vote.id, poll_id = %vote.poll_id, "vote pushed");
        self.mark_synced(&vote)
      }
      Err(e) if e.is_conflict() => match self.resolve_conflict(&vote).await {
        Ok(resolution) if resolution.is_resolved() => {
          debug!(poll_id = %vote.poll_id, ?resolution, "vote conflict resolved");
          self.mark_synced(&vote)
        }
        Ok(_) => {
          warn!(poll_id = %vote.poll_id, "vote conflict without a server vote");
          Err(format!("Vote conflict on poll {} could not be resolved", vote.poll_id))
        }
        Err(e) => {
          warn!(poll_id = %vote.poll_id, "vote conflict lookup failed: {}", e);
          Err(format!(
            "Vote conflict on poll {} could not be resolved: {}",
            vote.poll_id, e
          ))
        }
      },
      Err(e) => {
        warn!(poll_id = %vote.poll_id, "vote push failed: {}", e);
        Err(format!("Failed to sync vote for poll {}: {}", vote.poll_id, e))
      }
    }
  }

  async fn resolve_conflict(&self, vote: &PendingVote) -> Result<ConflictResolution, GatewayError> {
    let server = self
      .remote(self.gateway.fetch_vote(&vote.poll_id, &vote.voter))
      .await?;
    Ok(resolve_duplicate_vote(vote, server.as_ref()))
  }

  fn mark_synced(&self, vote: &PendingVote) -> Result<(), String> {
    self
      .store
      .mark_vote_synced(&vote.id)
      .map(|_| ())
      .map_err(|e| format!("Failed to mark vote for poll {} synced: {}", vote.poll_id, e))
  }
}
