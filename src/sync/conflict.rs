//! Resolution of duplicate-vote conflicts.
//!
//! Votes are immutable once recorded, so the client never overwrites a
//! server vote. Resolution only decides whether to stop resubmitting.

use crate::remote::RemoteVote;
use crate::store::PendingVote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
  /// The server's vote is newer and stands
  ServerNewer,
  /// The local vote is newer or equal; the conflict proves a vote exists
  LocalNewerOrEqual,
  /// The server reported a conflict but has no vote for this voter
  NoServerVote,
}

impl ConflictResolution {
  /// Whether the local vote can stop being retried.
  pub fn is_resolved(&self) -> bool {
    !matches!(self, ConflictResolution::NoServerVote)
  }
}

/// Decide the fate of `local` given the server's vote by the same voter on
/// the same poll.
pub fn resolve_duplicate_vote(
  local: &PendingVote,
  server: Option<&RemoteVote>,
) -> ConflictResolution {
  match server {
    Some(server) if server.created_at > local.created_at => ConflictResolution::ServerNewer,
    Some(_) => ConflictResolution::LocalNewerOrEqual,
    None => ConflictResolution::NoServerVote,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{Choice, Voter};
  use chrono::Duration;

  fn local() -> PendingVote {
    PendingVote::new("p1", Choice::OptionA, Voter::User("u1".to_string()))
  }

  fn server_at(local: &PendingVote, offset: Duration) -> RemoteVote {
    RemoteVote {
      id: "r1".to_string(),
      poll_id: local.poll_id.clone(),
      choice: Choice::OptionB,
      voter: local.voter.clone(),
      created_at: local.created_at + offset,
    }
  }

  #[test]
  fn test_server_newer_is_resolved() {
    let vote = local();
    let server = server_at(&vote, Duration::seconds(5));
    let resolution = resolve_duplicate_vote(&vote, Some(&server));
    assert_eq!(resolution, ConflictResolution::ServerNewer);
    assert!(resolution.is_resolved());
  }

  #[test]
  fn test_local_newer_or_equal_is_resolved() {
    let vote = local();
    for offset in [Duration::seconds(-5), Duration::zero()] {
      let server = server_at(&vote, offset);
      let resolution = resolve_duplicate_vote(&vote, Some(&server));
      assert_eq!(resolution, ConflictResolution::LocalNewerOrEqual);
      assert!(resolution.is_resolved());
    }
  }

  #[test]
  fn test_missing_server_vote_is_unresolved() {
    assert!(!resolve_duplicate_vote(&local(), None).is_resolved());
  }
}
