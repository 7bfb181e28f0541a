//! Remote backend access.
//!
//! The sync engine only sees the [`RemoteGateway`] trait. [`HttpGateway`] is
//! the JSON-over-HTTP implementation used by the binary.

mod http;
mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use std::time::Duration;

use crate::store::Voter;

pub use http::HttpGateway;
pub use types::{AssetUpload, NewPoll, NewVote, RemotePoll, RemoteVote};

/// Failure of a remote call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
  /// The voter already has a vote recorded for this poll
  #[error("vote already recorded for poll {poll_id}")]
  Conflict { poll_id: String },

  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  #[error("network error: {0}")]
  Network(String),

  #[error("server error: {status} - {message}")]
  Server { status: u16, message: String },

  #[error("invalid response: {0}")]
  Decode(String),
}

impl GatewayError {
  pub fn is_conflict(&self) -> bool {
    matches!(self, GatewayError::Conflict { .. })
  }
}

/// Operations the sync engine needs from the remote source of truth.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
  /// Record a vote. Fails with [`GatewayError::Conflict`] if the voter has
  /// already voted on the poll.
  async fn insert_vote(&self, vote: &NewVote) -> Result<RemoteVote, GatewayError>;

  /// The vote `voter` has recorded on `poll_id`, if any.
  async fn fetch_vote(
    &self,
    poll_id: &str,
    voter: &Voter,
  ) -> Result<Option<RemoteVote>, GatewayError>;

  async fn insert_poll(&self, poll: &NewPoll) -> Result<RemotePoll, GatewayError>;

  /// `Ok(None)` when the poll does not exist.
  async fn fetch_poll(&self, id: &str) -> Result<Option<RemotePoll>, GatewayError>;

  /// Newest polls first.
  async fn fetch_recent_polls(&self, limit: usize) -> Result<Vec<RemotePoll>, GatewayError>;

  /// Upload an image and return its public URL.
  async fn upload_asset(&self, asset: AssetUpload<'_>) -> Result<String, GatewayError>;
}
