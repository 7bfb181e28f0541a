//! In-memory gateway for tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::types::{AssetUpload, NewPoll, NewVote, RemotePoll, RemoteVote};
use super::{GatewayError, RemoteGateway};
use crate::store::Voter;

#[derive(Default)]
struct State {
  votes: Vec<RemoteVote>,
  polls: HashMap<String, RemotePoll>,
  assets: HashMap<String, Vec<u8>>,
  fail_vote_polls: HashSet<String>,
  fail_poll_titles: HashSet<String>,
  fail_uploads: bool,
  hide_votes: bool,
}

/// Gateway holding votes and polls in memory, with failure injection.
#[derive(Default)]
pub struct FakeGateway {
  state: Mutex<State>,
  delay: Option<Duration>,
  pub insert_vote_calls: AtomicUsize,
  pub upload_calls: AtomicUsize,
}

impl FakeGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sleep this long inside every `insert_vote`.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Make `insert_vote` fail with a network error for this poll.
  pub fn fail_votes_for(&self, poll_id: &str) {
    self.state().fail_vote_polls.insert(poll_id.to_string());
  }

  pub fn fail_polls_titled(&self, title: &str) {
    self.state().fail_poll_titles.insert(title.to_string());
  }

  pub fn fail_uploads(&self) {
    self.state().fail_uploads = true;
  }

  /// Make `fetch_vote` find nothing even when a vote exists.
  pub fn hide_votes(&self) {
    self.state().hide_votes = true;
  }

  pub fn seed_vote(&self, vote: RemoteVote) {
    self.state().votes.push(vote);
  }

  pub fn seed_poll(&self, poll: RemotePoll) {
    self.state().polls.insert(poll.id.clone(), poll);
  }

  pub fn votes(&self) -> Vec<RemoteVote> {
    self.state().votes.clone()
  }

  pub fn polls(&self) -> Vec<RemotePoll> {
    self.state().polls.values().cloned().collect()
  }

  pub fn insert_vote_calls(&self) -> usize {
    self.insert_vote_calls.load(Ordering::SeqCst)
  }

  pub fn upload_calls(&self) -> usize {
    self.upload_calls.load(Ordering::SeqCst)
  }

  fn state(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap()
  }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
  async fn insert_vote(&self, vote: &NewVote) -> Result<RemoteVote, GatewayError> {
    self.insert_vote_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let mut state = self.state();
    if state.fail_vote_polls.contains(&vote.poll_id) {
      return Err(GatewayError::Network("connection reset".to_string()));
    }
    if state
      .votes
      .iter()
      .any(|v| v.poll_id == vote.poll_id && v.voter == vote.voter)
    {
      return Err(GatewayError::Conflict {
        poll_id: vote.poll_id.clone(),
      });
    }

    let recorded = RemoteVote {
      id: format!("remote-{}", vote.client_id),
      poll_id: vote.poll_id.clone(),
      choice: vote.choice,
      voter: vote.voter.clone(),
      created_at: vote.created_at,
    };
    state.votes.push(recorded.clone());
    Ok(recorded)
  }

  async fn fetch_vote(
    &self,
    poll_id: &str,
    voter: &Voter,
  ) -> Result<Option<RemoteVote>, GatewayError> {
    let state = self.state();
    if state.hide_votes {
      return Ok(None);
    }
    Ok(
      state
        .votes
        .iter()
        .find(|v| v.poll_id == poll_id && &v.voter == voter)
        .cloned(),
    )
  }

  async fn insert_poll(&self, poll: &NewPoll) -> Result<RemotePoll, GatewayError> {
    let mut state = self.state();
    if state.fail_poll_titles.contains(&poll.title) {
      return Err(GatewayError::Server {
        status: 500,
        message: "insert failed".to_string(),
      });
    }

    let created = RemotePoll {
      id: format!("remote-{}", poll.client_id),
      title: poll.title.clone(),
      description: poll.description.clone(),
      option_a: poll.option_a.clone(),
      option_b: poll.option_b.clone(),
      creator_id: None,
      created_at: Utc::now(),
      expires_at: poll.expires_at,
      is_public: poll.is_public,
      votes: Vec::new(),
    };
    state.polls.insert(created.id.clone(), created.clone());
    Ok(created)
  }

  async fn fetch_poll(&self, id: &str) -> Result<Option<RemotePoll>, GatewayError> {
    let state = self.state();
    Ok(state.polls.get(id).map(|p| with_votes(p, &state.votes)))
  }

  async fn fetch_recent_polls(&self, limit: usize) -> Result<Vec<RemotePoll>, GatewayError> {
    let state = self.state();
    let mut polls: Vec<RemotePoll> = state
      .polls
      .values()
      .map(|p| with_votes(p, &state.votes))
      .collect();
    polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    polls.truncate(limit);
    Ok(polls)
  }

  async fn upload_asset(&self, asset: AssetUpload<'_>) -> Result<String, GatewayError> {
    self.upload_calls.fetch_add(1, Ordering::SeqCst);
    let mut state = self.state();
    if state.fail_uploads {
      return Err(GatewayError::Timeout(Duration::from_secs(30)));
    }
    state.assets.insert(asset.key.to_string(), asset.data.to_vec());
    Ok(format!("https://cdn.example.com/{}", asset.key))
  }
}

fn with_votes(poll: &RemotePoll, votes: &[RemoteVote]) -> RemotePoll {
  let mut poll = poll.clone();
  poll.votes.extend(votes.iter().filter(|v| v.poll_id == poll.id).cloned());
  poll
}
