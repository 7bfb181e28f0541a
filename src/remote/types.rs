//! Records exchanged with the remote backend.
//!
//! Field names match the local records so no separate wire format exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Choice, PendingDraft, PendingVote, PollOption, VoteCounts, Voter};

/// Vote insert request. `client_id` lets the server drop a retried insert.
#[derive(Debug, Clone, Serialize)]
pub struct NewVote {
  pub client_id: String,
  pub poll_id: String,
  pub choice: Choice,
  pub voter: Voter,
  pub created_at: DateTime<Utc>,
}

impl From<&PendingVote> for NewVote {
  fn from(vote: &PendingVote) -> Self {
    Self {
      client_id: vote.id.clone(),
      poll_id: vote.poll_id.clone(),
      choice: vote.choice,
      voter: vote.voter.clone(),
      created_at: vote.created_at,
    }
  }
}

/// A vote recorded server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVote {
  pub id: String,
  pub poll_id: String,
  pub choice: Choice,
  pub voter: Voter,
  pub created_at: DateTime<Utc>,
}

/// Poll create request built from a draft whose images are resolved to URLs.
#[derive(Debug, Clone, Serialize)]
pub struct NewPoll {
  pub client_id: String,
  pub title: String,
  pub description: Option<String>,
  pub option_a: PollOption,
  pub option_b: PollOption,
  pub is_public: bool,
  pub expires_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl NewPoll {
  pub fn from_draft(
    draft: &PendingDraft,
    image_a: Option<String>,
    image_b: Option<String>,
  ) -> Self {
    Self {
      client_id: draft.id.clone(),
      title: draft.title.clone(),
      description: draft.description.clone(),
      option_a: PollOption {
        label: draft.option_a.text.clone(),
        image_url: image_a,
      },
      option_b: PollOption {
        label: draft.option_b.text.clone(),
        image_url: image_b,
      },
      is_public: draft.is_public,
      expires_at: draft.expires_at,
      created_at: draft.created_at,
    }
  }
}

/// A poll with the votes recorded against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePoll {
  pub id: String,
  pub title: String,
  pub description: Option<String>,
  pub option_a: PollOption,
  pub option_b: PollOption,
  pub creator_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub expires_at: Option<DateTime<Utc>>,
  pub is_public: bool,
  #[serde(default)]
  pub votes: Vec<RemoteVote>,
}

impl RemotePoll {
  pub fn counts(&self) -> VoteCounts {
    let mut counts = VoteCounts::default();
    for vote in &self.votes {
      counts.add(vote.choice);
    }
    counts
  }

  /// The server-side choice of `voter`, if any.
  pub fn choice_of(&self, voter: &Voter) -> Option<Choice> {
    self
      .votes
      .iter()
      .find(|v| &v.voter == voter)
      .map(|v| v.choice)
  }
}

/// Image bytes to upload under a content-addressed key.
#[derive(Debug, Clone, Copy)]
pub struct AssetUpload<'a> {
  pub key: &'a str,
  pub content_type: &'a str,
  pub data: &'a [u8],
}
