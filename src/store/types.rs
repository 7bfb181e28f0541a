//! Record types held by the local store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// One of the two options of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
  OptionA,
  OptionB,
}

impl Choice {
  pub fn as_str(&self) -> &'static str {
    match self {
      Choice::OptionA => "option_a",
      Choice::OptionB => "option_b",
    }
  }
}

impl fmt::Display for Choice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Choice {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "option_a" | "a" => Ok(Choice::OptionA),
      "option_b" | "b" => Ok(Choice::OptionB),
      other => Err(format!("unknown choice '{}'", other)),
    }
  }
}

/// Who cast a vote: an authenticated user or an anonymous device, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Voter {
  User(String),
  Device(String),
}

impl Voter {
  pub fn kind(&self) -> &'static str {
    match self {
      Voter::User(_) => "user",
      Voter::Device(_) => "device",
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Voter::User(id) | Voter::Device(id) => id,
    }
  }

  /// Rebuild a voter from its stored `(kind, id)` columns.
  pub fn from_parts(kind: &str, id: String) -> Option<Self> {
    match kind {
      "user" => Some(Voter::User(id)),
      "device" => Some(Voter::Device(id)),
      _ => None,
    }
  }
}

impl fmt::Display for Voter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind(), self.id())
  }
}

/// Label and image of one poll option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
  pub label: String,
  pub image_url: Option<String>,
}

/// Aggregate vote counts of a poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
  pub option_a: u64,
  pub option_b: u64,
  pub total: u64,
}

impl VoteCounts {
  pub fn get(&self, choice: Choice) -> u64 {
    match choice {
      Choice::OptionA => self.option_a,
      Choice::OptionB => self.option_b,
    }
  }

  fn slot(&mut self, choice: Choice) -> &mut u64 {
    match choice {
      Choice::OptionA => &mut self.option_a,
      Choice::OptionB => &mut self.option_b,
    }
  }

  /// Count a new vote.
  pub fn add(&mut self, choice: Choice) {
    *self.slot(choice) += 1;
    self.total += 1;
  }

  /// Move one vote from `from` to `to` without changing the total.
  pub fn shift(&mut self, from: Choice, to: Choice) {
    if from == to {
      return;
    }
    let source = self.slot(from);
    *source = source.saturating_sub(1);
    *self.slot(to) += 1;
  }
}

/// Read-mostly snapshot of a poll, used for offline viewing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPoll {
  pub id: String,
  pub title: String,
  pub description: Option<String>,
  pub option_a: PollOption,
  pub option_b: PollOption,
  pub creator_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub expires_at: Option<DateTime<Utc>>,
  pub is_public: bool,
  pub counts: VoteCounts,
  /// The current identity's choice, if known
  pub user_vote: Option<Choice>,
  pub cached_at: DateTime<Utc>,
}

/// A vote cast locally and not yet confirmed by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVote {
  pub id: String,
  pub poll_id: String,
  pub choice: Choice,
  pub voter: Voter,
  pub created_at: DateTime<Utc>,
  pub synced: bool,
}

impl PendingVote {
  pub fn new(poll_id: impl Into<String>, choice: Choice, voter: Voter) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      poll_id: poll_id.into(),
      choice,
      voter,
      created_at: Utc::now(),
      synced: false,
    }
  }
}

/// Image attached to a draft option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DraftImage {
  /// Raw bytes not yet uploaded
  Pending {
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
    content_type: String,
  },
  /// Already uploaded, only the URL remains
  Uploaded { url: String },
}

impl DraftImage {
  /// Content address used as the upload key, stable across retries.
  pub fn asset_key(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
  }
}

/// One option of a draft poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOption {
  pub text: String,
  pub image: Option<DraftImage>,
}

impl DraftOption {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      image: None,
    }
  }
}

/// A poll composed locally, deleted once the remote poll exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDraft {
  pub id: String,
  pub title: String,
  pub description: Option<String>,
  pub option_a: DraftOption,
  pub option_b: DraftOption,
  pub is_public: bool,
  pub expires_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub synced: bool,
}

impl PendingDraft {
  pub fn new(title: impl Into<String>, option_a: DraftOption, option_b: DraftOption) -> Self {
    let now = Utc::now();
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      title: title.into(),
      description: None,
      option_a,
      option_b,
      is_public: true,
      expires_at: None,
      created_at: now,
      updated_at: now,
      synced: false,
    }
  }
}

/// Keys of the engine's bookkeeping settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
  LastSync,
  LastCleanup,
  DeviceId,
}

impl SettingKey {
  pub fn as_str(&self) -> &'static str {
    match self {
      SettingKey::LastSync => "last_sync",
      SettingKey::LastCleanup => "last_cleanup",
      SettingKey::DeviceId => "device_id",
    }
  }
}

/// Typed value of a setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
  Timestamp(DateTime<Utc>),
  Text(String),
}

impl SettingValue {
  pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
    match self {
      SettingValue::Timestamp(ts) => Some(*ts),
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      SettingValue::Text(s) => Some(s),
      _ => None,
    }
  }
}

/// Storage accounting snapshot. All zeros when unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageUsage {
  pub used_bytes: u64,
  pub quota_bytes: u64,
  pub percent: f64,
}

mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(&s).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_choice_parse_accepts_short_forms() {
    assert_eq!("a".parse::<Choice>().unwrap(), Choice::OptionA);
    assert_eq!("OPTION_B".parse::<Choice>().unwrap(), Choice::OptionB);
    assert!("c".parse::<Choice>().is_err());
  }

  #[test]
  fn test_counts_shift_keeps_total() {
    let mut counts = VoteCounts {
      option_a: 2,
      option_b: 1,
      total: 3,
    };
    counts.shift(Choice::OptionA, Choice::OptionB);
    assert_eq!(counts, VoteCounts { option_a: 1, option_b: 2, total: 3 });

    counts.shift(Choice::OptionB, Choice::OptionB);
    assert_eq!(counts.total, 3);
  }

  #[test]
  fn test_pending_image_bytes_stored_as_hex() {
    let image = DraftImage::Pending {
      data: vec![0xde, 0xad],
      content_type: "image/png".to_string(),
    };
    let json = serde_json::to_value(&image).unwrap();
    assert_eq!(json["data"], "dead");
    assert_eq!(json["state"], "pending");

    let back: DraftImage = serde_json::from_value(json).unwrap();
    assert_eq!(back, image);
  }

  #[test]
  fn test_asset_key_is_content_address() {
    assert_eq!(DraftImage::asset_key(b"abc"), DraftImage::asset_key(b"abc"));
    assert_ne!(DraftImage::asset_key(b"abc"), DraftImage::asset_key(b"abd"));
    assert_eq!(DraftImage::asset_key(b"abc").len(), 64);
  }
}
