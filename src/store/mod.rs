//! Local persistent store for offline operation.
//!
//! Four independent collections live in one SQLite database:
//! - cached polls, ordered by `cached_at` for recency scans and cleanup
//! - pending votes, indexed by poll and by `synced`
//! - pending drafts, indexed by `synced`
//! - typed key/value settings used for sync bookkeeping
//!
//! There are no foreign keys between collections; keeping them consistent is
//! the sync engine's job.

mod local;
mod schema;
mod types;

pub use local::LocalStore;
pub use types::{
  CachedPoll, Choice, DraftImage, DraftOption, PendingDraft, PendingVote, PollOption, SettingKey,
  SettingValue, StorageUsage, VoteCounts, Voter,
};
