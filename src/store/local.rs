//! SQLite implementation of the local store.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::schema::{MIGRATIONS, SCHEMA_VERSION};
use super::types::{
  CachedPoll, Choice, PendingDraft, PendingVote, SettingKey, SettingValue, StorageUsage, Voter,
};

/// Durable, indexed storage for cached polls, pending votes, pending drafts
/// and settings.
///
/// Every method runs as a single SQLite transaction (or a single statement),
/// so a write either fully applies or returns an error.
pub struct LocalStore {
  conn: Mutex<Connection>,
  quota_bytes: Option<u64>,
}

impl LocalStore {
  /// Open or create the store at `path`, migrating the schema if needed.
  ///
  /// Safe to call repeatedly on the same path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    conn
      .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to enable WAL: {}", e))?;
    conn
      .busy_timeout(std::time::Duration::from_secs(5))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;

    debug!(path = %path.display(), "opened local store");
    Self::from_connection(conn)
  }

  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open a throwaway in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pollsync").join("store.db"))
  }

  /// Set the quota reported by `estimate_usage`.
  pub fn with_quota(mut self, bytes: u64) -> Self {
    self.quota_bytes = Some(bytes);
    self
  }

  fn from_connection(mut conn: Connection) -> Result<Self> {
    run_migrations(&mut conn)?;
    Ok(Self {
      conn: Mutex::new(conn),
      quota_bytes: None,
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run raw SQL against the store, for fault injection in tests.
  #[cfg(test)]
  pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(sql)
      .map_err(|e| eyre!("Failed to execute SQL: {}", e))
  }

  // ==========================================================================
  // Cached polls
  // ==========================================================================

  /// Insert or overwrite a cached poll.
  pub fn put_poll(&self, poll: &CachedPoll) -> Result<()> {
    let conn = self.lock()?;
    let data = serde_json::to_vec(poll).map_err(|e| eyre!("Failed to serialize poll: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cached_polls (id, data, created_at, cached_at)
         VALUES (?, ?, ?, ?)",
        params![poll.id, data, fmt_ts(&poll.created_at), fmt_ts(&poll.cached_at)],
      )
      .map_err(|e| eyre!("Failed to store poll {}: {}", poll.id, e))?;

    Ok(())
  }

  pub fn get_poll(&self, id: &str) -> Result<Option<CachedPoll>> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM cached_polls WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read poll {}: {}", id, e))?;

    data.map(|d| decode_json(&d, "poll")).transpose()
  }

  /// Most recently cached polls first.
  pub fn list_polls(&self, limit: usize) -> Result<Vec<CachedPoll>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT data FROM cached_polls ORDER BY cached_at DESC LIMIT ?")
      .map_err(|e| eyre!("Failed to prepare poll query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map(params![limit as i64], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query polls: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read polls: {}", e))?;

    rows.iter().map(|d| decode_json(d, "poll")).collect()
  }

  /// Overwrite the vote counts of a cached poll.
  ///
  /// Returns `false` without writing if the poll is not cached.
  pub fn update_poll_vote_counts(
    &self,
    id: &str,
    option_a: u64,
    option_b: u64,
    total: u64,
  ) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let data: Option<Vec<u8>> = tx
      .query_row(
        "SELECT data FROM cached_polls WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read poll {}: {}", id, e))?;

    let Some(data) = data else {
      return Ok(false);
    };

    let mut poll: CachedPoll = decode_json(&data, "poll")?;
    poll.counts.option_a = option_a;
    poll.counts.option_b = option_b;
    poll.counts.total = total;

    let data = serde_json::to_vec(&poll).map_err(|e| eyre!("Failed to serialize poll: {}", e))?;
    tx.execute(
      "UPDATE cached_polls SET data = ? WHERE id = ?",
      params![data, id],
    )
    .map_err(|e| eyre!("Failed to update poll {}: {}", id, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(true)
  }

  /// Delete cached polls not cached since `now - max_age`.
  ///
  /// Pending votes and drafts are never touched.
  pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize> {
    // A cutoff before the representable range means nothing is old enough
    let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
      return Ok(0);
    };
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM cached_polls WHERE cached_at <= ?",
        params![fmt_ts(&cutoff)],
      )
      .map_err(|e| eyre!("Failed to clean up cached polls: {}", e))?;

    if removed > 0 {
      info!(removed, "removed stale cached polls");
    }
    Ok(removed)
  }

  // ==========================================================================
  // Pending votes
  // ==========================================================================

  /// Store a vote. An unsynced vote replaces any other unsynced vote by the
  /// same voter on the same poll.
  pub fn put_vote(&self, vote: &PendingVote) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    if !vote.synced {
      let replaced = tx
        .execute(
          "DELETE FROM pending_votes
           WHERE poll_id = ? AND voter_kind = ? AND voter_id = ? AND synced = 0 AND id != ?",
          params![vote.poll_id, vote.voter.kind(), vote.voter.id(), vote.id],
        )
        .map_err(|e| eyre!("Failed to replace previous vote: {}", e))?;

      if replaced > 0 {
        debug!(poll_id = %vote.poll_id, voter = %vote.voter, "replaced unsynced vote");
      }
    }

    tx.execute(
      "INSERT OR REPLACE INTO pending_votes
         (id, poll_id, choice, voter_kind, voter_id, created_at, synced)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        vote.id,
        vote.poll_id,
        vote.choice.as_str(),
        vote.voter.kind(),
        vote.voter.id(),
        fmt_ts(&vote.created_at),
        vote.synced,
      ],
    )
    .map_err(|e| eyre!("Failed to store vote: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  pub fn get_vote(&self, id: &str) -> Result<Option<PendingVote>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!("{} WHERE id = ?", SELECT_VOTE),
        params![id],
        VoteRow::read,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read vote {}: {}", id, e))?;

    row.map(VoteRow::into_vote).transpose()
  }

  /// All votes, optionally scoped to one poll, oldest first.
  pub fn list_votes(&self, poll_id: Option<&str>) -> Result<Vec<PendingVote>> {
    match poll_id {
      Some(poll_id) => self.query_votes(
        &format!("{} WHERE poll_id = ? ORDER BY created_at", SELECT_VOTE),
        params![poll_id],
      ),
      None => self.query_votes(&format!("{} ORDER BY created_at", SELECT_VOTE), []),
    }
  }

  pub fn list_unsynced_votes(&self) -> Result<Vec<PendingVote>> {
    self.query_votes(
      &format!("{} WHERE synced = 0 ORDER BY created_at", SELECT_VOTE),
      [],
    )
  }

  pub fn count_unsynced_votes(&self) -> Result<usize> {
    let conn = self.lock()?;
    count(&conn, "SELECT COUNT(*) FROM pending_votes WHERE synced = 0")
  }

  /// Flag a vote as synced. Missing or already-synced votes are a no-op.
  ///
  /// Returns whether a vote changed state.
  pub fn mark_vote_synced(&self, id: &str) -> Result<bool> {
    let conn = self.lock()?;

    let changed = conn
      .execute(
        "UPDATE pending_votes SET synced = 1 WHERE id = ? AND synced = 0",
        params![id],
      )
      .map_err(|e| eyre!("Failed to mark vote {} synced: {}", id, e))?;

    Ok(changed > 0)
  }

  /// Flag every unsynced vote as synced without pushing it anywhere.
  pub fn mark_all_votes_synced(&self) -> Result<usize> {
    let conn = self.lock()?;

    conn
      .execute("UPDATE pending_votes SET synced = 1 WHERE synced = 0", [])
      .map_err(|e| eyre!("Failed to mark votes synced: {}", e))
  }

  fn query_votes<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<PendingVote>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare vote query: {}", e))?;

    let rows: Vec<VoteRow> = stmt
      .query_map(params, VoteRow::read)
      .map_err(|e| eyre!("Failed to query votes: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read votes: {}", e))?;

    rows.into_iter().map(VoteRow::into_vote).collect()
  }

  // ==========================================================================
  // Pending drafts
  // ==========================================================================

  pub fn put_draft(&self, draft: &PendingDraft) -> Result<()> {
    let conn = self.lock()?;
    let data =
      serde_json::to_vec(draft).map_err(|e| eyre!("Failed to serialize draft: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO pending_drafts (id, data, created_at, synced)
         VALUES (?, ?, ?, ?)",
        params![draft.id, data, fmt_ts(&draft.created_at), draft.synced],
      )
      .map_err(|e| eyre!("Failed to store draft {}: {}", draft.id, e))?;

    Ok(())
  }

  pub fn get_draft(&self, id: &str) -> Result<Option<PendingDraft>> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM pending_drafts WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read draft {}: {}", id, e))?;

    data.map(|d| decode_json(&d, "draft")).transpose()
  }

  pub fn list_drafts(&self) -> Result<Vec<PendingDraft>> {
    self.query_drafts("SELECT data FROM pending_drafts ORDER BY created_at")
  }

  pub fn list_unsynced_drafts(&self) -> Result<Vec<PendingDraft>> {
    self.query_drafts("SELECT data FROM pending_drafts WHERE synced = 0 ORDER BY created_at")
  }

  pub fn count_unsynced_drafts(&self) -> Result<usize> {
    let conn = self.lock()?;
    count(&conn, "SELECT COUNT(*) FROM pending_drafts WHERE synced = 0")
  }

  /// Returns whether a draft was deleted.
  pub fn delete_draft(&self, id: &str) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute("DELETE FROM pending_drafts WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete draft {}: {}", id, e))?;

    Ok(removed > 0)
  }

  pub fn delete_unsynced_drafts(&self) -> Result<usize> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM pending_drafts WHERE synced = 0", [])
      .map_err(|e| eyre!("Failed to delete drafts: {}", e))
  }

  fn query_drafts(&self, sql: &str) -> Result<Vec<PendingDraft>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare draft query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query drafts: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read drafts: {}", e))?;

    rows.iter().map(|d| decode_json(d, "draft")).collect()
  }

  // ==========================================================================
  // Settings
  // ==========================================================================

  pub fn get_setting(&self, key: SettingKey) -> Result<Option<SettingValue>> {
    let conn = self.lock()?;
    read_setting(&conn, key)
  }

  pub fn set_setting(&self, key: SettingKey, value: &SettingValue) -> Result<()> {
    let conn = self.lock()?;
    write_setting(&conn, key, value)
  }

  /// Anonymous identity of this device, created on first use.
  pub fn device_id(&self) -> Result<String> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    if let Some(SettingValue::Text(id)) = read_setting(&tx, SettingKey::DeviceId)? {
      return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    write_setting(&tx, SettingKey::DeviceId, &SettingValue::Text(id.clone()))?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    info!(device_id = %id, "created device identity");
    Ok(id)
  }

  // ==========================================================================
  // Maintenance
  // ==========================================================================

  /// Bytes used versus quota. Degrades to zeros when accounting fails.
  pub fn estimate_usage(&self) -> StorageUsage {
    let used_bytes = match self.used_bytes() {
      Ok(used) => used,
      Err(e) => {
        debug!("storage accounting unavailable: {}", e);
        return StorageUsage::default();
      }
    };

    let quota_bytes = self.quota_bytes.unwrap_or(0);
    let percent = if quota_bytes > 0 {
      used_bytes as f64 / quota_bytes as f64 * 100.0
    } else {
      0.0
    };

    StorageUsage {
      used_bytes,
      quota_bytes,
      percent,
    }
  }

  fn used_bytes(&self) -> Result<u64> {
    let conn = self.lock()?;
    let pages: i64 = conn
      .pragma_query_value(None, "page_count", |row| row.get(0))
      .map_err(|e| eyre!("Failed to read page count: {}", e))?;
    let page_size: i64 = conn
      .pragma_query_value(None, "page_size", |row| row.get(0))
      .map_err(|e| eyre!("Failed to read page size: {}", e))?;

    Ok((pages.max(0) as u64) * (page_size.max(0) as u64))
  }

  /// Wipe every collection. Only for an explicit user reset.
  pub fn clear_all(&self) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute_batch(
      "DELETE FROM cached_polls;
       DELETE FROM pending_votes;
       DELETE FROM pending_drafts;
       DELETE FROM settings;",
    )
    .map_err(|e| eyre!("Failed to clear store: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    info!("local store cleared");
    Ok(())
  }
}

/// Apply pending migrations in one transaction.
fn run_migrations(conn: &mut Connection) -> Result<()> {
  let version: i64 = conn
    .pragma_query_value(None, "user_version", |row| row.get(0))
    .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

  if version < 0 {
    return Err(eyre!("Store schema version {} is invalid", version));
  }
  if version > SCHEMA_VERSION {
    return Err(eyre!(
      "Store schema version {} is newer than supported version {}",
      version,
      SCHEMA_VERSION
    ));
  }
  if version == SCHEMA_VERSION {
    return Ok(());
  }

  let tx = conn
    .transaction()
    .map_err(|e| eyre!("Failed to begin migration: {}", e))?;

  for migration in &MIGRATIONS[version as usize..] {
    tx.execute_batch(migration)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
  }
  tx.pragma_update(None, "user_version", SCHEMA_VERSION)
    .map_err(|e| eyre!("Failed to set schema version: {}", e))?;

  tx.commit()
    .map_err(|e| eyre!("Failed to commit migration: {}", e))?;

  info!(from = version, to = SCHEMA_VERSION, "migrated local store");
  Ok(())
}

const SELECT_VOTE: &str =
  "SELECT id, poll_id, choice, voter_kind, voter_id, created_at, synced FROM pending_votes";

/// Raw columns of a `pending_votes` row.
struct VoteRow {
  id: String,
  poll_id: String,
  choice: String,
  voter_kind: String,
  voter_id: String,
  created_at: String,
  synced: bool,
}

impl VoteRow {
  fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get(0)?,
      poll_id: row.get(1)?,
      choice: row.get(2)?,
      voter_kind: row.get(3)?,
      voter_id: row.get(4)?,
      created_at: row.get(5)?,
      synced: row.get(6)?,
    })
  }

  fn into_vote(self) -> Result<PendingVote> {
    let choice: Choice = self.choice.parse().map_err(|e| eyre!("Vote {}: {}", self.id, e))?;
    let voter = Voter::from_parts(&self.voter_kind, self.voter_id)
      .ok_or_else(|| eyre!("Vote {}: unknown voter kind '{}'", self.id, self.voter_kind))?;

    Ok(PendingVote {
      created_at: parse_ts(&self.created_at)?,
      id: self.id,
      poll_id: self.poll_id,
      choice,
      voter,
      synced: self.synced,
    })
  }
}

fn read_setting(conn: &Connection, key: SettingKey) -> Result<Option<SettingValue>> {
  let raw: Option<String> = conn
    .query_row(
      "SELECT value FROM settings WHERE key = ?",
      params![key.as_str()],
      |row| row.get(0),
    )
    .optional()
    .map_err(|e| eyre!("Failed to read setting {}: {}", key.as_str(), e))?;

  raw
    .map(|r| {
      serde_json::from_str(&r)
        .map_err(|e| eyre!("Failed to parse setting {}: {}", key.as_str(), e))
    })
    .transpose()
}

fn write_setting(conn: &Connection, key: SettingKey, value: &SettingValue) -> Result<()> {
  let raw =
    serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize setting: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
      params![key.as_str(), raw],
    )
    .map_err(|e| eyre!("Failed to write setting {}: {}", key.as_str(), e))?;

  Ok(())
}

fn count(conn: &Connection, sql: &str) -> Result<usize> {
  let n: i64 = conn
    .query_row(sql, [], |row| row.get(0))
    .map_err(|e| eyre!("Failed to count records: {}", e))?;
  Ok(n.max(0) as usize)
}

fn decode_json<T: serde::de::DeserializeOwned>(data: &[u8], what: &str) -> Result<T> {
  serde_json::from_slice(data).map_err(|e| eyre!("Failed to deserialize {}: {}", what, e))
}

/// RFC 3339 in UTC with fixed nanosecond precision, so text order is time order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::types::{DraftImage, DraftOption, PollOption, VoteCounts};

  fn poll(id: &str, cached_at: DateTime<Utc>) -> CachedPoll {
    CachedPoll {
      id: id.to_string(),
      title: format!("Poll {}", id),
      description: None,
      option_a: PollOption {
        label: "Cats".to_string(),
        image_url: None,
      },
      option_b: PollOption {
        label: "Dogs".to_string(),
        image_url: None,
      },
      creator_id: Some("creator".to_string()),
      created_at: cached_at,
      expires_at: None,
      is_public: true,
      counts: VoteCounts::default(),
      user_vote: None,
      cached_at,
    }
  }

  fn user(id: &str) -> Voter {
    Voter::User(id.to_string())
  }

  #[test]
  fn test_poll_roundtrip_and_missing() {
    let store = LocalStore::open_in_memory().unwrap();
    let p = poll("p1", Utc::now());
    store.put_poll(&p).unwrap();

    assert_eq!(store.get_poll("p1").unwrap(), Some(p));
    assert_eq!(store.get_poll("nope").unwrap(), None);
  }

  #[test]
  fn test_list_polls_most_recent_first_with_limit() {
    let store = LocalStore::open_in_memory().unwrap();
    let now = Utc::now();
    store.put_poll(&poll("old", now - Duration::hours(2))).unwrap();
    store.put_poll(&poll("new", now)).unwrap();
    store.put_poll(&poll("mid", now - Duration::hours(1))).unwrap();

    let ids: Vec<String> = store.list_polls(2).unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["new", "mid"]);
  }

  #[test]
  fn test_update_vote_counts() {
    let store = LocalStore::open_in_memory().unwrap();
    store.put_poll(&poll("p1", Utc::now())).unwrap();

    assert!(store.update_poll_vote_counts("p1", 3, 4, 7).unwrap());
    assert_eq!(
      store.get_poll("p1").unwrap().unwrap().counts,
      VoteCounts {
        option_a: 3,
        option_b: 4,
        total: 7
      }
    );

    // Not cached: no-op
    assert!(!store.update_poll_vote_counts("missing", 1, 1, 2).unwrap());
    assert!(store.get_poll("missing").unwrap().is_none());
  }

  #[test]
  fn test_mark_vote_synced_is_idempotent() {
    let store = LocalStore::open_in_memory().unwrap();
    let vote = PendingVote::new("p1", Choice::OptionA, user("u1"));
    store.put_vote(&vote).unwrap();

    assert!(store.mark_vote_synced(&vote.id).unwrap());
    assert!(!store.mark_vote_synced(&vote.id).unwrap());
    assert!(!store.mark_vote_synced("does-not-exist").unwrap());

    let votes = store.list_votes(None).unwrap();
    assert_eq!(votes.len(), 1);
    assert!(votes[0].synced);
    assert!(store.list_unsynced_votes().unwrap().is_empty());
  }

  #[test]
  fn test_second_unsynced_vote_replaces_first() {
    let store = LocalStore::open_in_memory().unwrap();
    let first = PendingVote::new("p1", Choice::OptionA, user("u1"));
    let second = PendingVote::new("p1", Choice::OptionB, user("u1"));
    store.put_vote(&first).unwrap();
    store.put_vote(&second).unwrap();

    let unsynced = store.list_unsynced_votes().unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].id, second.id);
    assert_eq!(unsynced[0].choice, Choice::OptionB);
    assert!(store.get_vote(&first.id).unwrap().is_none());
  }

  #[test]
  fn test_synced_vote_is_not_replaced() {
    let store = LocalStore::open_in_memory().unwrap();
    let first = PendingVote::new("p1", Choice::OptionA, user("u1"));
    store.put_vote(&first).unwrap();
    store.mark_vote_synced(&first.id).unwrap();

    let second = PendingVote::new("p1", Choice::OptionB, user("u1"));
    store.put_vote(&second).unwrap();

    assert_eq!(store.list_votes(Some("p1")).unwrap().len(), 2);
    assert_eq!(store.list_unsynced_votes().unwrap().len(), 1);
  }

  #[test]
  fn test_votes_from_different_voters_coexist() {
    let store = LocalStore::open_in_memory().unwrap();
    store
      .put_vote(&PendingVote::new("p1", Choice::OptionA, user("u1")))
      .unwrap();
    store
      .put_vote(&PendingVote::new(
        "p1",
        Choice::OptionA,
        Voter::Device("u1".to_string()),
      ))
      .unwrap();
    store
      .put_vote(&PendingVote::new("p2", Choice::OptionB, user("u1")))
      .unwrap();

    assert_eq!(store.list_votes(Some("p1")).unwrap().len(), 2);
    assert_eq!(store.count_unsynced_votes().unwrap(), 3);
  }

  #[test]
  fn test_cleanup_never_touches_pending_data() {
    let store = LocalStore::open_in_memory().unwrap();
    let long_ago = Utc::now() - Duration::days(400);
    store.put_poll(&poll("p1", long_ago)).unwrap();
    store.put_poll(&poll("p2", Utc::now())).unwrap();

    let mut vote = PendingVote::new("p1", Choice::OptionA, user("u1"));
    vote.created_at = long_ago;
    store.put_vote(&vote).unwrap();

    let mut draft = PendingDraft::new("Old draft", DraftOption::text("a"), DraftOption::text("b"));
    draft.created_at = long_ago;
    store.put_draft(&draft).unwrap();

    assert_eq!(store.cleanup_older_than(Duration::zero()).unwrap(), 2);
    assert!(store.list_polls(10).unwrap().is_empty());
    assert_eq!(store.list_unsynced_votes().unwrap(), vec![vote]);
    assert_eq!(store.list_drafts().unwrap(), vec![draft]);
  }

  #[test]
  fn test_cleanup_keeps_recent_polls() {
    let store = LocalStore::open_in_memory().unwrap();
    store
      .put_poll(&poll("old", Utc::now() - Duration::days(10)))
      .unwrap();
    store.put_poll(&poll("new", Utc::now())).unwrap();

    assert_eq!(store.cleanup_older_than(Duration::days(7)).unwrap(), 1);
    assert!(store.get_poll("new").unwrap().is_some());
  }

  #[test]
  fn test_cleanup_with_huge_max_age_removes_nothing() {
    let store = LocalStore::open_in_memory().unwrap();
    store
      .put_poll(&poll("old", Utc::now() - Duration::days(400)))
      .unwrap();

    assert_eq!(
      store
        .cleanup_older_than(Duration::days(200_000_000))
        .unwrap(),
      0
    );
    assert!(store.get_poll("old").unwrap().is_some());
  }

  #[test]
  fn test_draft_lifecycle() {
    let store = LocalStore::open_in_memory().unwrap();
    let mut draft = PendingDraft::new(
      "Lunch?",
      DraftOption::text("Pizza"),
      DraftOption::text("Sushi"),
    );
    draft.option_a.image = Some(DraftImage::Pending {
      data: vec![1, 2, 3],
      content_type: "image/jpeg".to_string(),
    });
    store.put_draft(&draft).unwrap();

    assert_eq!(store.get_draft(&draft.id).unwrap(), Some(draft.clone()));
    assert_eq!(store.list_unsynced_drafts().unwrap().len(), 1);
    assert_eq!(store.count_unsynced_drafts().unwrap(), 1);

    assert!(store.delete_draft(&draft.id).unwrap());
    assert!(!store.delete_draft(&draft.id).unwrap());
    assert!(store.list_drafts().unwrap().is_empty());
  }

  #[test]
  fn test_settings_are_typed() {
    let store = LocalStore::open_in_memory().unwrap();
    assert_eq!(store.get_setting(SettingKey::LastSync).unwrap(), None);

    let now = Utc::now();
    store
      .set_setting(SettingKey::LastSync, &SettingValue::Timestamp(now))
      .unwrap();

    let value = store.get_setting(SettingKey::LastSync).unwrap().unwrap();
    assert_eq!(value.as_timestamp(), Some(now));
    assert_eq!(value.as_text(), None);
  }

  #[test]
  fn test_device_id_is_stable() {
    let store = LocalStore::open_in_memory().unwrap();
    let id = store.device_id().unwrap();
    assert_eq!(store.device_id().unwrap(), id);
  }

  #[test]
  fn test_bulk_queue_operations() {
    let store = LocalStore::open_in_memory().unwrap();
    store
      .put_vote(&PendingVote::new("p1", Choice::OptionA, user("u1")))
      .unwrap();
    store
      .put_vote(&PendingVote::new("p2", Choice::OptionB, user("u1")))
      .unwrap();
    store
      .put_draft(&PendingDraft::new("d", DraftOption::text("a"), DraftOption::text("b")))
      .unwrap();

    assert_eq!(store.mark_all_votes_synced().unwrap(), 2);
    assert_eq!(store.delete_unsynced_drafts().unwrap(), 1);
    assert_eq!(store.count_unsynced_votes().unwrap(), 0);
    assert_eq!(store.list_votes(None).unwrap().len(), 2);
  }

  #[test]
  fn test_clear_all() {
    let store = LocalStore::open_in_memory().unwrap();
    store.put_poll(&poll("p1", Utc::now())).unwrap();
    store
      .put_vote(&PendingVote::new("p1", Choice::OptionA, user("u1")))
      .unwrap();
    store
      .set_setting(SettingKey::LastSync, &SettingValue::Timestamp(Utc::now()))
      .unwrap();

    store.clear_all().unwrap();

    assert!(store.list_polls(10).unwrap().is_empty());
    assert!(store.list_votes(None).unwrap().is_empty());
    assert!(store.get_setting(SettingKey::LastSync).unwrap().is_none());
  }

  #[test]
  fn test_estimate_usage() {
    let store = LocalStore::open_in_memory().unwrap();
    let usage = store.estimate_usage();
    assert!(usage.used_bytes > 0);
    assert_eq!(usage.quota_bytes, 0);
    assert_eq!(usage.percent, 0.0);

    let store = store.with_quota(usage.used_bytes * 4);
    let usage = store.estimate_usage();
    assert!(usage.percent > 0.0 && usage.percent <= 100.0);
  }

  #[test]
  fn test_vote_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let vote = PendingVote::new("p1", Choice::OptionB, Voter::Device("d1".to_string()));
    {
      let store = LocalStore::open(&path).unwrap();
      store.put_vote(&vote).unwrap();
    }

    let store = LocalStore::open(&path).unwrap();
    assert_eq!(store.list_unsynced_votes().unwrap(), vec![vote]);
  }

  #[test]
  fn test_open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    let first = LocalStore::open(&path).unwrap();
    let second = LocalStore::open(&path).unwrap();
    first.put_poll(&poll("p1", Utc::now())).unwrap();
    assert!(second.get_poll("p1").unwrap().is_some());
  }

  #[test]
  fn test_newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    {
      let conn = Connection::open(&path).unwrap();
      conn
        .pragma_update(None, "user_version", SCHEMA_VERSION + 1)
        .unwrap();
    }

    assert!(LocalStore::open(&path).is_err());
  }

  #[test]
  fn test_negative_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    {
      let conn = Connection::open(&path).unwrap();
      conn.pragma_update(None, "user_version", -1).unwrap();
    }

    let err = LocalStore::open(&path).err().unwrap();
    assert!(err.to_string().contains("invalid"));
  }
}
