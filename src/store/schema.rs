//! Schema migrations for the local store.
//!
//! `MIGRATIONS[n]` moves a database from `user_version = n` to `n + 1`.

pub const MIGRATIONS: &[&str] = &[V1];

/// Current schema version.
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

const V1: &str = r#"
-- Poll snapshots for offline viewing (serialized JSON)
CREATE TABLE IF NOT EXISTS cached_polls (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cached_polls_cached_at ON cached_polls(cached_at);
CREATE INDEX IF NOT EXISTS idx_cached_polls_created_at ON cached_polls(created_at);

-- Votes cast locally
CREATE TABLE IF NOT EXISTS pending_votes (
    id TEXT PRIMARY KEY,
    poll_id TEXT NOT NULL,
    choice TEXT NOT NULL CHECK (choice IN ('option_a', 'option_b')),
    voter_kind TEXT NOT NULL CHECK (voter_kind IN ('user', 'device')),
    voter_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_votes_poll ON pending_votes(poll_id);
CREATE INDEX IF NOT EXISTS idx_pending_votes_synced ON pending_votes(synced);

-- At most one unsynced vote per (poll, voter)
CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_votes_unsynced_voter
    ON pending_votes(poll_id, voter_kind, voter_id) WHERE synced = 0;

-- Polls composed locally (serialized JSON)
CREATE TABLE IF NOT EXISTS pending_drafts (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_drafts_synced ON pending_drafts(synced);
CREATE INDEX IF NOT EXISTS idx_pending_drafts_created ON pending_drafts(created_at);

-- Engine bookkeeping
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
