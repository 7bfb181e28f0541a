//! Offline-first data layer for a polling app.
//!
//! - [`store`] keeps cached polls, pending votes, pending drafts and settings
//!   durable across restarts.
//! - [`sync`] drains pending writes to the backend, resolves duplicate-vote
//!   conflicts and refreshes the cache.
//! - [`network`] tracks connectivity and notifies on transitions.
//! - [`remote`] is the backend boundary.

pub mod config;
pub mod network;
pub mod remote;
pub mod store;
pub mod sync;
