//! Expiring key/value cache for SeedVault.
//!
//! This module provides a trait-based interface over an injected persistent
//! key/value store and a generic TTL layer on top of it. The cache is
//! best-effort: callers treat a failed cache read as a miss and fall
//! through to the network.

pub mod sqlite;
pub mod store;
pub mod ttl;

pub use sqlite::SqliteStore;
pub use store::{KvStore, MemoryStore};
pub use ttl::{CacheEntry, TtlCache, TTL_NEVER};
