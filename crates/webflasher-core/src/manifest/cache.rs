//! Manifest cache envelope and storage seam
//!
//! The resolver persists the last fetched manifest under one fixed key in
//! a string key-value store (localStorage in the browser). Entries older
//! than the TTL are treated as absent and purged on read.

use serde::{Deserialize, Serialize};

use super::models::Manifest;

/// Storage key for the cached manifest envelope.
pub const CACHE_KEY: &str = "webflasher.manifest";

/// Cache entry lifetime in milliseconds (one hour).
pub const CACHE_TTL_MS: u64 = 3_600_000;

/// String key-value store, shaped after the browser's localStorage.
///
/// Implementations are free to drop writes (quota, private browsing); the
/// resolver treats the cache as best-effort and falls back to the network.
pub trait CacheStore {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, overwriting any prior value.
    fn set(&mut self, key: &str, value: &str);

    /// Remove the value stored under `key`, if any.
    fn remove(&mut self, key: &str);
}

/// Source of the current time in epoch milliseconds.
///
/// Injectable so that TTL behaviour is testable without waiting.
pub trait Clock {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// The persisted envelope: a manifest plus the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached manifest.
    pub data: Manifest,
    /// Store time, epoch milliseconds.
    pub timestamp: u64,
}

impl CacheEntry {
    /// Whether this entry is still within the TTL at `now_ms`.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) <= CACHE_TTL_MS
    }
}

/// Decode a stored envelope.
///
/// Returns `None` for malformed JSON or an envelope whose manifest lists
/// no assets; callers purge such entries and fall through to fetch.
pub fn decode_entry(raw: &str) -> Option<CacheEntry> {
    let entry: CacheEntry = serde_json::from_str(raw).ok()?;
    if entry.data.assets.is_empty() {
        return None;
    }
    Some(entry)
}
