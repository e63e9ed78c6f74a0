//! Cache-or-fetch manifest loading

use maybe_async::maybe_async;

use super::cache::{decode_entry, CacheEntry, CacheStore, Clock, CACHE_KEY};
use super::models::Manifest;
use crate::error::FlowError;
use crate::fetch::ByteFetcher;

/// Manifest location, relative to the deployment root.
pub const MANIFEST_URL: &str = "manifest.json";

/// Loads the firmware catalog from cache or network.
///
/// A fresh cache entry short-circuits the network entirely. A corrupt or
/// expired entry is purged and treated as a miss. Network failure is not
/// retried; recovery is the local upload path.
pub struct ManifestResolver<S: CacheStore, C: Clock> {
    store: S,
    clock: C,
}

impl<S: CacheStore, C: Clock> ManifestResolver<S, C> {
    /// Create a resolver over the given store and clock.
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Load the manifest, preferring a fresh cache entry.
    ///
    /// Fails with [`FlowError::ManifestUnavailable`] when neither the cache
    /// nor a fetch produces a manifest with at least one asset.
    #[maybe_async]
    pub async fn load<B: ByteFetcher>(&mut self, fetcher: &mut B) -> Result<Manifest, FlowError> {
        let now = self.clock.now_ms();

        if let Some(raw) = self.store.get(CACHE_KEY) {
            match decode_entry(&raw) {
                Some(entry) if entry.is_fresh(now) => {
                    log::debug!("manifest: using cached catalog {}", entry.data.tag_name);
                    return Ok(entry.data);
                }
                Some(_) => {
                    log::debug!("manifest: cache entry expired, refetching");
                    self.store.remove(CACHE_KEY);
                }
                None => {
                    log::warn!("manifest: purging corrupt cache entry");
                    self.store.remove(CACHE_KEY);
                }
            }
        }

        log::info!("manifest: fetching {}", MANIFEST_URL);
        let body = fetcher
            .fetch(MANIFEST_URL)
            .await
            .map_err(|e| FlowError::ManifestUnavailable(e.to_string()))?;

        let manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| FlowError::ManifestUnavailable(format!("malformed manifest: {}", e)))?;

        if manifest.assets.is_empty() {
            return Err(FlowError::ManifestUnavailable(
                "manifest lists no firmware builds".to_string(),
            ));
        }

        let entry = CacheEntry {
            data: manifest.clone(),
            timestamp: now,
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => self.store.set(CACHE_KEY, &raw),
            // A cache that cannot be written only costs a refetch later.
            Err(e) => log::warn!("manifest: failed to encode cache entry: {}", e),
        }

        log::info!(
            "manifest: loaded {} with {} assets",
            manifest.tag_name,
            manifest.assets.len()
        );
        Ok(manifest)
    }
}
