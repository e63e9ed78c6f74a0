//! Browser implementations of the fetch, cache, and clock seams

use maybe_async::maybe_async;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use webflasher_core::error::FetchError;
use webflasher_core::fetch::ByteFetcher;
use webflasher_core::manifest::{CacheStore, Clock};

/// Byte fetcher over the browser's fetch API.
pub struct BrowserFetcher;

#[maybe_async(AFIT)]
impl ByteFetcher for BrowserFetcher {
    async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let window =
            web_sys::window().ok_or_else(|| FetchError::Network("no window".to_string()))?;

        let response = JsFuture::from(window.fetch_with_str(url))
            .await
            .map_err(|e| FetchError::Network(format!("{:?}", e)))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|_| FetchError::Network("fetch did not yield a Response".to_string()))?;

        if !response.ok() {
            return Err(FetchError::Status(response.status()));
        }

        let buffer = response
            .array_buffer()
            .map_err(|e| FetchError::Network(format!("{:?}", e)))?;
        let buffer = JsFuture::from(buffer)
            .await
            .map_err(|e| FetchError::Network(format!("{:?}", e)))?;

        Ok(js_sys::Uint8Array::new(&buffer).to_vec())
    }
}

/// Cache store over `window.localStorage`.
///
/// Private browsing modes can deny storage entirely; reads then miss and
/// writes are dropped with a log line, which the resolver tolerates.
pub struct LocalStorageStore {
    storage: Option<web_sys::Storage>,
}

impl LocalStorageStore {
    /// Bind to localStorage, if the browser grants it.
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten());
        if storage.is_none() {
            log::warn!("storage: localStorage unavailable, manifest cache disabled");
        }
        Self { storage }
    }
}

impl Default for LocalStorageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.as_ref()?.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.set_item(key, value) {
                log::warn!("storage: write failed: {:?}", e);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.remove_item(key) {
                log::warn!("storage: remove failed: {:?}", e);
            }
        }
    }
}

/// Clock over `Date.now()`.
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}
