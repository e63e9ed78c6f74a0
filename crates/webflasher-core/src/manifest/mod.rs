//! Firmware manifest handling
//!
//! Loads the firmware catalog from cache or network, validates it, and
//! exposes the selectable entries with their display metadata.

mod cache;
mod models;
mod resolver;

pub use cache::{decode_entry, CacheEntry, CacheStore, Clock, CACHE_KEY, CACHE_TTL_MS};
pub use models::{is_firmware_filename, FirmwareAsset, FirmwareSource, Manifest, FIRMWARE_EXTENSION};
pub use resolver::{ManifestResolver, MANIFEST_URL};
