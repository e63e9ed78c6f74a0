//! Manifest data models
//!
//! Types describing the firmware catalog and the source bound to one
//! flash attempt.

use serde::{Deserialize, Serialize};

/// Filename extension accepted for firmware images.
pub const FIRMWARE_EXTENSION: &str = ".bin";

/// The firmware catalog, one release worth of builds.
///
/// Asset order is preserved as parsed; it defines presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Release tag, e.g. `v2.4.1`.
    pub tag_name: String,
    /// Publication timestamp, ISO-8601.
    pub published_at: String,
    /// Selectable firmware builds. A manifest with no assets is unusable.
    #[serde(default)]
    pub assets: Vec<FirmwareAsset>,
}

/// One firmware build entry within a manifest. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareAsset {
    /// Board identifier, e.g. `esp32-c3-mini`.
    pub board: String,
    /// Human-readable name shown in the selector.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Image filename within the release.
    pub filename: String,
    /// Absolute HTTPS download location.
    pub url: String,
}

impl FirmwareAsset {
    /// Label shown in the selection control.
    ///
    /// Falls back to the board identifier when no display name is present.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.board,
        }
    }
}

/// The firmware source bound to one flash attempt.
///
/// Exactly one source is active at a time; the flow owns it for the
/// duration of the attempt and discards it on cancel or restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareSource {
    /// A manifest entry whose bytes still need to be downloaded.
    Release(FirmwareAsset),
    /// A user-uploaded image whose bytes are already resident.
    Local {
        /// Name of the uploaded file.
        filename: String,
        /// Raw image bytes.
        data: Vec<u8>,
    },
}

impl FirmwareSource {
    /// Label for status messages.
    pub fn label(&self) -> &str {
        match self {
            FirmwareSource::Release(asset) => asset.label(),
            FirmwareSource::Local { filename, .. } => filename,
        }
    }

    /// Whether the bytes are already resident (no network acquisition).
    pub fn is_local(&self) -> bool {
        matches!(self, FirmwareSource::Local { .. })
    }
}

/// Whether a filename is acceptable as a local firmware image.
pub fn is_firmware_filename(name: &str) -> bool {
    name.ends_with(FIRMWARE_EXTENSION)
}
