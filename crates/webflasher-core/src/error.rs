//! Error types for the installer flow

use thiserror::Error;

/// Errors raised by the serial transport seam.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The user dismissed the port-selection prompt without picking a port.
    ///
    /// This is informational, not a failure; callers must keep it
    /// distinguishable from real transport errors.
    #[error("port selection was cancelled")]
    SelectionCancelled,

    /// The platform serial API is not available in this context.
    #[error("serial transport unavailable: {0}")]
    Unavailable(String),

    /// The port could not be opened or accessed.
    #[error("serial port error: {0}")]
    Io(String),
}

/// Errors raised by the external flashing capability.
#[derive(Debug, Error)]
pub enum FlashError {
    /// Connect/handshake with the bootloader failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The identity probe failed. Callers degrade to placeholder values.
    #[error("identity probe failed: {0}")]
    Probe(String),

    /// Flash erase failed.
    #[error("erase failed: {0}")]
    Erase(String),

    /// Writing the image failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Closing the session failed.
    #[error("disconnect failed: {0}")]
    Disconnect(String),
}

/// Errors raised while fetching bytes over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the connection broke.
    #[error("request failed: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server returned status {0}")]
    Status(u16),

    /// The response succeeded but carried no bytes.
    #[error("response body was empty")]
    EmptyBody,
}

/// Top-level errors surfaced by the installer flow.
///
/// A declined port prompt is deliberately NOT represented here - it is
/// informational, reported through the flow's connect outcome instead.
#[derive(Debug, Error)]
pub enum FlowError {
    /// No valid cache entry and no successful fetch produced a usable
    /// manifest. Recoverable through the local upload path.
    #[error("firmware manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// Every download candidate failed. Carries the last observed error;
    /// recoverable through the local upload path.
    #[error("firmware download failed: {0}")]
    FirmwareDownloadFailed(String),

    /// A local file whose name does not end in the firmware extension.
    #[error("{filename} is not a firmware image (expected a .bin file)")]
    InvalidFirmwareFile {
        /// Name of the rejected file.
        filename: String,
    },

    /// An operation was requested in a state that does not allow it.
    /// Indicates a caller defect; unreachable under correct UI wiring.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// Name of the state the flow was in.
        state: &'static str,
    },

    /// The flashing capability raised during connect, erase, or write.
    /// Terminal for the current attempt; recoverable by restart.
    #[error("flashing failed: {0}")]
    FlashingFailed(#[from] FlashError),
}

/// Result type alias using [`FlowError`].
pub type Result<T> = core::result::Result<T, FlowError>;

/// Shorten a diagnostic for the status line.
///
/// The full text belongs in the log; the UI shows at most `max_chars`
/// characters with a trailing ellipsis when truncated.
pub fn truncate_for_status(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let cut: String = message.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}
