//! External flashing capability seam
//!
//! The serial bootloader protocol (handshake, erase/write framing,
//! compression, chip autodetection) lives outside this repository. The
//! flow only drives it through this narrow trait.

use maybe_async::maybe_async;

use crate::error::FlashError;

/// Baud rate used when opening the serial connection.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Flash destination offset. The manifest distributes merged images that
/// already contain bootloader and partition table, so images start at 0.
pub const FLASH_OFFSET: u32 = 0x0;

/// Identity of the connected chip, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipIdentity {
    /// Chip family name, e.g. `ESP32-C3`.
    pub chip: String,
    /// Factory MAC address, when the capability exposes one.
    pub mac: Option<String>,
}

impl ChipIdentity {
    /// Placeholder identity used when the probe fails.
    pub fn unknown() -> Self {
        Self {
            chip: "unknown".to_string(),
            mac: None,
        }
    }
}

/// Options for a write operation.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Destination offset in flash.
    pub offset: u32,
    /// Ask the capability to compress transfer frames when supported.
    pub compress: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            offset: FLASH_OFFSET,
            compress: true,
        }
    }
}

/// Byte-level progress callback for a write operation.
pub trait FlashProgress {
    /// Called as image bytes are committed to flash.
    fn written(&mut self, bytes_written: usize, total_bytes: usize);
}

/// A no-op progress reporter.
pub struct NoFlashProgress;

impl FlashProgress for NoFlashProgress {
    fn written(&mut self, _bytes_written: usize, _total_bytes: usize) {}
}

/// The external flashing capability.
///
/// One session is one open connection to a device. Sessions are consumed
/// by [`Flasher::disconnect`]; the flow guarantees exactly one disconnect
/// per session on every exit path.
#[maybe_async(AFIT)]
pub trait Flasher {
    /// Serial port handle accepted by [`Flasher::connect`].
    type Port;
    /// One open connection to a device.
    type Session;

    /// Open the port at `baud` and perform the bootloader handshake.
    async fn connect(&mut self, port: Self::Port, baud: u32)
        -> Result<Self::Session, FlashError>;

    /// Best-effort identity probe. Callers treat failure as non-fatal.
    async fn chip_identity(
        &mut self,
        session: &mut Self::Session,
    ) -> Result<ChipIdentity, FlashError>;

    /// Erase the flash ahead of a write.
    async fn erase_flash(&mut self, session: &mut Self::Session) -> Result<(), FlashError>;

    /// Write `image` at `options.offset`, reporting byte progress.
    async fn write_image<P: FlashProgress>(
        &mut self,
        session: &mut Self::Session,
        image: &[u8],
        options: &WriteOptions,
        progress: &mut P,
    ) -> Result<(), FlashError>;

    /// Close the session and release the underlying port.
    async fn disconnect(&mut self, session: Self::Session) -> Result<(), FlashError>;
}
