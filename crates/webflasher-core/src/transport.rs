//! Serial transport seam
//!
//! The flow never opens ports itself; it asks the platform for a
//! user-selected port handle and passes that handle to the flashing
//! capability. Declination of the picker prompt is informational and must
//! stay distinguishable from real transport failures.

use maybe_async::maybe_async;

use crate::error::TransportError;

/// Asks the user to select a serial port.
#[maybe_async(AFIT)]
pub trait SerialPicker {
    /// Handle to a user-granted serial port.
    type Port;

    /// Show the platform port-selection prompt.
    ///
    /// Returns [`TransportError::SelectionCancelled`] when the user
    /// dismisses the prompt; any other error is a real failure. The prompt
    /// itself has no timeout - the returned future may stay pending until
    /// the user reacts.
    async fn request_port(&mut self) -> Result<Self::Port, TransportError>;
}
