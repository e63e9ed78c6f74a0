//! The installer flow
//!
//! One [`FlashFlow`] owns everything a single attempt needs: the bound
//! firmware source, the open device session, and the probed identity. The
//! UI drives it through a handful of transition methods and renders from
//! its [`FlowState`]; it never touches the transport or flashing seams
//! directly.

mod progress;
mod state;

pub use progress::{FlowPhase, FlowProgress, NoProgress};
pub use state::FlowState;

use maybe_async::maybe_async;

use crate::error::{FlashError, FlowError, TransportError};
use crate::fetch::{self, ByteFetcher};
use crate::flasher::{ChipIdentity, Flasher, WriteOptions, DEFAULT_BAUD};
use crate::manifest::{is_firmware_filename, FirmwareAsset, FirmwareSource};
use crate::transport::SerialPicker;

use progress::{Monotonic, WriteBand, ACQUIRE_BAND_END, WRITE_BAND_END};

/// Result of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A session is open; identity is shown for confirmation.
    Connected(ChipIdentity),
    /// The user dismissed the port prompt. Informational, not a failure;
    /// the flow is back in the ready state.
    Declined,
}

/// Orchestrates one firmware installation attempt.
pub struct FlashFlow<T, F>
where
    T: SerialPicker,
    F: Flasher<Port = T::Port>,
{
    picker: T,
    flasher: F,
    state: FlowState,
    source: Option<FirmwareSource>,
    identity: Option<ChipIdentity>,
    session: Option<F::Session>,
    options: WriteOptions,
}

impl<T, F> FlashFlow<T, F>
where
    T: SerialPicker,
    F: Flasher<Port = T::Port>,
{
    /// Create a flow over the given picker and flashing capability.
    pub fn new(picker: T, flasher: F) -> Self {
        Self {
            picker,
            flasher,
            state: FlowState::Idle,
            source: None,
            identity: None,
            session: None,
            options: WriteOptions::default(),
        }
    }

    /// Override the write options for subsequent attempts.
    pub fn set_write_options(&mut self, options: WriteOptions) {
        self.options = options;
    }

    /// Current wizard state.
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// The firmware source bound to this attempt, if any.
    pub fn selected(&self) -> Option<&FirmwareSource> {
        self.source.as_ref()
    }

    /// Identity probed at connect time, if any.
    pub fn identity(&self) -> Option<&ChipIdentity> {
        self.identity.as_ref()
    }

    /// Bind a manifest entry as the firmware source.
    pub fn select_release(&mut self, asset: FirmwareAsset) -> Result<(), FlowError> {
        if self.state != FlowState::Idle {
            return Err(FlowError::InvalidState {
                operation: "select firmware",
                state: self.state.name(),
            });
        }
        log::debug!("flow: selected {}", asset.label());
        self.source = Some(FirmwareSource::Release(asset));
        Ok(())
    }

    /// Bind a user-uploaded image as the firmware source.
    ///
    /// Rejects filenames without the firmware extension; the rejection is
    /// local and the flow state does not change.
    pub fn select_local(&mut self, filename: &str, data: Vec<u8>) -> Result<(), FlowError> {
        if self.state != FlowState::Idle {
            return Err(FlowError::InvalidState {
                operation: "select firmware",
                state: self.state.name(),
            });
        }
        if !is_firmware_filename(filename) {
            return Err(FlowError::InvalidFirmwareFile {
                filename: filename.to_string(),
            });
        }
        log::debug!("flow: selected local file {} ({} bytes)", filename, data.len());
        self.source = Some(FirmwareSource::Local {
            filename: filename.to_string(),
            data,
        });
        Ok(())
    }

    /// Request a port and connect to the device.
    ///
    /// Requires a bound firmware source. Declination of the port prompt is
    /// not a failure: the flow returns to ready and reports
    /// [`ConnectOutcome::Declined`]. A failed identity probe degrades to
    /// placeholder values and never blocks the transition.
    #[maybe_async]
    pub async fn begin_connect(&mut self) -> Result<ConnectOutcome, FlowError> {
        if self.state != FlowState::Idle {
            return Err(FlowError::InvalidState {
                operation: "connect",
                state: self.state.name(),
            });
        }
        if self.source.is_none() {
            return Err(FlowError::InvalidState {
                operation: "connect without firmware selected",
                state: self.state.name(),
            });
        }

        self.state = FlowState::PortRequested;
        let port = match self.picker.request_port().await {
            Ok(port) => port,
            Err(TransportError::SelectionCancelled) => {
                log::info!("flow: port selection cancelled by the user");
                self.state = FlowState::Idle;
                return Ok(ConnectOutcome::Declined);
            }
            Err(e) => {
                log::error!("flow: port request failed: {}", e);
                self.state = FlowState::Failed(e.to_string());
                return Err(FlashError::Connect(e.to_string()).into());
            }
        };

        let mut session = match self.flasher.connect(port, DEFAULT_BAUD).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("flow: connect failed: {}", e);
                self.state = FlowState::Failed(e.to_string());
                return Err(e.into());
            }
        };

        let identity = match self.flasher.chip_identity(&mut session).await {
            Ok(identity) => identity,
            Err(e) => {
                // Best effort: show placeholders rather than block the flow.
                log::warn!("flow: identity probe failed: {}", e);
                ChipIdentity::unknown()
            }
        };

        self.session = Some(session);
        self.identity = Some(identity.clone());
        self.state = FlowState::DeviceInfoShown;
        log::info!("flow: connected, chip {}", identity.chip);
        Ok(ConnectOutcome::Connected(identity))
    }

    /// Abandon the attempt before flashing.
    ///
    /// Only legal while awaiting confirmation. Closes the session best
    /// effort and returns to the ready state with the selection cleared.
    #[maybe_async]
    pub async fn cancel(&mut self) -> Result<(), FlowError> {
        if self.state != FlowState::DeviceInfoShown {
            return Err(FlowError::InvalidState {
                operation: "cancel",
                state: self.state.name(),
            });
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = self.flasher.disconnect(session).await {
                log::warn!("flow: session close failed during cancel: {}", e);
            }
        }
        self.identity = None;
        self.source = None;
        self.state = FlowState::Idle;
        log::info!("flow: cancelled before flashing");
        Ok(())
    }

    /// Acquire the firmware bytes and write them to the device.
    ///
    /// Requires confirmation state with both a bound source and an open
    /// session. Every path out of here closes the session exactly once; a
    /// close failure is logged and never masks the primary outcome.
    /// Once started, the write is not cancellable.
    #[maybe_async]
    pub async fn confirm_and_flash<B, P>(
        &mut self,
        fetcher: &mut B,
        progress: &mut P,
    ) -> Result<(), FlowError>
    where
        B: ByteFetcher,
        P: FlowProgress,
    {
        if self.state != FlowState::DeviceInfoShown {
            return Err(FlowError::InvalidState {
                operation: "flash",
                state: self.state.name(),
            });
        }
        let Some(source) = self.source.clone() else {
            return Err(FlowError::InvalidState {
                operation: "flash without firmware selected",
                state: self.state.name(),
            });
        };
        if self.session.is_none() {
            return Err(FlowError::InvalidState {
                operation: "flash without a device session",
                state: self.state.name(),
            });
        }

        self.state = FlowState::Flashing;
        let mut reporter = Monotonic::new(progress);
        let result = self.run_pipeline(&source, fetcher, &mut reporter).await;

        // Exactly one close per session, on success and failure alike.
        if let Some(session) = self.session.take() {
            if let Err(e) = self.flasher.disconnect(session).await {
                log::warn!("flow: session close failed: {}", e);
            }
        }

        match result {
            Ok(()) => {
                reporter.percent(100);
                self.state = FlowState::Completed;
                log::info!("flow: flashing completed");
                Ok(())
            }
            Err(e) => {
                log::error!("flow: flashing failed: {}", e);
                self.state = FlowState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Return to the ready state after a terminal outcome.
    ///
    /// Closes any still-open session and clears the bound source.
    #[maybe_async]
    pub async fn restart(&mut self) -> Result<(), FlowError> {
        if !self.state.is_terminal() {
            return Err(FlowError::InvalidState {
                operation: "restart",
                state: self.state.name(),
            });
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = self.flasher.disconnect(session).await {
                log::warn!("flow: session close failed during restart: {}", e);
            }
        }
        self.source = None;
        self.identity = None;
        self.state = FlowState::Idle;
        log::info!("flow: restarted");
        Ok(())
    }

    #[maybe_async]
    async fn run_pipeline<B, P>(
        &mut self,
        source: &FirmwareSource,
        fetcher: &mut B,
        reporter: &mut Monotonic<'_, P>,
    ) -> Result<(), FlowError>
    where
        B: ByteFetcher,
        P: FlowProgress,
    {
        reporter.phase(FlowPhase::Acquiring);
        let image = match source {
            FirmwareSource::Local { filename, data } => {
                log::info!("flow: using local image {} ({} bytes)", filename, data.len());
                data.clone()
            }
            FirmwareSource::Release(asset) => fetch::acquire(fetcher, &asset.url).await?,
        };
        reporter.percent(ACQUIRE_BAND_END);

        let Some(session) = self.session.as_mut() else {
            return Err(FlowError::InvalidState {
                operation: "write without a device session",
                state: self.state.name(),
            });
        };

        reporter.phase(FlowPhase::Erasing);
        self.flasher.erase_flash(session).await?;

        reporter.phase(FlowPhase::Writing);
        let options = self.options;
        let mut band = WriteBand::new(reporter);
        self.flasher
            .write_image(session, &image, &options, &mut band)
            .await?;

        reporter.phase(FlowPhase::Finishing);
        reporter.percent(WRITE_BAND_END);
        Ok(())
    }
}
