//! Wizard state for the installer flow

use core::fmt;

/// The state driving the installer panels.
///
/// One linear path: `Idle` through `PortRequested` and `DeviceInfoShown`
/// into `Flashing`, ending in `Completed` or `Failed`. Cancel is only
/// legal from `DeviceInfoShown` and returns to `Idle`; restart is only
/// legal from a terminal state and also returns to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    /// Ready: firmware can be selected and a connection started.
    Idle,
    /// Waiting for the user to grant a serial port.
    PortRequested,
    /// Connected; showing device identity and awaiting confirmation.
    DeviceInfoShown,
    /// Acquisition and write pipeline running. Not cancellable.
    Flashing,
    /// Image written and session closed.
    Completed,
    /// The attempt failed; the message feeds the status line.
    Failed(String),
}

impl FlowState {
    /// Short name used in sequencing-error diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::PortRequested => "requesting a port",
            FlowState::DeviceInfoShown => "awaiting confirmation",
            FlowState::Flashing => "flashing",
            FlowState::Completed => "completed",
            FlowState::Failed(_) => "failed",
        }
    }

    /// Whether this is a terminal state (restart is the only way out).
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Completed | FlowState::Failed(_))
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
