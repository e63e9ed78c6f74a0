//! Band-mapped progress reporting
//!
//! The overall percentage is split into reserved bands: acquisition ends
//! at 50, the device write maps into 50-95, and 100 is reported only once
//! the session is closed. Reported values never decrease.

use crate::flasher::FlashProgress;

/// Pipeline phase, reported alongside percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    /// Obtaining the image bytes (download or resident local file).
    Acquiring,
    /// Erasing flash ahead of the write.
    Erasing,
    /// Writing the image.
    Writing,
    /// Write confirmed; closing the session.
    Finishing,
}

/// Receives flow progress. Implemented by the UI.
pub trait FlowProgress {
    /// The flow entered a new phase.
    fn phase(&mut self, phase: FlowPhase);

    /// Overall percentage, monotonically non-decreasing, 0-100.
    fn percent(&mut self, percent: u8);
}

/// A no-op progress reporter.
pub struct NoProgress;

impl FlowProgress for NoProgress {
    fn phase(&mut self, _phase: FlowPhase) {}
    fn percent(&mut self, _percent: u8) {}
}

/// Acquisition finishes at this percentage.
pub(crate) const ACQUIRE_BAND_END: u8 = 50;
/// The device write is mapped into this band.
pub(crate) const WRITE_BAND_START: u8 = 50;
pub(crate) const WRITE_BAND_END: u8 = 95;

/// Drops duplicate and regressing percentages before they reach the UI.
pub(crate) struct Monotonic<'a, P: FlowProgress> {
    inner: &'a mut P,
    last: u8,
}

impl<'a, P: FlowProgress> Monotonic<'a, P> {
    pub(crate) fn new(inner: &'a mut P) -> Self {
        Self { inner, last: 0 }
    }

    pub(crate) fn phase(&mut self, phase: FlowPhase) {
        self.inner.phase(phase);
    }

    pub(crate) fn percent(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.last {
            self.last = percent;
            self.inner.percent(percent);
        }
    }
}

/// Map write byte progress into the reserved band.
pub(crate) fn write_band_percent(bytes_written: usize, total_bytes: usize) -> u8 {
    if total_bytes == 0 {
        return WRITE_BAND_END;
    }
    let span = (WRITE_BAND_END - WRITE_BAND_START) as u64;
    let done = bytes_written.min(total_bytes) as u64;
    WRITE_BAND_START + ((done * span) / total_bytes as u64) as u8
}

/// Adapts the flasher's byte callback onto the band reporter.
pub(crate) struct WriteBand<'m, 'a, P: FlowProgress> {
    reporter: &'m mut Monotonic<'a, P>,
}

impl<'m, 'a, P: FlowProgress> WriteBand<'m, 'a, P> {
    pub(crate) fn new(reporter: &'m mut Monotonic<'a, P>) -> Self {
        Self { reporter }
    }
}

impl<P: FlowProgress> FlashProgress for WriteBand<'_, '_, P> {
    fn written(&mut self, bytes_written: usize, total_bytes: usize) {
        self.reporter.percent(write_band_percent(bytes_written, total_bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<u8>);

    impl FlowProgress for Recorder {
        fn phase(&mut self, _phase: FlowPhase) {}
        fn percent(&mut self, percent: u8) {
            self.0.push(percent);
        }
    }

    #[test]
    fn test_write_band_endpoints() {
        assert_eq!(write_band_percent(0, 1024), WRITE_BAND_START);
        assert_eq!(write_band_percent(1024, 1024), WRITE_BAND_END);
        assert_eq!(write_band_percent(512, 1024), 72);
    }

    #[test]
    fn test_write_band_clamps_overshoot() {
        assert_eq!(write_band_percent(4096, 1024), WRITE_BAND_END);
        assert_eq!(write_band_percent(10, 0), WRITE_BAND_END);
    }

    #[test]
    fn test_monotonic_drops_regressions() {
        let mut recorder = Recorder(Vec::new());
        let mut reporter = Monotonic::new(&mut recorder);
        reporter.percent(10);
        reporter.percent(5);
        reporter.percent(10);
        reporter.percent(60);
        reporter.percent(200);
        assert_eq!(recorder.0, [10, 60, 100]);
    }
}
