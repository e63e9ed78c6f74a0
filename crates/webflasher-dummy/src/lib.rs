//! webflasher-dummy - In-memory doubles for testing the installer flow
//!
//! This crate provides scripted stand-ins for every seam the flow talks
//! to: the port picker, the flashing capability, the byte fetcher, the
//! cache store, and the clock. The flashing double journals every call so
//! tests can assert, for example, that a session is closed exactly once
//! on every exit path.
//!
//! Built in sync mode (`is_sync`), so tests drive the flow with plain
//! function calls.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use webflasher_core::error::{FetchError, FlashError, TransportError};
use webflasher_core::fetch::ByteFetcher;
use webflasher_core::flasher::{ChipIdentity, FlashProgress, Flasher, WriteOptions};
use webflasher_core::flow::{FlowPhase, FlowProgress};
use webflasher_core::manifest::{CacheStore, Clock};

/// Port handle produced by [`DummyPicker`].
#[derive(Debug)]
pub struct DummyPort;

/// Scripted outcome for one port-selection prompt.
#[derive(Debug, Clone)]
pub enum PickOutcome {
    /// The user picks a port.
    Grant,
    /// The user dismisses the prompt.
    Decline,
    /// The platform reports a transport failure.
    Fail(String),
}

/// Serial picker whose prompts play back a script.
///
/// Once the script runs out, every further prompt grants a port.
#[derive(Debug, Default)]
pub struct DummyPicker {
    outcomes: VecDeque<PickOutcome>,
}

impl DummyPicker {
    /// A picker that always grants a port.
    pub fn granting() -> Self {
        Self::default()
    }

    /// A picker that plays back the given outcomes in order.
    pub fn scripted(outcomes: impl IntoIterator<Item = PickOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }
}

impl webflasher_core::transport::SerialPicker for DummyPicker {
    type Port = DummyPort;

    fn request_port(&mut self) -> Result<DummyPort, TransportError> {
        match self.outcomes.pop_front().unwrap_or(PickOutcome::Grant) {
            PickOutcome::Grant => Ok(DummyPort),
            PickOutcome::Decline => Err(TransportError::SelectionCancelled),
            PickOutcome::Fail(msg) => Err(TransportError::Io(msg)),
        }
    }
}

/// Configuration for [`DummyFlasher`].
#[derive(Debug, Clone, Default)]
pub struct DummyConfig {
    /// Identity returned by the probe; `None` makes the probe fail.
    pub identity: Option<ChipIdentity>,
    /// Fail `connect` with this message.
    pub connect_error: Option<String>,
    /// Fail `erase_flash` with this message.
    pub erase_error: Option<String>,
    /// Fail `write_image` with this message.
    pub write_error: Option<String>,
    /// Fail `disconnect` with this message (after counting the attempt).
    pub disconnect_error: Option<String>,
}

/// Everything the flashing double observed.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    /// Successful `connect` calls.
    pub connects: usize,
    /// `chip_identity` calls.
    pub probes: usize,
    /// Successful `erase_flash` calls.
    pub erases: usize,
    /// `disconnect` attempts, counted whether or not they fail.
    pub disconnects: usize,
    /// Written images as `(offset, bytes)` pairs.
    pub written: Vec<(u32, Vec<u8>)>,
}

/// Shared handle onto a [`DummyFlasher`]'s journal.
#[derive(Clone, Default)]
pub struct JournalHandle(Rc<RefCell<Journal>>);

impl JournalHandle {
    /// Snapshot of the journal so far.
    pub fn snapshot(&self) -> Journal {
        self.0.borrow().clone()
    }

    /// Number of disconnect attempts so far.
    pub fn disconnects(&self) -> usize {
        self.0.borrow().disconnects
    }
}

/// Session handle produced by [`DummyFlasher`].
#[derive(Debug)]
pub struct DummySession {
    _private: (),
}

/// Flashing capability double that emulates a device in memory.
pub struct DummyFlasher {
    config: DummyConfig,
    journal: JournalHandle,
}

impl DummyFlasher {
    /// Create a flasher double with the given configuration.
    pub fn new(config: DummyConfig) -> (Self, JournalHandle) {
        let journal = JournalHandle::default();
        (
            Self {
                config,
                journal: journal.clone(),
            },
            journal,
        )
    }

    /// A flasher that succeeds at everything and identifies as an ESP32-C3.
    pub fn well_behaved() -> (Self, JournalHandle) {
        Self::new(DummyConfig {
            identity: Some(ChipIdentity {
                chip: "ESP32-C3".to_string(),
                mac: Some("24:6f:28:00:00:01".to_string()),
            }),
            ..DummyConfig::default()
        })
    }
}

impl Flasher for DummyFlasher {
    type Port = DummyPort;
    type Session = DummySession;

    fn connect(&mut self, _port: DummyPort, _baud: u32) -> Result<DummySession, FlashError> {
        if let Some(msg) = &self.config.connect_error {
            return Err(FlashError::Connect(msg.clone()));
        }
        self.journal.0.borrow_mut().connects += 1;
        Ok(DummySession { _private: () })
    }

    fn chip_identity(&mut self, _session: &mut DummySession) -> Result<ChipIdentity, FlashError> {
        self.journal.0.borrow_mut().probes += 1;
        self.config
            .identity
            .clone()
            .ok_or_else(|| FlashError::Probe("no identity response".to_string()))
    }

    fn erase_flash(&mut self, _session: &mut DummySession) -> Result<(), FlashError> {
        if let Some(msg) = &self.config.erase_error {
            return Err(FlashError::Erase(msg.clone()));
        }
        self.journal.0.borrow_mut().erases += 1;
        Ok(())
    }

    fn write_image<P: FlashProgress>(
        &mut self,
        _session: &mut DummySession,
        image: &[u8],
        options: &WriteOptions,
        progress: &mut P,
    ) -> Result<(), FlashError> {
        if let Some(msg) = &self.config.write_error {
            return Err(FlashError::Write(msg.clone()));
        }
        let total = image.len();
        for step in 1..=4 {
            progress.written(total * step / 4, total);
        }
        self.journal
            .0
            .borrow_mut()
            .written
            .push((options.offset, image.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, _session: DummySession) -> Result<(), FlashError> {
        self.journal.0.borrow_mut().disconnects += 1;
        match &self.config.disconnect_error {
            Some(msg) => Err(FlashError::Disconnect(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Scripted response for one URL.
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Respond with these body bytes.
    Body(Vec<u8>),
    /// Respond with a non-success status.
    Status(u16),
    /// Fail at the network level.
    NetworkError(String),
}

/// Byte fetcher that answers from a script and records every request.
///
/// URLs without a scripted response fail as unreachable.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    script: HashMap<String, FetchScript>,
    requests: Vec<String>,
}

impl ScriptedFetcher {
    /// An empty script; every request fails as unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for `url`.
    pub fn on(mut self, url: &str, response: FetchScript) -> Self {
        self.script.insert(url.to_string(), response);
        self
    }

    /// Requested URLs, in order.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }
}

impl ByteFetcher for ScriptedFetcher {
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.push(url.to_string());
        match self.script.get(url) {
            Some(FetchScript::Body(bytes)) => Ok(bytes.clone()),
            Some(FetchScript::Status(status)) => Err(FetchError::Status(*status)),
            Some(FetchScript::NetworkError(msg)) => Err(FetchError::Network(msg.clone())),
            None => Err(FetchError::Network(format!("no route to {}", url))),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    sets: usize,
    removes: usize,
}

/// In-memory cache store counting writes and purges.
///
/// Clones share the same underlying map, so a test can keep a handle
/// while the resolver owns the store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Rc<RefCell<MemoryInner>>);

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without counting it as a write.
    pub fn seed(&self, key: &str, value: &str) {
        self.0
            .borrow_mut()
            .values
            .insert(key.to_string(), value.to_string());
    }

    /// Number of `set` calls so far.
    pub fn set_count(&self) -> usize {
        self.0.borrow().sets
    }

    /// Number of `remove` calls so far.
    pub fn remove_count(&self) -> usize {
        self.0.borrow().removes
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.borrow().values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        let mut inner = self.0.borrow_mut();
        inner.sets += 1;
        inner.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        let mut inner = self.0.borrow_mut();
        inner.removes += 1;
        inner.values.remove(key);
    }
}

/// Manually advanced clock. Clones share the same instant.
#[derive(Clone, Debug, Default)]
pub struct FixedClock(Rc<Cell<u64>>);

impl FixedClock {
    /// A clock frozen at `now_ms`.
    pub fn at(now_ms: u64) -> Self {
        Self(Rc::new(Cell::new(now_ms)))
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Flow progress recorder.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    /// Phases in reported order.
    pub phases: Vec<FlowPhase>,
    /// Percentages in reported order.
    pub percents: Vec<u8>,
}

impl FlowProgress for RecordingProgress {
    fn phase(&mut self, phase: FlowPhase) {
        self.phases.push(phase);
    }

    fn percent(&mut self, percent: u8) {
        self.percents.push(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webflasher_core::error::FlowError;
    use webflasher_core::fetch;
    use webflasher_core::flasher::FLASH_OFFSET;
    use webflasher_core::flow::{ConnectOutcome, FlashFlow, FlowState};
    use webflasher_core::manifest::{
        FirmwareAsset, Manifest, ManifestResolver, CACHE_KEY, CACHE_TTL_MS, MANIFEST_URL,
    };

    const RELEASE_URL: &str =
        "https://github.com/acme/firmware/releases/download/v2.0.0/esp32-c3.bin";
    const MIRROR_URL: &str =
        "https://mirror.ghproxy.com/https://github.com/acme/firmware/releases/download/v2.0.0/esp32-c3.bin";

    fn asset() -> FirmwareAsset {
        FirmwareAsset {
            board: "esp32-c3".to_string(),
            display_name: Some("ESP32-C3 DevKit".to_string()),
            filename: "esp32-c3.bin".to_string(),
            url: RELEASE_URL.to_string(),
        }
    }

    fn manifest_json() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "tag_name": "v2.0.0",
            "published_at": "2024-06-01T00:00:00Z",
            "assets": [
                {"board": "esp32-c3", "display_name": "ESP32-C3 DevKit",
                 "filename": "esp32-c3.bin", "url": RELEASE_URL},
                {"board": "esp32-s3", "filename": "esp32-s3.bin",
                 "url": "https://downloads.example.com/esp32-s3.bin"},
            ]
        }))
        .unwrap()
    }

    fn connected_flow(
        config: DummyConfig,
    ) -> (FlashFlow<DummyPicker, DummyFlasher>, JournalHandle) {
        let (flasher, journal) = DummyFlasher::new(config);
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);
        flow.select_local("firmware.bin", vec![0xAA; 64]).unwrap();
        let outcome = flow.begin_connect().unwrap();
        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        (flow, journal)
    }

    // ---- manifest resolver -------------------------------------------------

    #[test]
    fn test_cached_manifest_skips_network() {
        let store = MemoryStore::new();
        let clock = FixedClock::at(10_000);
        let mut resolver = ManifestResolver::new(store.clone(), clock.clone());
        let mut fetcher = ScriptedFetcher::new().on(MANIFEST_URL, FetchScript::Body(manifest_json()));

        let first = resolver.load(&mut fetcher).unwrap();
        assert_eq!(fetcher.request_count(), 1);

        clock.advance(CACHE_TTL_MS);
        let second = resolver.load(&mut fetcher).unwrap();
        assert_eq!(second, first);
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(store.set_count(), 1);
    }

    #[test]
    fn test_expired_cache_is_purged_and_refetched() {
        let store = MemoryStore::new();
        let clock = FixedClock::at(10_000);
        let mut resolver = ManifestResolver::new(store.clone(), clock.clone());
        let mut fetcher = ScriptedFetcher::new().on(MANIFEST_URL, FetchScript::Body(manifest_json()));

        resolver.load(&mut fetcher).unwrap();
        clock.advance(CACHE_TTL_MS + 1);
        resolver.load(&mut fetcher).unwrap();

        assert_eq!(fetcher.request_count(), 2);
        assert_eq!(store.remove_count(), 1);
        assert_eq!(store.set_count(), 2);
    }

    #[test]
    fn test_corrupt_cache_entry_is_purged() {
        let store = MemoryStore::new();
        store.seed(CACHE_KEY, "{definitely not an envelope");
        let mut resolver = ManifestResolver::new(store.clone(), FixedClock::at(0));
        let mut fetcher = ScriptedFetcher::new().on(MANIFEST_URL, FetchScript::Body(manifest_json()));

        let manifest = resolver.load(&mut fetcher).unwrap();
        assert_eq!(manifest.tag_name, "v2.0.0");
        assert_eq!(store.remove_count(), 1);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_manifest_preserves_order_and_labels() {
        let mut resolver = ManifestResolver::new(MemoryStore::new(), FixedClock::at(0));
        let mut fetcher = ScriptedFetcher::new().on(MANIFEST_URL, FetchScript::Body(manifest_json()));

        let manifest: Manifest = resolver.load(&mut fetcher).unwrap();
        let labels: Vec<_> = manifest.assets.iter().map(|a| a.label()).collect();
        assert_eq!(labels, ["ESP32-C3 DevKit", "esp32-s3"]);
    }

    #[test]
    fn test_empty_assets_is_unavailable() {
        let body = br#"{"tag_name": "v2.0.0", "published_at": "2024-06-01T00:00:00Z", "assets": []}"#;
        let store = MemoryStore::new();
        let mut resolver = ManifestResolver::new(store.clone(), FixedClock::at(0));
        let mut fetcher =
            ScriptedFetcher::new().on(MANIFEST_URL, FetchScript::Body(body.to_vec()));

        let err = resolver.load(&mut fetcher).unwrap_err();
        assert!(matches!(err, FlowError::ManifestUnavailable(_)));
        assert_eq!(store.set_count(), 0);
    }

    #[test]
    fn test_manifest_fetch_failure_is_not_retried() {
        let mut resolver = ManifestResolver::new(MemoryStore::new(), FixedClock::at(0));
        let mut fetcher = ScriptedFetcher::new().on(MANIFEST_URL, FetchScript::Status(502));

        let err = resolver.load(&mut fetcher).unwrap_err();
        assert!(matches!(err, FlowError::ManifestUnavailable(_)));
        assert_eq!(fetcher.request_count(), 1);
    }

    // ---- firmware acquisition ----------------------------------------------

    #[test]
    fn test_fallback_uses_last_candidate() {
        let mut fetcher = ScriptedFetcher::new()
            .on(RELEASE_URL, FetchScript::Status(403))
            .on(MIRROR_URL, FetchScript::Body(vec![1, 2, 3]));

        let bytes = fetch::acquire(&mut fetcher, RELEASE_URL).unwrap();
        assert_eq!(bytes, [1, 2, 3]);
        assert_eq!(fetcher.requests(), [RELEASE_URL, MIRROR_URL]);
    }

    #[test]
    fn test_fallback_stops_at_first_success() {
        let mut fetcher = ScriptedFetcher::new()
            .on(RELEASE_URL, FetchScript::Body(vec![9; 16]))
            .on(MIRROR_URL, FetchScript::Body(vec![1; 16]));

        let bytes = fetch::acquire(&mut fetcher, RELEASE_URL).unwrap();
        assert_eq!(bytes, vec![9; 16]);
        assert_eq!(fetcher.requests(), [RELEASE_URL]);
    }

    #[test]
    fn test_empty_body_falls_through_to_mirror() {
        let mut fetcher = ScriptedFetcher::new()
            .on(RELEASE_URL, FetchScript::Body(Vec::new()))
            .on(MIRROR_URL, FetchScript::Body(vec![7; 8]));

        let bytes = fetch::acquire(&mut fetcher, RELEASE_URL).unwrap();
        assert_eq!(bytes, vec![7; 8]);
    }

    #[test]
    fn test_all_candidates_failing_reports_last_error() {
        let mut fetcher = ScriptedFetcher::new()
            .on(RELEASE_URL, FetchScript::Status(403))
            .on(MIRROR_URL, FetchScript::NetworkError("mirror down".to_string()));

        let err = fetch::acquire(&mut fetcher, RELEASE_URL).unwrap_err();
        match err {
            FlowError::FirmwareDownloadFailed(msg) => {
                assert!(msg.contains("mirror down"), "message was: {}", msg);
                assert!(msg.contains("upload"), "message was: {}", msg);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fetcher.request_count(), 2);
    }

    // ---- connection --------------------------------------------------------

    #[test]
    fn test_declined_port_prompt_returns_to_ready() {
        let (flasher, journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(
            DummyPicker::scripted([PickOutcome::Decline]),
            flasher,
        );
        flow.select_release(asset()).unwrap();

        let outcome = flow.begin_connect().unwrap();
        assert_eq!(outcome, ConnectOutcome::Declined);
        assert_eq!(*flow.state(), FlowState::Idle);
        assert_eq!(journal.snapshot().connects, 0);

        // The prompt can be retried immediately.
        assert!(matches!(
            flow.begin_connect().unwrap(),
            ConnectOutcome::Connected(_)
        ));
    }

    #[test]
    fn test_port_failure_is_an_error() {
        let (flasher, _journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(
            DummyPicker::scripted([PickOutcome::Fail("device unplugged".to_string())]),
            flasher,
        );
        flow.select_release(asset()).unwrap();

        let err = flow.begin_connect().unwrap_err();
        assert!(matches!(err, FlowError::FlashingFailed(_)));
        assert!(flow.state().is_terminal());
    }

    #[test]
    fn test_connect_without_selection_is_invalid_state() {
        let (flasher, _journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);

        let err = flow.begin_connect().unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(*flow.state(), FlowState::Idle);
    }

    #[test]
    fn test_probe_failure_degrades_to_placeholder() {
        let (flasher, _journal) = DummyFlasher::new(DummyConfig::default());
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);
        flow.select_local("firmware.bin", vec![1, 2, 3]).unwrap();

        match flow.begin_connect().unwrap() {
            ConnectOutcome::Connected(identity) => {
                assert_eq!(identity, ChipIdentity::unknown());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(*flow.state(), FlowState::DeviceInfoShown);
    }

    // ---- flashing pipeline -------------------------------------------------

    #[test]
    fn test_successful_flash_closes_session_once() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            ..DummyConfig::default()
        });
        let mut fetcher = ScriptedFetcher::new();
        let mut progress = RecordingProgress::default();

        flow.confirm_and_flash(&mut fetcher, &mut progress).unwrap();

        assert_eq!(*flow.state(), FlowState::Completed);
        assert_eq!(journal.disconnects(), 1);
        let written = journal.snapshot().written;
        assert_eq!(written, vec![(FLASH_OFFSET, vec![0xAA; 64])]);
        // Local source: nothing was fetched.
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn test_write_failure_closes_session_once() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            write_error: Some("timeout at block 12".to_string()),
            ..DummyConfig::default()
        });

        let err = flow
            .confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap_err();
        assert!(matches!(err, FlowError::FlashingFailed(_)));
        assert!(matches!(flow.state(), FlowState::Failed(_)));
        assert_eq!(journal.disconnects(), 1);
    }

    #[test]
    fn test_erase_failure_closes_session_once() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            erase_error: Some("erase rejected".to_string()),
            ..DummyConfig::default()
        });

        let err = flow
            .confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap_err();
        assert!(matches!(err, FlowError::FlashingFailed(_)));
        assert_eq!(journal.disconnects(), 1);
        assert!(journal.snapshot().written.is_empty());
    }

    #[test]
    fn test_download_failure_closes_session_once() {
        let (flasher, journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);
        flow.select_release(asset()).unwrap();
        flow.begin_connect().unwrap();

        // Every candidate unreachable.
        let err = flow
            .confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap_err();
        assert!(matches!(err, FlowError::FirmwareDownloadFailed(_)));
        assert!(matches!(flow.state(), FlowState::Failed(_)));
        assert_eq!(journal.disconnects(), 1);
    }

    #[test]
    fn test_disconnect_failure_never_masks_success() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            disconnect_error: Some("port vanished".to_string()),
            ..DummyConfig::default()
        });

        flow.confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap();
        assert_eq!(*flow.state(), FlowState::Completed);
        assert_eq!(journal.disconnects(), 1);
    }

    #[test]
    fn test_remote_flash_downloads_then_writes() {
        let (flasher, journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);
        flow.select_release(asset()).unwrap();
        flow.begin_connect().unwrap();

        let mut fetcher =
            ScriptedFetcher::new().on(RELEASE_URL, FetchScript::Body(vec![0x5A; 128]));
        flow.confirm_and_flash(&mut fetcher, &mut RecordingProgress::default())
            .unwrap();

        assert_eq!(journal.snapshot().written, vec![(FLASH_OFFSET, vec![0x5A; 128])]);
    }

    #[test]
    fn test_confirm_without_connect_is_invalid_state() {
        let (flasher, journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);
        flow.select_release(asset()).unwrap();

        let err = flow
            .confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(journal.snapshot().written.len(), 0);
        assert_eq!(journal.disconnects(), 0);
    }

    // ---- progress ----------------------------------------------------------

    #[test]
    fn test_progress_is_monotonic_and_banded() {
        let (mut flow, _journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            ..DummyConfig::default()
        });
        let mut progress = RecordingProgress::default();

        flow.confirm_and_flash(&mut ScriptedFetcher::new(), &mut progress)
            .unwrap();

        assert!(progress.percents.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.percents.first(), Some(&50));
        assert_eq!(progress.percents.last(), Some(&100));
        assert!(progress
            .percents
            .iter()
            .all(|&p| p == 100 || (50..=95).contains(&p)));
        assert_eq!(
            progress.phases,
            [
                FlowPhase::Acquiring,
                FlowPhase::Erasing,
                FlowPhase::Writing,
                FlowPhase::Finishing,
            ]
        );
    }

    // ---- cancel and restart ------------------------------------------------

    #[test]
    fn test_cancel_closes_session_and_returns_to_ready() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            ..DummyConfig::default()
        });

        flow.cancel().unwrap();
        assert_eq!(*flow.state(), FlowState::Idle);
        assert_eq!(journal.disconnects(), 1);
        assert!(flow.selected().is_none());
        assert!(flow.identity().is_none());

        // Confirmation is no longer possible until a new port is granted.
        let err = flow
            .confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(journal.disconnects(), 1);
    }

    #[test]
    fn test_cancel_swallows_close_errors() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            disconnect_error: Some("already gone".to_string()),
            ..DummyConfig::default()
        });

        flow.cancel().unwrap();
        assert_eq!(*flow.state(), FlowState::Idle);
        assert_eq!(journal.disconnects(), 1);
    }

    #[test]
    fn test_restart_clears_selection() {
        let (mut flow, journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            ..DummyConfig::default()
        });
        flow.confirm_and_flash(&mut ScriptedFetcher::new(), &mut RecordingProgress::default())
            .unwrap();

        flow.restart().unwrap();
        assert_eq!(*flow.state(), FlowState::Idle);
        assert!(flow.selected().is_none());
        // The session was already closed by the pipeline; restart must not
        // close it a second time.
        assert_eq!(journal.disconnects(), 1);

        let err = flow.begin_connect().unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
    }

    #[test]
    fn test_restart_only_from_terminal_states() {
        let (mut flow, _journal) = connected_flow(DummyConfig {
            identity: Some(ChipIdentity::unknown()),
            ..DummyConfig::default()
        });

        let err = flow.restart().unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(*flow.state(), FlowState::DeviceInfoShown);
    }

    // ---- local file validation ---------------------------------------------

    #[test]
    fn test_local_file_with_wrong_extension_is_rejected() {
        let (flasher, journal) = DummyFlasher::well_behaved();
        let mut flow = FlashFlow::new(DummyPicker::granting(), flasher);

        let err = flow.select_local("notes.txt", vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, FlowError::InvalidFirmwareFile { .. }));
        assert!(flow.selected().is_none());

        // With nothing selected, the connection step stays unreachable.
        let err = flow.begin_connect().unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(journal.snapshot().connects, 0);
    }
}
