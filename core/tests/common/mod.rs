// Shared fakes for the integration tests
#![allow(dead_code)]

use beacon_core::{BeaconListener, BeaconRecord, Capability, ScanError, ScanPlatform};
use parking_lot::Mutex;
use std::collections::VecDeque;

// ============================================================================
// PLATFORM
// ============================================================================

#[derive(Debug, Default)]
struct PlatformState {
    supported: bool,
    permission: bool,
    adapter: bool,
    requests: Vec<Capability>,
    start_calls: usize,
    stop_calls: usize,
    /// Results handed out by successive `start_scan` calls; `Ok` once drained
    start_results: VecDeque<Result<(), ScanError>>,
}

/// Scriptable radio that records every call
#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new(supported: bool, permission: bool, adapter: bool) -> Self {
        Self {
            state: Mutex::new(PlatformState {
                supported,
                permission,
                adapter,
                ..PlatformState::default()
            }),
        }
    }

    /// Supported, permitted and powered on
    pub fn ready() -> Self {
        Self::new(true, true, true)
    }

    pub fn fail_start_scan_with(&self, results: Vec<Result<(), ScanError>>) {
        self.state.lock().start_results = results.into();
    }

    pub fn requests(&self) -> Vec<Capability> {
        self.state.lock().requests.clone()
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }
}

impl ScanPlatform for FakePlatform {
    fn is_ble_supported(&self) -> bool {
        self.state.lock().supported
    }

    fn has_scan_permission(&self) -> bool {
        self.state.lock().permission
    }

    fn is_adapter_enabled(&self) -> bool {
        self.state.lock().adapter
    }

    fn request_capability(&self, capability: Capability) {
        self.state.lock().requests.push(capability);
    }

    fn start_scan(&self) -> Result<(), ScanError> {
        let mut state = self.state.lock();
        state.start_calls += 1;
        state.start_results.pop_front().unwrap_or(Ok(()))
    }

    fn stop_scan(&self) {
        self.state.lock().stop_calls += 1;
    }
}

// ============================================================================
// LISTENER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Changed(Vec<BeaconRecord>),
    Started,
    Stopped,
    Error(ScanError),
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn started_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Started))
    }

    pub fn stopped_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Stopped))
    }

    pub fn changed_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Changed(_)))
    }

    pub fn errors(&self) -> Vec<ScanError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_snapshot(&self) -> Option<Vec<BeaconRecord>> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Event::Changed(beacons) => Some(beacons.clone()),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl BeaconListener for RecordingListener {
    fn on_beacons_changed(&self, beacons: Vec<BeaconRecord>) {
        self.push(Event::Changed(beacons));
    }

    fn on_scan_started(&self) {
        self.push(Event::Started);
    }

    fn on_scan_stopped(&self) {
        self.push(Event::Stopped);
    }

    fn on_error(&self, error: ScanError) {
        self.push(Event::Error(error));
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

pub const TEST_UUID: [u8; 16] = [
    0xFD, 0xA5, 0x06, 0x93, 0xA4, 0xE2, 0x4F, 0xB1, 0xAF, 0xCF, 0xC6, 0xEB, 0x07, 0x64, 0x78,
    0x25,
];

/// Flags + iBeacon manufacturer data
pub fn ibeacon_adv(uuid: [u8; 16], major: u16, minor: u16, tx_power: i8) -> Vec<u8> {
    let mut adv = vec![0x02, 0x01, 0x06];
    adv.extend_from_slice(&[0x1A, 0xFF, 0x4C, 0x00, 0x02, 0x15]);
    adv.extend_from_slice(&uuid);
    adv.extend_from_slice(&major.to_be_bytes());
    adv.extend_from_slice(&minor.to_be_bytes());
    adv.push(tx_power as u8);
    adv
}
