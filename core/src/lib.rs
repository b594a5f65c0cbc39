// Waypoint Beacon Core
#![allow(clippy::empty_line_after_doc_comments)]
//
// Raw BLE advertisements in, a live list of nearby beacons with estimated
// distances out. The radio, the permission prompts and the UI live in the
// host; this crate owns parsing, ranging, deduplication and the scan lifecycle.

pub mod ble;
pub mod platform;
pub mod runtime;

pub use ble::{
    estimate_distance, export_json, export_json_pretty, AdvertisementParser,
    BeaconAdvertisement, BeaconIdentity, BeaconKind, BeaconRecord, BeaconRegistry, MockConfig,
    MockBeaconGenerator, ScanConfig, ScanSession, ScanState, UpsertResult, UNKNOWN_DISTANCE,
};
pub use platform::{BeaconListener, Capability, ScanError, ScanPlatform};

// UniFFI scaffolding - clippy warnings in generated code
uniffi::include_scaffolding!("api");

/// Install the default `tracing` subscriber (idempotent).
///
/// Honors `RUST_LOG`, defaults to `info`. Does nothing if the host already
/// installed a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Decode one advertisement payload. `None` if it is not a beacon.
pub fn parse_advertisement(data: Vec<u8>) -> Option<BeaconAdvertisement> {
    AdvertisementParser::parse(&data)
}

pub fn default_scan_config() -> ScanConfig {
    ScanConfig::default()
}

pub fn default_mock_config() -> MockConfig {
    MockConfig::default()
}
