/// Beacon records and their identity
///
/// A `BeaconRecord` is one observed beacon at a point in time. The registry owns
/// the live copy; everything handed to consumers is a clone.

use crate::ble::advertisement::BeaconAdvertisement;
use crate::ble::distance::estimate_distance;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Beacon advertisement family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeaconKind {
    IBeacon,
    Eddystone,
    Unknown,
}

impl BeaconKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeaconKind::IBeacon => "iBeacon",
            BeaconKind::Eddystone => "Eddystone",
            BeaconKind::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for BeaconKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite registry key. Two records are the same beacon iff all four match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeaconIdentity {
    pub mac_address: String,
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
}

impl std::fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.mac_address, self.uuid, self.major, self.minor
        )
    }
}

/// One observed beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    pub mac_address: String,
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
    pub kind: BeaconKind,
    /// Received signal strength in dBm
    pub rssi: i32,
    /// Calibrated power at 1 meter in dBm, as advertised by the beacon
    pub tx_power: i32,
    /// Cached at update time; -1.0 when unknown
    pub distance_meters: f64,
    pub last_seen_at_ms: u64,
    pub name: Option<String>,
}

impl BeaconRecord {
    /// Build a record from a decoded advertisement plus the scan-result fields.
    pub fn from_advertisement(
        mac_address: impl Into<String>,
        rssi: i32,
        advertisement: BeaconAdvertisement,
        seen_at_ms: u64,
    ) -> Self {
        Self {
            mac_address: mac_address.into(),
            uuid: advertisement.uuid,
            major: advertisement.major,
            minor: advertisement.minor,
            kind: advertisement.kind,
            rssi,
            tx_power: advertisement.tx_power,
            distance_meters: estimate_distance(rssi, advertisement.tx_power),
            last_seen_at_ms: seen_at_ms,
            name: advertisement.name,
        }
    }

    pub fn identity(&self) -> BeaconIdentity {
        BeaconIdentity {
            mac_address: self.mac_address.clone(),
            uuid: self.uuid.clone(),
            major: self.major,
            minor: self.minor,
        }
    }

    /// Apply a new signal observation, keeping identity fields.
    pub fn observe(&mut self, rssi: i32, tx_power: i32, seen_at_ms: u64) {
        self.rssi = rssi;
        self.tx_power = tx_power;
        self.last_seen_at_ms = seen_at_ms;
        self.distance_meters = estimate_distance(rssi, tx_power);
    }

    /// Distance formatted for display, "unknown" for the sentinel
    pub fn distance_label(&self) -> String {
        if self.distance_meters < 0.0 {
            "unknown".to_string()
        } else {
            format!("{:.2}", self.distance_meters)
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// EXPORT FORMAT
// ============================================================================

/// JSON shape consumed by existing log/debug tooling
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BeaconExport<'a> {
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    rssi: i32,
    beacon_type: &'static str,
    uuid: &'a str,
    major: u16,
    minor: u16,
    tx_power: i32,
    distance: String,
    timestamp: u64,
}

impl<'a> From<&'a BeaconRecord> for BeaconExport<'a> {
    fn from(record: &'a BeaconRecord) -> Self {
        Self {
            address: &record.mac_address,
            name: record.name.as_deref(),
            rssi: record.rssi,
            beacon_type: record.kind.as_str(),
            uuid: &record.uuid,
            major: record.major,
            minor: record.minor,
            tx_power: record.tx_power,
            distance: format!("{:.2}", record.distance_meters),
            timestamp: record.last_seen_at_ms,
        }
    }
}

/// Serialize records into the export JSON array
pub fn export_json(records: &[BeaconRecord]) -> serde_json::Result<String> {
    let exports: Vec<BeaconExport<'_>> = records.iter().map(BeaconExport::from).collect();
    serde_json::to_string(&exports)
}

/// Serialize records into a pretty-printed export JSON array
pub fn export_json_pretty(records: &[BeaconRecord]) -> serde_json::Result<String> {
    let exports: Vec<BeaconExport<'_>> = records.iter().map(BeaconExport::from).collect();
    serde_json::to_string_pretty(&exports)
}
