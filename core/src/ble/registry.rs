/// Live, deduplicated set of nearby beacons
///
/// Keyed by (mac, uuid, major, minor). Scan callbacks upsert from the radio
/// thread while consumers take snapshots from theirs; both go through one
/// coarse lock, held for a single upsert or snapshot.

use crate::ble::beacon::{BeaconIdentity, BeaconRecord};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Outcome of [`BeaconRegistry::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Inserted,
    Updated,
}

#[derive(Debug, Default)]
pub struct BeaconRegistry {
    beacons: RwLock<HashMap<BeaconIdentity, BeaconRecord>>,
}

impl BeaconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new beacon or refresh the signal fields of a known one.
    ///
    /// Identity and kind of an existing entry never change.
    pub fn upsert(&self, observation: BeaconRecord) -> UpsertResult {
        let identity = observation.identity();
        let mut beacons = self.beacons.write();

        match beacons.get_mut(&identity) {
            Some(existing) => {
                existing.observe(
                    observation.rssi,
                    observation.tx_power,
                    observation.last_seen_at_ms,
                );
                if observation.name.is_some() {
                    existing.name = observation.name;
                }
                UpsertResult::Updated
            }
            None => {
                beacons.insert(identity, observation);
                UpsertResult::Inserted
            }
        }
    }

    /// Copy of all records, strongest signal first.
    ///
    /// Equal RSSI is ordered by identity so output is deterministic.
    pub fn snapshot(&self) -> Vec<BeaconRecord> {
        let mut records: Vec<BeaconRecord> = self.beacons.read().values().cloned().collect();
        records.sort_by(|a, b| {
            b.rssi
                .cmp(&a.rssi)
                .then_with(|| a.mac_address.cmp(&b.mac_address))
                .then_with(|| a.uuid.cmp(&b.uuid))
                .then_with(|| a.major.cmp(&b.major))
                .then_with(|| a.minor.cmp(&b.minor))
        });
        records
    }

    pub fn get(&self, identity: &BeaconIdentity) -> Option<BeaconRecord> {
        self.beacons.read().get(identity).cloned()
    }

    pub fn remove(&self, identity: &BeaconIdentity) -> Option<BeaconRecord> {
        self.beacons.write().remove(identity)
    }

    /// Drop every record last seen before `cutoff_ms`. Returns how many went.
    pub fn evict_stale(&self, cutoff_ms: u64) -> usize {
        let mut beacons = self.beacons.write();
        let before = beacons.len();
        beacons.retain(|_, record| record.last_seen_at_ms >= cutoff_ms);
        let evicted = before - beacons.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} stale beacons", evicted);
        }
        evicted
    }

    pub fn clear(&self) {
        self.beacons.write().clear();
    }

    pub fn len(&self) -> usize {
        self.beacons.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.read().is_empty()
    }

    /// Entry count for the foreign bindings
    pub fn count(&self) -> u32 {
        self.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::beacon::BeaconKind;
    use std::sync::Arc;

    fn record(mac: &str, minor: u16, rssi: i32, seen: u64) -> BeaconRecord {
        BeaconRecord {
            mac_address: mac.to_string(),
            uuid: "fda50693-a4e2-4fb1-afcf-c6eb07647825".to_string(),
            major: 10,
            minor,
            kind: BeaconKind::IBeacon,
            rssi,
            tx_power: -59,
            distance_meters: crate::ble::distance::estimate_distance(rssi, -59),
            last_seen_at_ms: seen,
            name: None,
        }
    }

    #[test]
    fn test_same_identity_updates_in_place() {
        let registry = BeaconRegistry::new();

        assert_eq!(
            registry.upsert(record("AA:00", 1, -70, 1)),
            UpsertResult::Inserted
        );
        assert_eq!(
            registry.upsert(record("AA:00", 1, -50, 2)),
            UpsertResult::Updated
        );

        assert_eq!(registry.len(), 1);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].rssi, -50);
        assert_eq!(snapshot[0].last_seen_at_ms, 2);
    }

    #[test]
    fn test_minor_distinguishes_beacons() {
        let registry = BeaconRegistry::new();
        registry.upsert(record("AA:00", 1, -70, 1));
        registry.upsert(record("AA:00", 2, -70, 1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_mac_distinguishes_beacons() {
        let registry = BeaconRegistry::new();
        registry.upsert(record("AA:00", 1, -70, 1));
        registry.upsert(record("AA:01", 1, -70, 1));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_snapshot_sorted_by_rssi_descending() {
        let registry = BeaconRegistry::new();
        registry.upsert(record("AA:00", 1, -40, 1));
        registry.upsert(record("AA:01", 1, -70, 1));
        registry.upsert(record("AA:02", 1, -55, 1));

        let rssis: Vec<i32> = registry.snapshot().iter().map(|r| r.rssi).collect();
        assert_eq!(rssis, vec![-40, -55, -70]);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let registry = BeaconRegistry::new();
        registry.upsert(record("AA:00", 1, -40, 1));

        let snapshot = registry.snapshot();
        registry.upsert(record("AA:00", 1, -90, 2));
        registry.upsert(record("AA:01", 1, -60, 2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].rssi, -40);
    }

    #[test]
    fn test_name_kept_when_update_has_none() {
        let registry = BeaconRegistry::new();
        let mut named = record("AA:00", 1, -40, 1);
        named.name = Some("Entrance".to_string());
        registry.upsert(named);
        registry.upsert(record("AA:00", 1, -45, 2));

        let identity = record("AA:00", 1, 0, 0).identity();
        let stored = registry.get(&identity).expect("present");
        assert_eq!(stored.name.as_deref(), Some("Entrance"));
        assert_eq!(stored.rssi, -45);
    }

    #[test]
    fn test_evict_stale() {
        let registry = BeaconRegistry::new();
        registry.upsert(record("AA:00", 1, -40, 100));
        registry.upsert(record("AA:01", 1, -40, 500));

        assert_eq!(registry.evict_stale(200), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].mac_address, "AA:01");
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = BeaconRegistry::new();
        let a = record("AA:00", 1, -40, 1);
        registry.upsert(a.clone());
        registry.upsert(record("AA:01", 1, -40, 1));

        assert!(registry.remove(&a.identity()).is_some());
        assert!(registry.remove(&a.identity()).is_none());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_upserts_and_snapshots() {
        let registry = Arc::new(BeaconRegistry::new());
        let mut handles = Vec::new();

        for t in 0..4u16 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for i in 0..200u64 {
                    registry.upsert(record("AA:00", t, -40 - (i % 50) as i32, i));
                }
            }));
        }
        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = registry.snapshot();
                    assert!(snapshot.len() <= 4);
                    assert!(snapshot.windows(2).all(|w| w[0].rssi >= w[1].rssi));
                }
            })
        };

        for handle in handles {
            handle.join().expect("writer thread");
        }
        reader.join().expect("reader thread");
        assert_eq!(registry.len(), 4);
    }
}
