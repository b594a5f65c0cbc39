/// Synthetic beacon source for hosts without a radio
///
/// Emits the same `BeaconRecord` shape and listener callbacks as a real
/// `ScanSession`, so a consumer cannot tell the sources apart. Every tick
/// random-walks the RSSI of a few beacons and occasionally adds or drops one.
/// Identities come from small fixed pools so they stay stable across ticks.

use crate::ble::advertisement::BeaconAdvertisement;
use crate::ble::beacon::{now_ms, BeaconIdentity, BeaconKind, BeaconRecord};
use crate::ble::registry::BeaconRegistry;
use crate::platform::{BeaconListener, ScanError};
use parking_lot::ReentrantMutex;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Proximity UUIDs handed out to synthetic beacons
pub const MOCK_UUID_POOL: [&str; 3] = [
    "fda50693-a4e2-4fb1-afcf-c6eb07647825",
    "e2c56db5-dffb-48d2-b060-d0f5a71096e0",
    "b9407f30-f5f8-466e-aff9-25556b57fe6d",
];

/// MAC addresses handed out to synthetic beacons. One beacon per address.
pub const MOCK_MAC_POOL: [&str; 10] = [
    "C4:7C:8D:6A:00:01",
    "C4:7C:8D:6A:00:02",
    "C4:7C:8D:6A:00:03",
    "C4:7C:8D:6A:00:04",
    "C4:7C:8D:6A:00:05",
    "C4:7C:8D:6A:00:06",
    "C4:7C:8D:6A:00:07",
    "C4:7C:8D:6A:00:08",
    "C4:7C:8D:6A:00:09",
    "C4:7C:8D:6A:00:0A",
];

const MAJOR_RANGE: std::ops::RangeInclusive<u16> = 1..=100;
const MINOR_RANGE: std::ops::RangeInclusive<u16> = 1..=1000;
const TX_POWER_RANGE: std::ops::RangeInclusive<i32> = -65..=-55;
const INITIAL_RSSI_RANGE: std::ops::RangeInclusive<i32> = -95..=-45;

/// Mock generator tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Shortest pause between ticks in milliseconds
    pub tick_min_ms: u64,
    /// Longest pause between ticks in milliseconds
    pub tick_max_ms: u64,
    /// Upper bound of beacons perturbed per tick
    pub max_updates_per_tick: u32,
    /// Largest RSSI change per tick, in dBm
    pub rssi_step_dbm: u32,
    pub rssi_floor_dbm: i32,
    pub rssi_ceiling_dbm: i32,
    /// Chance per tick of a new beacon appearing
    pub spawn_probability: f64,
    /// Chance per tick of a beacon going out of range
    pub remove_probability: f64,
    pub max_beacons: u32,
    pub min_beacons: u32,
    /// Also remove out-of-range beacons from the registry
    pub mirror_removals: bool,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            tick_min_ms: 1_000,
            tick_max_ms: 3_000,
            max_updates_per_tick: 3,
            rssi_step_dbm: 3,
            rssi_floor_dbm: -105,
            rssi_ceiling_dbm: -30,
            spawn_probability: 0.10,
            remove_probability: 0.05,
            max_beacons: 10,
            min_beacons: 3,
            mirror_removals: false,
            seed: None,
        }
    }
}

impl MockConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.tick_min_ms == 0 {
            return Err(ScanError::invalid_config("tick_min_ms must be > 0"));
        }
        if self.tick_min_ms > self.tick_max_ms {
            return Err(ScanError::invalid_config(
                "tick_min_ms must not exceed tick_max_ms",
            ));
        }
        if self.rssi_floor_dbm > self.rssi_ceiling_dbm {
            return Err(ScanError::invalid_config(
                "rssi_floor_dbm must not exceed rssi_ceiling_dbm",
            ));
        }
        let span = i64::from(self.rssi_ceiling_dbm) - i64::from(self.rssi_floor_dbm);
        if i64::from(self.rssi_step_dbm) > span {
            return Err(ScanError::invalid_config(format!(
                "rssi_step_dbm must be <= {} (ceiling minus floor)",
                span
            )));
        }
        for (name, p) in [
            ("spawn_probability", self.spawn_probability),
            ("remove_probability", self.remove_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ScanError::invalid_config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }
        if self.max_beacons as usize > MOCK_MAC_POOL.len() {
            return Err(ScanError::invalid_config(format!(
                "max_beacons must be <= {}",
                MOCK_MAC_POOL.len()
            )));
        }
        if self.min_beacons > self.max_beacons {
            return Err(ScanError::invalid_config(
                "min_beacons must not exceed max_beacons",
            ));
        }
        Ok(())
    }
}

/// Changes produced by one tick
#[derive(Debug, Default)]
struct TickOutcome {
    updated: Vec<BeaconRecord>,
    removed: Option<BeaconIdentity>,
}

struct GeneratorState {
    running: bool,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
    /// Synthetic population; the registry may hold more after removals
    beacons: Vec<BeaconRecord>,
    /// Every identity this generator has put into the registry and not
    /// taken out again
    published: HashSet<BeaconIdentity>,
    rng: StdRng,
}

impl GeneratorState {
    fn halt(&mut self) {
        if let Some(task) = self.ticker.take() {
            task.abort();
        }
        self.running = false;
        self.generation += 1;
    }

    fn next_delay(&mut self, config: &MockConfig) -> Duration {
        Duration::from_millis(self.rng.gen_range(config.tick_min_ms..=config.tick_max_ms))
    }

    /// New beacon on a MAC address not used by the current population.
    fn synthesize(&mut self, config: &MockConfig, now: u64) -> Option<BeaconRecord> {
        let free: Vec<&str> = MOCK_MAC_POOL
            .iter()
            .copied()
            .filter(|mac| !self.beacons.iter().any(|b| b.mac_address == *mac))
            .collect();
        let mac = *free.choose(&mut self.rng)?;
        let uuid = *MOCK_UUID_POOL.choose(&mut self.rng)?;

        let advertisement = BeaconAdvertisement {
            kind: BeaconKind::IBeacon,
            uuid: uuid.to_string(),
            major: self.rng.gen_range(MAJOR_RANGE),
            minor: self.rng.gen_range(MINOR_RANGE),
            tx_power: self.rng.gen_range(TX_POWER_RANGE),
            name: None,
        };
        let rssi = self
            .rng
            .gen_range(INITIAL_RSSI_RANGE)
            .clamp(config.rssi_floor_dbm, config.rssi_ceiling_dbm);

        Some(BeaconRecord::from_advertisement(mac, rssi, advertisement, now))
    }

    fn populate(&mut self, config: &MockConfig, count: u32, now: u64) {
        self.beacons.clear();
        for _ in 0..count.min(config.max_beacons) {
            match self.synthesize(config, now) {
                Some(beacon) => {
                    self.published.insert(beacon.identity());
                    self.beacons.push(beacon);
                }
                None => break,
            }
        }
    }

    fn step(&mut self, config: &MockConfig, now: u64) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        // Random walk
        let budget = self.rng.gen_range(0..=config.max_updates_per_tick) as usize;
        let picks = budget.min(self.beacons.len());
        let step = i32::try_from(config.rssi_step_dbm).unwrap_or(i32::MAX);
        for i in index::sample(&mut self.rng, self.beacons.len(), picks) {
            let delta = self.rng.gen_range(-step..=step);
            let beacon = &mut self.beacons[i];
            let rssi = beacon
                .rssi
                .saturating_add(delta)
                .clamp(config.rssi_floor_dbm, config.rssi_ceiling_dbm);
            let tx_power = beacon.tx_power;
            beacon.observe(rssi, tx_power, now);
            outcome.updated.push(beacon.clone());
        }

        // Beacon walks into range
        if self.beacons.len() < config.max_beacons as usize
            && self.rng.gen_bool(config.spawn_probability)
        {
            if let Some(beacon) = self.synthesize(config, now) {
                debug!("Mock beacon appeared: {}", beacon.identity());
                self.published.insert(beacon.identity());
                outcome.updated.push(beacon.clone());
                self.beacons.push(beacon);
            }
        }

        // Beacon walks out of range
        if self.beacons.len() > config.min_beacons as usize
            && self.rng.gen_bool(config.remove_probability)
        {
            let idx = self.rng.gen_range(0..self.beacons.len());
            let gone = self.beacons.swap_remove(idx).identity();
            debug!("Mock beacon left: {}", gone);
            outcome.updated.retain(|b| b.identity() != gone);
            if config.mirror_removals {
                self.published.remove(&gone);
            }
            outcome.removed = Some(gone);
        }

        outcome
    }
}

struct GeneratorInner {
    config: MockConfig,
    registry: Arc<BeaconRegistry>,
    listener: Arc<dyn BeaconListener>,
    runtime: Handle,
    control: ReentrantMutex<RefCell<GeneratorState>>,
}

/// Drives a [`BeaconRegistry`] and a [`BeaconListener`] with synthetic data.
pub struct MockBeaconGenerator {
    inner: Arc<GeneratorInner>,
}

impl MockBeaconGenerator {
    /// Create a generator for a foreign host.
    pub fn new(
        config: MockConfig,
        registry: Arc<BeaconRegistry>,
        listener: Box<dyn BeaconListener>,
    ) -> Result<Self, ScanError> {
        crate::init_logging();
        let runtime = crate::runtime::handle()?;
        Self::with_parts(config, registry, Arc::from(listener), runtime)
    }

    pub fn with_parts(
        config: MockConfig,
        registry: Arc<BeaconRegistry>,
        listener: Arc<dyn BeaconListener>,
        runtime: Handle,
    ) -> Result<Self, ScanError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            inner: Arc::new(GeneratorInner {
                config,
                registry,
                listener,
                runtime,
                control: ReentrantMutex::new(RefCell::new(GeneratorState {
                    running: false,
                    generation: 0,
                    ticker: None,
                    beacons: Vec::new(),
                    published: HashSet::new(),
                    rng,
                })),
            }),
        })
    }

    pub fn registry(&self) -> Arc<BeaconRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Seed `initial_count` beacons (capped at `max_beacons`) and start ticking.
    ///
    /// The initial population is in the registry and has been announced to
    /// the listener when this returns.
    pub fn start_generating(&self, initial_count: u32) -> Result<(), ScanError> {
        self.inner.start(initial_count)
    }

    /// Cancel the tick loop. No-op when not generating.
    pub fn stop_generating(&self) {
        self.inner.stop();
    }

    pub fn is_generating(&self) -> bool {
        self.inner.control.lock().borrow().running
    }

    /// Size of the synthetic population
    pub fn population(&self) -> u32 {
        self.inner.control.lock().borrow().beacons.len() as u32
    }
}

impl GeneratorInner {
    fn start(self: &Arc<Self>, initial_count: u32) -> Result<(), ScanError> {
        let guard = self.control.lock();
        let (previous, initial) = {
            let mut state = guard.borrow_mut();
            if state.running {
                return Err(ScanError::AlreadyStarted);
            }
            state.running = true;
            state.generation += 1;
            let previous: Vec<BeaconIdentity> = state.published.drain().collect();
            state.populate(&self.config, initial_count, now_ms());
            state.ticker = Some(self.spawn_ticker(state.generation));
            (previous, state.beacons.clone())
        };

        // Withdraw the last run's beacons; other sources sharing the
        // registry keep theirs
        for identity in &previous {
            self.registry.remove(identity);
        }

        info!("Mock beacon generator started with {} beacons", initial.len());
        for beacon in initial {
            self.registry.upsert(beacon);
        }
        self.listener.on_scan_started();
        self.listener.on_beacons_changed(self.registry.snapshot());
        Ok(())
    }

    fn stop(&self) {
        let guard = self.control.lock();
        {
            let mut state = guard.borrow_mut();
            if !state.running {
                return;
            }
            state.halt();
        }

        info!("Mock beacon generator stopped");
        self.listener.on_scan_stopped();
    }

    fn spawn_ticker(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);

        self.runtime.spawn(async move {
            loop {
                let delay = match weak.upgrade() {
                    Some(inner) => inner.control.lock().borrow_mut().next_delay(&inner.config),
                    None => return,
                };
                tokio::time::sleep(delay).await;

                match weak.upgrade() {
                    Some(inner) if inner.tick(generation) => {}
                    _ => return,
                }
            }
        })
    }

    fn tick(&self, generation: u64) -> bool {
        let guard = self.control.lock();
        let outcome = {
            let mut state = guard.borrow_mut();
            if !state.running || state.generation != generation {
                return false;
            }
            state.step(&self.config, now_ms())
        };

        for beacon in outcome.updated {
            self.registry.upsert(beacon);
        }
        if let Some(gone) = outcome.removed {
            if self.config.mirror_removals {
                self.registry.remove(&gone);
            }
        }

        self.listener.on_beacons_changed(self.registry.snapshot());
        true
    }
}

impl Drop for GeneratorInner {
    fn drop(&mut self) {
        if let Some(task) = self.control.get_mut().get_mut().ticker.take() {
            task.abort();
        }
    }
}
