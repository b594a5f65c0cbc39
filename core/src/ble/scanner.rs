/// Beacon scan session with capability negotiation and duty-cycling
///
/// Lifecycle:
///
/// ```text
/// Idle -> PermissionPending -> AdapterDisabledPending -> Scanning <-> Cooldown -> Stopped
/// ```
///
/// The host drives the session with `start`/`stop`, answers capability
/// requests, and pushes radio results in. Scan windows alternate with short
/// cooldowns on a Tokio timer so the radio is not kept on continuously.
///
/// Every operation runs under one re-entrant lock: the platform and the listener
/// may call back into the session from inside a callback, and once `stop()`
/// returns no further results reach the listener.

use crate::ble::advertisement::AdvertisementParser;
use crate::ble::beacon::{now_ms, BeaconRecord};
use crate::ble::registry::{BeaconRegistry, UpsertResult};
use crate::platform::{BeaconListener, Capability, ScanError, ScanPlatform};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Default radio-on time per duty cycle (10 seconds)
pub const DEFAULT_SCAN_WINDOW_MS: u64 = 10_000;

/// Default radio-off pause between scan windows (2 seconds)
pub const DEFAULT_COOLDOWN_MS: u64 = 2_000;

/// Scan session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Radio-on time before a cooldown, in milliseconds
    pub scan_window_ms: u64,
    /// Radio-off pause between windows; 0 scans continuously
    pub cooldown_ms: u64,
    /// Minimum spacing between listener updates; 0 notifies on every result
    pub notify_interval_ms: u64,
    /// Empty the registry when a new attempt starts
    pub clear_registry_on_start: bool,
    /// Empty the registry when the session stops
    pub clear_registry_on_stop: bool,
    /// Evict beacons not seen for this long; None keeps them until cleared
    pub stale_after_ms: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_window_ms: DEFAULT_SCAN_WINDOW_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            notify_interval_ms: 0,
            clear_registry_on_start: true,
            clear_registry_on_stop: false,
            stale_after_ms: None,
        }
    }
}

impl ScanConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.scan_window_ms == 0 {
            return Err(ScanError::invalid_config("scan_window_ms must be > 0"));
        }
        if self.stale_after_ms == Some(0) {
            return Err(ScanError::invalid_config(
                "stale_after_ms must be > 0 when set",
            ));
        }
        Ok(())
    }

    pub fn is_duty_cycled(&self) -> bool {
        self.cooldown_ms > 0
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }
}

/// Scan session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    /// Never started
    Idle,
    /// Waiting for the host to answer a permission request
    PermissionPending,
    /// Waiting for the host to answer an adapter-enable request
    AdapterDisabledPending,
    /// Radio on, results flowing
    Scanning,
    /// Radio off between scan windows
    Cooldown,
    /// Stopped by the caller or by a terminal error
    Stopped,
}

impl ScanState {
    /// Pending, scanning or cooling down
    pub fn is_active(&self) -> bool {
        !matches!(self, ScanState::Idle | ScanState::Stopped)
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanState::Idle => write!(f, "Idle"),
            ScanState::PermissionPending => write!(f, "PermissionPending"),
            ScanState::AdapterDisabledPending => write!(f, "AdapterDisabledPending"),
            ScanState::Scanning => write!(f, "Scanning"),
            ScanState::Cooldown => write!(f, "Cooldown"),
            ScanState::Stopped => write!(f, "Stopped"),
        }
    }
}

struct SessionControl {
    state: ScanState,
    /// Bumped whenever an attempt starts or ends; timers carry the value they
    /// were spawned with and give up on mismatch
    generation: u64,
    radio_on: bool,
    /// `on_scan_started` fired for the current attempt
    started: bool,
    duty_cycle: Option<JoinHandle<()>>,
    last_notified: Option<Instant>,
    /// Delivers the last update held back by `notify_interval_ms`
    trailing_notify: Option<JoinHandle<()>>,
}

impl SessionControl {
    fn new() -> Self {
        Self {
            state: ScanState::Idle,
            generation: 0,
            radio_on: false,
            started: false,
            duty_cycle: None,
            last_notified: None,
            trailing_notify: None,
        }
    }

    /// End the current attempt: cancel timers and invalidate stale callbacks.
    fn halt(&mut self, next: ScanState) {
        if let Some(task) = self.duty_cycle.take() {
            task.abort();
        }
        if let Some(task) = self.trailing_notify.take() {
            task.abort();
        }
        self.generation += 1;
        self.state = next;
        self.radio_on = false;
        self.started = false;
    }
}

struct SessionInner {
    config: ScanConfig,
    platform: Arc<dyn ScanPlatform>,
    listener: Arc<dyn BeaconListener>,
    registry: Arc<BeaconRegistry>,
    runtime: Handle,
    control: ReentrantMutex<RefCell<SessionControl>>,
}

/// One beacon scan, owned by the hosting UI layer.
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

impl ScanSession {
    /// Create a session for a foreign host. Initializes logging and picks up
    /// the current (or shared) Tokio runtime for the duty-cycle timer.
    pub fn new(
        config: ScanConfig,
        platform: Box<dyn ScanPlatform>,
        listener: Box<dyn BeaconListener>,
    ) -> Result<Self, ScanError> {
        crate::init_logging();
        let runtime = crate::runtime::handle()?;
        Self::with_parts(
            config,
            Arc::from(platform),
            Arc::from(listener),
            Arc::new(BeaconRegistry::new()),
            runtime,
        )
    }

    /// Create a session from explicit collaborators.
    pub fn with_parts(
        config: ScanConfig,
        platform: Arc<dyn ScanPlatform>,
        listener: Arc<dyn BeaconListener>,
        registry: Arc<BeaconRegistry>,
        runtime: Handle,
    ) -> Result<Self, ScanError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                platform,
                listener,
                registry,
                runtime,
                control: ReentrantMutex::new(RefCell::new(SessionControl::new())),
            }),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> Arc<BeaconRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn state(&self) -> ScanState {
        self.inner.control.lock().borrow().state
    }

    /// Registry contents, strongest first
    pub fn snapshot(&self) -> Vec<BeaconRecord> {
        self.inner.registry.snapshot()
    }

    /// Begin a scan attempt.
    ///
    /// Returns `Err(AlreadyStarted)` if an attempt is already pending or
    /// running. Every other failure is reported through the listener.
    pub fn start(&self) -> Result<(), ScanError> {
        self.inner.start()
    }

    /// Cancel timers, stop the radio, move to `Stopped`. No-op when inactive.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Host answer to a `Capability::ScanPermission` request
    pub fn on_permission_result(&self, granted: bool) {
        self.inner.on_permission_result(granted);
    }

    /// Host answer to a `Capability::AdapterEnable` request
    pub fn on_adapter_enable_result(&self, enabled: bool) {
        self.inner.on_adapter_enable_result(enabled);
    }

    /// Raw scan result from the radio
    pub fn on_advertisement(&self, address: String, rssi: i32, data: Vec<u8>) {
        self.inner.handle_advertisement(address, rssi, &data);
    }

    /// Asynchronous scan failure reported by the radio
    pub fn on_scan_failed(&self, code: i32) {
        self.inner.on_scan_failed(code);
    }
}

impl SessionInner {
    fn start(self: &Arc<Self>) -> Result<(), ScanError> {
        let guard = self.control.lock();
        {
            let mut ctl = guard.borrow_mut();
            if ctl.state.is_active() {
                debug!("Ignoring start: session already {}", ctl.state);
                return Err(ScanError::AlreadyStarted);
            }
            ctl.generation += 1;
            ctl.started = false;
            ctl.last_notified = None;
        }

        info!("Beacon scan starting");
        if self.config.clear_registry_on_start {
            self.registry.clear();
        }

        if !self.platform.is_ble_supported() {
            self.terminate(ScanError::FeatureUnsupported);
            return Ok(());
        }

        if !self.platform.has_scan_permission() {
            guard.borrow_mut().state = ScanState::PermissionPending;
            debug!("Requesting {}", Capability::ScanPermission);
            self.platform.request_capability(Capability::ScanPermission);
            return Ok(());
        }

        self.ensure_adapter();
        Ok(())
    }

    fn on_permission_result(self: &Arc<Self>, granted: bool) {
        let guard = self.control.lock();
        let state = guard.borrow().state;
        if state != ScanState::PermissionPending {
            debug!("Ignoring permission result in state {}", state);
            return;
        }

        if granted {
            info!("Scan permission granted");
            self.ensure_adapter();
        } else {
            self.terminate(ScanError::PermissionDenied);
        }
    }

    fn on_adapter_enable_result(self: &Arc<Self>, enabled: bool) {
        let guard = self.control.lock();
        let state = guard.borrow().state;
        if state != ScanState::AdapterDisabledPending {
            debug!("Ignoring adapter result in state {}", state);
            return;
        }

        if enabled {
            info!("Bluetooth adapter enabled");
            self.begin_scanning();
        } else {
            self.terminate(ScanError::AdapterDisabled);
        }
    }

    fn ensure_adapter(self: &Arc<Self>) {
        let guard = self.control.lock();
        if self.platform.is_adapter_enabled() {
            self.begin_scanning();
            return;
        }

        guard.borrow_mut().state = ScanState::AdapterDisabledPending;
        debug!("Requesting {}", Capability::AdapterEnable);
        self.platform.request_capability(Capability::AdapterEnable);
    }

    fn begin_scanning(self: &Arc<Self>) {
        let guard = self.control.lock();
        let generation = guard.borrow().generation;

        if let Err(e) = self.platform.start_scan() {
            if guard.borrow().generation == generation {
                self.terminate(e);
            }
            return;
        }
        if guard.borrow().generation != generation {
            // Stopped from inside start_scan
            self.platform.stop_scan();
            return;
        }

        {
            let mut ctl = guard.borrow_mut();
            ctl.state = ScanState::Scanning;
            ctl.radio_on = true;
            ctl.started = true;
            if self.config.is_duty_cycled() {
                ctl.duty_cycle = Some(self.spawn_duty_cycle(generation));
            }
        }

        info!(
            "Beacon scan running (window {} ms, cooldown {} ms)",
            self.config.scan_window_ms, self.config.cooldown_ms
        );
        self.listener.on_scan_started();
    }

    fn spawn_duty_cycle(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let window = self.config.scan_window();
        let cooldown = self.config.cooldown();

        self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(window).await;
                match weak.upgrade() {
                    Some(inner) if inner.enter_cooldown(generation) => {}
                    _ => return,
                }

                tokio::time::sleep(cooldown).await;
                match weak.upgrade() {
                    Some(inner) if inner.resume_scanning(generation) => {}
                    _ => return,
                }
            }
        })
    }

    fn enter_cooldown(&self, generation: u64) -> bool {
        let guard = self.control.lock();
        {
            let mut ctl = guard.borrow_mut();
            if ctl.generation != generation || ctl.state != ScanState::Scanning {
                return false;
            }
            ctl.state = ScanState::Cooldown;
            ctl.radio_on = false;
        }

        debug!("Scan window elapsed, cooling down");
        self.platform.stop_scan();
        if guard.borrow().generation != generation {
            return false;
        }

        if let Some(ttl) = self.config.stale_after_ms {
            if self.registry.evict_stale(now_ms().saturating_sub(ttl)) > 0 {
                self.listener.on_beacons_changed(self.registry.snapshot());
            }
        }
        let current = guard.borrow().generation == generation;
        current
    }

    fn resume_scanning(&self, generation: u64) -> bool {
        let guard = self.control.lock();
        {
            let ctl = guard.borrow();
            if ctl.generation != generation || ctl.state != ScanState::Cooldown {
                return false;
            }
        }

        if let Err(e) = self.platform.start_scan() {
            if guard.borrow().generation == generation {
                self.terminate(e);
            }
            return false;
        }
        if guard.borrow().generation != generation {
            self.platform.stop_scan();
            return false;
        }

        let mut ctl = guard.borrow_mut();
        ctl.state = ScanState::Scanning;
        ctl.radio_on = true;
        debug!("Cooldown over, scanning again");
        true
    }

    fn stop(&self) {
        let guard = self.control.lock();
        let (radio_on, started) = {
            let mut ctl = guard.borrow_mut();
            if !ctl.state.is_active() {
                trace!("Ignoring stop in state {}", ctl.state);
                return;
            }
            let radio_on = ctl.radio_on;
            let started = ctl.started;
            ctl.halt(ScanState::Stopped);
            (radio_on, started)
        };

        if radio_on {
            self.platform.stop_scan();
        }
        if self.config.clear_registry_on_stop {
            self.registry.clear();
        }

        info!("Beacon scan stopped");
        if started {
            self.listener.on_scan_stopped();
        }
    }

    /// End the current attempt with a terminal error.
    fn terminate(&self, error: ScanError) {
        let guard = self.control.lock();
        let radio_on = {
            let mut ctl = guard.borrow_mut();
            let radio_on = ctl.radio_on;
            ctl.halt(ScanState::Stopped);
            radio_on
        };

        if radio_on {
            self.platform.stop_scan();
        }
        if self.config.clear_registry_on_stop {
            self.registry.clear();
        }

        warn!("Beacon scan failed: {}", error);
        self.listener.on_error(error);
    }

    fn on_scan_failed(&self, code: i32) {
        let guard = self.control.lock();
        let state = guard.borrow().state;
        if !matches!(state, ScanState::Scanning | ScanState::Cooldown) {
            debug!("Ignoring scan failure {} in state {}", code, state);
            return;
        }
        self.terminate(ScanError::from_platform_code(code));
    }

    fn handle_advertisement(self: &Arc<Self>, address: String, rssi: i32, data: &[u8]) {
        // Parsing needs no lock; the result is dropped below if the session
        // stopped meanwhile.
        let parsed = AdvertisementParser::parse(data);

        let guard = self.control.lock();
        if guard.borrow().state != ScanState::Scanning {
            trace!("Dropping result from {}: not scanning", address);
            return;
        }
        let Some(advertisement) = parsed else {
            trace!("Parse skipped for {} ({} bytes)", address, data.len());
            return;
        };

        let now = now_ms();
        let record = BeaconRecord::from_advertisement(address, rssi, advertisement, now);
        let identity = record.identity();
        if self.registry.upsert(record) == UpsertResult::Inserted {
            debug!("New beacon {}", identity);
        }
        if let Some(ttl) = self.config.stale_after_ms {
            self.registry.evict_stale(now.saturating_sub(ttl));
        }

        if !self.should_notify() {
            return;
        }
        self.listener.on_beacons_changed(self.registry.snapshot());
    }

    /// Leading-edge throttle. A held-back update is delivered once the
    /// interval since the last notification has passed.
    fn should_notify(self: &Arc<Self>) -> bool {
        if self.config.notify_interval_ms == 0 {
            return true;
        }

        let guard = self.control.lock();
        let mut ctl = guard.borrow_mut();
        let now = Instant::now();
        let interval = self.config.notify_interval();
        match ctl.last_notified {
            Some(last) if now.duration_since(last) < interval => {
                if ctl.trailing_notify.is_none() {
                    let generation = ctl.generation;
                    let deadline = last + interval;
                    ctl.trailing_notify = Some(self.spawn_trailing_notify(deadline, generation));
                }
                false
            }
            _ => {
                if let Some(task) = ctl.trailing_notify.take() {
                    task.abort();
                }
                ctl.last_notified = Some(now);
                true
            }
        }
    }

    fn spawn_trailing_notify(
        self: &Arc<Self>,
        deadline: Instant,
        generation: u64,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);

        self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush_notify(generation);
            }
        })
    }

    fn flush_notify(&self, generation: u64) {
        let guard = self.control.lock();
        {
            let mut ctl = guard.borrow_mut();
            if ctl.generation != generation || ctl.trailing_notify.is_none() {
                return;
            }
            ctl.trailing_notify = None;
            ctl.last_notified = Some(Instant::now());
        }

        trace!("Delivering held-back beacon update");
        self.listener.on_beacons_changed(self.registry.snapshot());
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let ctl = self.control.get_mut().get_mut();
        if let Some(task) = ctl.duty_cycle.take() {
            task.abort();
        }
        if let Some(task) = ctl.trailing_notify.take() {
            task.abort();
        }
        if ctl.radio_on {
            ctl.radio_on = false;
            self.platform.stop_scan();
        }
    }
}
