//! Contracts between the beacon engine and the host platform
//!
//! The engine never talks to a concrete radio API. The host (Kotlin/Swift via
//! UniFFI, or the desktop CLI) implements [`ScanPlatform`] to expose the radio
//! and the capability prompts, and [`BeaconListener`] to receive results.

use crate::ble::beacon::BeaconRecord;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Failure taxonomy for a scan attempt.
///
/// The first six variants are terminal for the current attempt and are
/// delivered through [`BeaconListener::on_error`]. None of them is retried by
/// the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Bluetooth scan or location permission denied")]
    PermissionDenied,
    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,
    #[error("Bluetooth LE is not supported on this device")]
    FeatureUnsupported,
    #[error("Scan already started")]
    AlreadyStarted,
    #[error("Scanner registration failed")]
    RegistrationFailed,
    #[error("Internal radio error (code {code})")]
    InternalError { code: i32 },
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
    #[error("Platform bridge error: {message}")]
    PlatformBridge { message: String },
    #[error("Async runtime unavailable: {message}")]
    RuntimeUnavailable { message: String },
}

/// Platform scan-failure codes as reported by the radio stack.
pub const SCAN_FAILED_ALREADY_STARTED: i32 = 1;
pub const SCAN_FAILED_APPLICATION_REGISTRATION_FAILED: i32 = 2;
pub const SCAN_FAILED_INTERNAL_ERROR: i32 = 3;
pub const SCAN_FAILED_FEATURE_UNSUPPORTED: i32 = 4;

impl ScanError {
    /// Map a radio-layer failure code onto the taxonomy.
    pub fn from_platform_code(code: i32) -> Self {
        match code {
            SCAN_FAILED_ALREADY_STARTED => ScanError::AlreadyStarted,
            SCAN_FAILED_APPLICATION_REGISTRATION_FAILED => ScanError::RegistrationFailed,
            SCAN_FAILED_FEATURE_UNSUPPORTED => ScanError::FeatureUnsupported,
            other => ScanError::InternalError { code: other },
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        ScanError::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for ScanError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        ScanError::PlatformBridge {
            message: err.reason,
        }
    }
}

// ============================================================================
// CAPABILITY NEGOTIATION
// ============================================================================

/// Something the host has to obtain from the user or the OS before scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Runtime BLE scan + precise location permissions
    ScanPermission,
    /// Turning the Bluetooth adapter on
    AdapterEnable,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ScanPermission => write!(f, "ScanPermission"),
            Capability::AdapterEnable => write!(f, "AdapterEnable"),
        }
    }
}

// ============================================================================
// PLATFORM TRAITS
// ============================================================================

/// Radio capability injected into a [`ScanSession`](crate::ScanSession).
///
/// `request_capability` only emits the request. The answer comes back later
/// through `ScanSession::on_permission_result` or
/// `ScanSession::on_adapter_enable_result`.
///
/// Scan results are pushed by the host through
/// `ScanSession::on_advertisement`, and asynchronous radio failures through
/// `ScanSession::on_scan_failed`.
pub trait ScanPlatform: Send + Sync {
    fn is_ble_supported(&self) -> bool;
    fn has_scan_permission(&self) -> bool;
    fn is_adapter_enabled(&self) -> bool;
    fn request_capability(&self, capability: Capability);
    fn start_scan(&self) -> Result<(), ScanError>;
    fn stop_scan(&self);
}

/// Consumer of beacon updates. One listener per session or generator.
pub trait BeaconListener: Send + Sync {
    /// Current registry contents, sorted by RSSI descending
    fn on_beacons_changed(&self, beacons: Vec<BeaconRecord>);
    fn on_scan_started(&self);
    fn on_scan_stopped(&self);
    fn on_error(&self, error: ScanError);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_code_mapping() {
        assert_eq!(ScanError::from_platform_code(1), ScanError::AlreadyStarted);
        assert_eq!(
            ScanError::from_platform_code(2),
            ScanError::RegistrationFailed
        );
        assert_eq!(
            ScanError::from_platform_code(3),
            ScanError::InternalError { code: 3 }
        );
        assert_eq!(
            ScanError::from_platform_code(4),
            ScanError::FeatureUnsupported
        );
        assert_eq!(
            ScanError::from_platform_code(6),
            ScanError::InternalError { code: 6 }
        );
    }

    #[test]
    fn test_scan_error_display() {
        assert_eq!(
            ScanError::InternalError { code: 3 }.to_string(),
            "Internal radio error (code 3)"
        );
        assert_eq!(
            ScanError::invalid_config("scan_window_ms must be > 0").to_string(),
            "Invalid configuration: scan_window_ms must be > 0"
        );
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::ScanPermission.to_string(), "ScanPermission");
        assert_eq!(Capability::AdapterEnable.to_string(), "AdapterEnable");
    }
}
