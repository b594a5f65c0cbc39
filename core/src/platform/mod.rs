//! Host platform integration
//!
//! Contracts the mobile or desktop host implements to give the engine a radio
//! and to receive beacon updates, plus the shared error type.

pub mod bridge;

pub use bridge::{
    BeaconListener, Capability, ScanError, ScanPlatform, SCAN_FAILED_ALREADY_STARTED,
    SCAN_FAILED_APPLICATION_REGISTRATION_FAILED, SCAN_FAILED_FEATURE_UNSUPPORTED,
    SCAN_FAILED_INTERNAL_ERROR,
};
