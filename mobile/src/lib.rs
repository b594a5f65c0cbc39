// beacon-mobile — Native mobile bindings for iOS and Android
// This crate exports the beacon core API via UniFFI

pub use beacon_core::*;
