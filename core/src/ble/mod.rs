/// BLE beacon engine
///
/// - **advertisement**: AD-structure walking, iBeacon and Eddystone decoding
/// - **distance**: RSSI/txPower ranging
/// - **beacon**: beacon records, identity and the JSON export shape
/// - **registry**: live, deduplicated beacon set
/// - **scanner**: scan session with capability negotiation and duty-cycling
/// - **mock**: synthetic beacon source for hosts without a radio
///
/// Radio access and user prompts are left to the host through
/// [`ScanPlatform`](crate::platform::ScanPlatform), so everything here is
/// testable without hardware.

pub mod advertisement;
pub mod beacon;
pub mod distance;
pub mod mock;
pub mod registry;
pub mod scanner;

pub use advertisement::{AdvertisementParser, BeaconAdvertisement};
pub use beacon::{export_json, export_json_pretty, BeaconIdentity, BeaconKind, BeaconRecord};
pub use distance::{estimate_distance, UNKNOWN_DISTANCE};
pub use mock::{MockBeaconGenerator, MockConfig};
pub use registry::{BeaconRegistry, UpsertResult};
pub use scanner::{ScanConfig, ScanSession, ScanState};
