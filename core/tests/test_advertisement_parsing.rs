// Property tests for advertisement decoding
//
// The parser sees raw bytes straight off the air. Whatever arrives, it must
// return a beacon or None and never panic.

mod common;

use beacon_core::{AdvertisementParser, BeaconKind};
use common::ibeacon_adv;
use proptest::prelude::*;

proptest! {
    #[test]
    fn parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..96)) {
        let _ = AdvertisementParser::parse(&data);
    }

    #[test]
    fn ibeacon_fields_decoded(
        uuid in any::<[u8; 16]>(),
        major in any::<u16>(),
        minor in any::<u16>(),
        tx_power in any::<i8>(),
    ) {
        let parsed = AdvertisementParser::parse(&ibeacon_adv(uuid, major, minor, tx_power))
            .expect("iBeacon payload");

        prop_assert_eq!(parsed.kind, BeaconKind::IBeacon);
        prop_assert_eq!(parsed.uuid, uuid::Uuid::from_bytes(uuid).to_string());
        prop_assert_eq!(parsed.major, major);
        prop_assert_eq!(parsed.minor, minor);
        prop_assert_eq!(parsed.tx_power, tx_power as i32);
    }

    #[test]
    fn truncated_ibeacon_rejected(
        major in any::<u16>(),
        minor in any::<u16>(),
        cut in 0usize..30,
    ) {
        let adv = ibeacon_adv(common::TEST_UUID, major, minor, -59);
        prop_assert!(AdvertisementParser::parse(&adv[..cut]).is_none());
    }

    #[test]
    fn trailing_structures_ignored(
        extra in prop::collection::vec(any::<u8>(), 0..32),
        major in any::<u16>(),
    ) {
        let mut adv = ibeacon_adv(common::TEST_UUID, major, 1, -59);
        adv.extend_from_slice(&extra);

        let parsed = AdvertisementParser::parse(&adv).expect("iBeacon payload");
        prop_assert_eq!(parsed.major, major);
    }

    #[test]
    fn foreign_company_id_rejected(company in any::<u16>()) {
        prop_assume!(company != 0x004C);
        let mut adv = ibeacon_adv(common::TEST_UUID, 1, 1, -59);
        adv[5..7].copy_from_slice(&company.to_le_bytes());
        prop_assert!(AdvertisementParser::parse(&adv).is_none());
    }
}

#[test]
fn test_empty_and_short_inputs() {
    assert!(AdvertisementParser::parse(&[]).is_none());
    assert!(AdvertisementParser::parse(&[0x00]).is_none());
    assert!(AdvertisementParser::parse(&[0x1A, 0xFF, 0x4C]).is_none());
}

#[test]
fn test_eddystone_uid_with_name() {
    let mut adv = vec![0x03, 0x03, 0xAA, 0xFE];
    adv.extend_from_slice(&[0x17, 0x16, 0xAA, 0xFE, 0x00, 0xEB]);
    adv.extend_from_slice(&[0x01; 10]);
    adv.extend_from_slice(&[0x02; 6]);
    adv.extend_from_slice(&[0x00, 0x00]);
    adv.extend_from_slice(&[0x05, 0x09, b'D', b'o', b'o', b'r']);

    let parsed = AdvertisementParser::parse(&adv).expect("Eddystone payload");
    assert_eq!(parsed.kind, BeaconKind::Eddystone);
    assert_eq!(
        parsed.uuid,
        "eddystone-uid:01010101010101010101:020202020202"
    );
    assert_eq!(parsed.tx_power, -21);
    assert_eq!(parsed.name.as_deref(), Some("Door"));
    assert_eq!((parsed.major, parsed.minor), (0, 0));
}
