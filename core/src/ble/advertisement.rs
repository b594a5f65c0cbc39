//! BLE advertisement decoding
//!
//! An advertisement is a sequence of AD structures:
//!
//! ```text
//! [length:1][type:1][payload:length-1] [length:1][type:1]... [0x00]
//! ```
//!
//! Types handled here:
//!   0x08/0x09 = Shortened/Complete local name
//!   0x16      = Service data, 16-bit UUID (Eddystone when UUID == 0xFEAA)
//!   0xFF      = Manufacturer specific data (iBeacon when company == 0x004C
//!               and the payload starts with 0x02 0x15)
//!
//! Every read goes through [`Cursor`], which checks the remaining length before
//! consuming bytes. A structure whose declared length runs past the buffer end
//! stops the walk. Non-beacon traffic yields `None`, never an error.

use crate::ble::beacon::BeaconKind;

pub const AD_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Apple company identifier, carried little-endian on air (`4C 00`)
pub const APPLE_COMPANY_ID: u16 = 0x004C;
/// iBeacon sub-type (0x02) and remaining length (0x15 = 21)
pub const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];
/// UUID (16) + major (2) + minor (2) + txPower (1)
pub const IBEACON_BODY_LEN: usize = 21;

/// Eddystone 16-bit service UUID
pub const EDDYSTONE_SERVICE_UUID: u16 = 0xFEAA;
pub const EDDYSTONE_FRAME_UID: u8 = 0x00;
pub const EDDYSTONE_FRAME_URL: u8 = 0x10;
pub const EDDYSTONE_FRAME_TLM: u8 = 0x20;
pub const EDDYSTONE_FRAME_EID: u8 = 0x30;

const EDDYSTONE_NAMESPACE_LEN: usize = 10;
const EDDYSTONE_INSTANCE_LEN: usize = 6;
const EDDYSTONE_EID_LEN: usize = 8;

/// Beacon fields carried by the payload itself.
///
/// MAC address and RSSI come from the scan result, not from the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconAdvertisement {
    pub kind: BeaconKind,
    /// Hyphenated lowercase UUID for iBeacon, descriptive string for Eddystone
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
    pub tx_power: i32,
    pub name: Option<String>,
}

// ============================================================================
// CURSOR
// ============================================================================

/// Bounds-checked reader over a byte slice
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume `n` bytes, or nothing if fewer remain
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn read_i8(&mut self) -> Option<i8> {
        self.read_u8().map(|b| b as i8)
    }

    pub fn read_u16_be(&mut self) -> Option<u16> {
        self.take_array::<2>().map(u16::from_be_bytes)
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.take_array::<2>().map(u16::from_le_bytes)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf.get(self.pos..).unwrap_or(&[]);
        self.pos = self.buf.len();
        rest
    }
}

// ============================================================================
// AD STRUCTURES
// ============================================================================

/// One `[length][type][payload]` element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

/// Iterator over the AD structures of an advertisement.
///
/// Ends at a zero length byte, at the end of the buffer, or at the first
/// structure whose declared length does not fit. [`AdStructures::truncated`]
/// reports the last case.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    cursor: Cursor<'a>,
    truncated: bool,
    done: bool,
}

impl<'a> AdStructures<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(buf),
            truncated: false,
            done: false,
        }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = match self.cursor.read_u8() {
            Some(0) | None => {
                self.done = true;
                return None;
            }
            Some(len) => len as usize,
        };

        match self.cursor.take(len) {
            Some(body) => {
                let (ad_type, data) = match body.split_first() {
                    Some((ad_type, data)) => (*ad_type, data),
                    None => {
                        self.done = true;
                        return None;
                    }
                };
                Some(AdStructure { ad_type, data })
            }
            None => {
                self.truncated = true;
                self.done = true;
                None
            }
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Decodes raw advertisement bytes into zero or one beacon.
pub struct AdvertisementParser;

impl AdvertisementParser {
    /// Parse advertisement data. Returns `None` for anything that is not an
    /// iBeacon or Eddystone frame, including malformed input.
    pub fn parse(data: &[u8]) -> Option<BeaconAdvertisement> {
        let mut name: Option<String> = None;
        let mut beacon: Option<BeaconAdvertisement> = None;

        let mut structures = AdStructures::new(data);
        for ad in structures.by_ref() {
            match ad.ad_type {
                AD_TYPE_MANUFACTURER_DATA if beacon.is_none() => {
                    beacon = decode_ibeacon(ad.data);
                }
                AD_TYPE_SERVICE_DATA_16 if beacon.is_none() => {
                    beacon = decode_eddystone(ad.data);
                }
                AD_TYPE_COMPLETE_LOCAL_NAME => {
                    name = decode_name(ad.data).or(name);
                }
                AD_TYPE_SHORT_LOCAL_NAME if name.is_none() => {
                    name = decode_name(ad.data);
                }
                _ => {}
            }
        }

        if structures.truncated() && beacon.is_none() {
            tracing::trace!("Advertisement truncated after {} bytes", data.len());
        }

        beacon.map(|mut b| {
            b.name = name;
            b
        })
    }
}

fn decode_name(data: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(data).ok()?.trim_end_matches('\0');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Manufacturer data: `4C 00 02 15 <uuid:16> <major:2 BE> <minor:2 BE> <tx:1>`
fn decode_ibeacon(data: &[u8]) -> Option<BeaconAdvertisement> {
    let mut cursor = Cursor::new(data);
    if cursor.read_u16_le()? != APPLE_COMPANY_ID {
        return None;
    }
    if cursor.take(IBEACON_PREFIX.len())? != IBEACON_PREFIX {
        return None;
    }
    if cursor.remaining() < IBEACON_BODY_LEN {
        return None;
    }

    let uuid = uuid::Uuid::from_bytes(cursor.take_array::<16>()?);
    let major = cursor.read_u16_be()?;
    let minor = cursor.read_u16_be()?;
    let tx_power = cursor.read_i8()?;

    Some(BeaconAdvertisement {
        kind: BeaconKind::IBeacon,
        uuid: uuid.to_string(),
        major,
        minor,
        tx_power: tx_power as i32,
        name: None,
    })
}

/// Service data: `AA FE <frame type> ...`
///
/// Identity is kept as an opaque descriptive string per frame type; this is not
/// a full UID/URL/TLM/EID decoder.
fn decode_eddystone(data: &[u8]) -> Option<BeaconAdvertisement> {
    let mut cursor = Cursor::new(data);
    if cursor.read_u16_le()? != EDDYSTONE_SERVICE_UUID {
        return None;
    }
    let frame_type = cursor.read_u8()?;

    let (uuid, tx_power) = match frame_type {
        EDDYSTONE_FRAME_UID => {
            let tx_power = cursor.read_i8()?;
            let uuid = match (
                cursor.take(EDDYSTONE_NAMESPACE_LEN),
                cursor.take(EDDYSTONE_INSTANCE_LEN),
            ) {
                (Some(namespace), Some(instance)) => format!(
                    "eddystone-uid:{}:{}",
                    hex::encode(namespace),
                    hex::encode(instance)
                ),
                _ => "eddystone-uid".to_string(),
            };
            (uuid, tx_power as i32)
        }
        EDDYSTONE_FRAME_URL => {
            let tx_power = cursor.read_i8()?;
            (
                format!("eddystone-url:{}", hex::encode(cursor.rest())),
                tx_power as i32,
            )
        }
        // Telemetry carries no calibration byte
        EDDYSTONE_FRAME_TLM => ("eddystone-tlm".to_string(), 0),
        EDDYSTONE_FRAME_EID => {
            let tx_power = cursor.read_i8()?;
            let uuid = match cursor.take(EDDYSTONE_EID_LEN) {
                Some(eid) => format!("eddystone-eid:{}", hex::encode(eid)),
                None => "eddystone-eid".to_string(),
            };
            (uuid, tx_power as i32)
        }
        other => {
            let tx_power = cursor.read_i8()?;
            (format!("eddystone-{:02x}", other), tx_power as i32)
        }
    };

    Some(BeaconAdvertisement {
        kind: BeaconKind::Eddystone,
        uuid,
        major: 0,
        minor: 0,
        tx_power,
        name: None,
    })
}
