//! BLE value types shared by the core and the radio adapter.
//!
//! Everything here is plain data: addresses, 128-bit identifiers and
//! borrowed advertisement reports. The radio stack itself lives behind
//! [`crate::radio::Radio`].

pub mod adv_parser;
pub mod events;
pub mod security;
pub mod tracker;

use core::fmt;

use heapless::String;

/// Bluetooth Base UUID `00000000-0000-1000-8000-00805f9b34fb`.
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const BASE_UUID_MASK: u128 = 0x0000_0000_ffff_ffff_ffff_ffff_ffff_ffff;

/// A 128-bit service or characteristic identifier.
///
/// Stored as the numeric value of its canonical text form, so
/// `0x12785634_1278_5634_12cd_abef1234abcd` reads the same as
/// `12785634-1278-5634-12cd-abef1234abcd`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid(u128);

impl Uuid {
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Expand a 16-bit SIG-assigned UUID onto the Bluetooth Base UUID.
    pub const fn from_u16(short: u16) -> Self {
        Self(BASE_UUID | ((short as u128) << 96))
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Little-endian byte order, as carried in advertisements and by the
    /// SoftDevice.
    pub const fn to_le_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// 32-bit alias, if this UUID sits on the Bluetooth Base UUID.
    pub const fn as_u32(&self) -> Option<u32> {
        if self.0 & BASE_UUID_MASK == BASE_UUID {
            Some((self.0 >> 96) as u32)
        } else {
            None
        }
    }

    /// 16-bit alias, if this UUID sits on the Bluetooth Base UUID.
    pub const fn as_u16(&self) -> Option<u16> {
        match self.as_u32() {
            Some(v) if v <= 0xFFFF => Some(v as u16),
            _ => None,
        }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid({})", self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Uuid {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=u128:x}", self.0)
    }
}

/// Kind of BLE device address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    Public,
    RandomStatic,
    RandomPrivateResolvable,
    RandomPrivateNonResolvable,
}

/// BLE device address.
///
/// `bytes` are in over-the-air order (least significant byte first);
/// `Display` prints the usual most-significant-first colon form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdAddr {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub const fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// One advertising report as delivered by the radio during a scan.
///
/// Borrows the raw AD payload; it only lives for the callback.
#[derive(Clone, Copy, Debug)]
pub struct Advertisement<'a> {
    pub address: BdAddr,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i8,
    /// Raw advertisement / scan-response AD structures.
    pub data: &'a [u8],
}

impl<'a> Advertisement<'a> {
    pub fn new(address: BdAddr, rssi: i8, data: &'a [u8]) -> Self {
        Self {
            address,
            rssi,
            data,
        }
    }

    /// Whether the payload lists `service` among its service UUIDs.
    pub fn advertises(&self, service: Uuid) -> bool {
        adv_parser::contains_service_uuid(self.data, service)
    }

    pub fn name(&self) -> String<32> {
        adv_parser::extract_device_name(self.data)
    }
}
