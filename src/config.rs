//! Application-wide constants and runtime configuration.
//!
//! The constants are the reference values the firmware boots with.
//! The core never reads them directly: it is handed a [`ClientConfig`]
//! and a [`SecurityPolicy`] at construction.

use embassy_time::Duration;

use crate::ble::security::SecurityPolicy;
use crate::ble::Uuid;
use crate::radio::ScanParams;

// BLE identifiers

/// Service the target peripheral advertises and serves.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12785634_1278_5634_12cd_abef1234abcd);

/// Characteristic polled on that service.
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x12345678_1234_abcd_ef34_34567890abcd);

// Timing

/// Minimum time between two reads of the characteristic (seconds).
pub const POLL_INTERVAL_SECS: u64 = 20;

/// Duration of a BLE scan window (seconds).
pub const BLE_SCAN_DURATION_SECS: u64 = 30;

/// Active scan, so scan responses (device names) are requested.
pub const BLE_SCAN_ACTIVE: bool = true;

/// Superloop sleep between ticks (ms).
pub const LOOP_IDLE_MS: u64 = 100;

/// BLE connection interval range (in 1.25 ms units).
/// 24..40 = 30..50 ms; a 20 s poll has no latency pressure.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// Values & time

/// Largest characteristic value kept from one read (bytes).
pub const CHAR_VALUE_MAX_LEN: usize = 64;

/// Offset applied to wall-clock timestamps (seconds): GMT+1 plus 1 h DST.
pub const UTC_OFFSET_SECS: i32 = 3600 + 3600;

/// Unix time baked in at build (`SENSORLINK_UNIX_TIME`), used to seed the
/// wall clock at boot. Without it readings carry no timestamp.
pub const BUILD_UNIX_TIME: Option<&str> = option_env!("SENSORLINK_UNIX_TIME");

// Security

/// Static pairing passkey. Demonstration value: replace per deployment.
pub const PAIRING_PASSKEY: u32 = 123_456;

/// Require an authenticated (MITM-protected) encrypted link.
pub const REQUIRE_MITM: bool = true;

/// Runtime settings of the connection core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientConfig {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub poll_interval: Duration,
    pub scan: ScanParams,
}

impl ClientConfig {
    /// Config for the given identifiers with the reference timing.
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            scan: ScanParams {
                window: Duration::from_secs(BLE_SCAN_DURATION_SECS),
                active: BLE_SCAN_ACTIVE,
            },
        }
    }
}

/// The reference deployment: both identifiers from this module.
pub const fn reference_client_config() -> ClientConfig {
    ClientConfig::new(SERVICE_UUID, CHARACTERISTIC_UUID)
}

/// The reference pairing policy: static passkey, MITM, accept peer
/// security requests, refuse numeric comparison.
pub const fn reference_security_policy() -> SecurityPolicy {
    let mut policy = SecurityPolicy::static_passkey(PAIRING_PASSKEY);
    policy.require_mitm = REQUIRE_MITM;
    policy
}
