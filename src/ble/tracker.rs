//! Target tracking between discovery and connection.
//!
//! The discovery callback is the only producer of [`PeripheralHandle`]s
//! and the superloop the only consumer. They meet in a single slot:
//! the callback [`offer`](DeviceTracker::offer)s at most one handle per
//! scan session, the loop [`take`](DeviceTracker::take)s it, which
//! clears the slot. No locks beyond the critical section `Signal` uses.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::String;

use super::{Advertisement, BdAddr, Uuid};
use crate::radio::ScanControl;

/// A discovered peripheral that advertises the target service.
///
/// Single-use: not `Clone`, consumed by exactly one connect attempt.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralHandle {
    address: BdAddr,
    name: String<32>,
    rssi: i8,
}

impl PeripheralHandle {
    pub fn address(&self) -> &BdAddr {
        &self.address
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Give up the handle, keeping only what a connect needs.
    pub fn into_address(self) -> BdAddr {
        self.address
    }
}

/// Filters scan results for the one peripheral we care about and holds
/// it until the superloop picks it up.
pub struct DeviceTracker {
    target: Uuid,
    /// Cleared after the first match of a scan session.
    armed: AtomicBool,
    slot: Signal<CriticalSectionRawMutex, PeripheralHandle>,
}

impl DeviceTracker {
    pub const fn new(target: Uuid) -> Self {
        Self {
            target,
            armed: AtomicBool::new(false),
            slot: Signal::new(),
        }
    }

    /// Start a new scan session: accept one more match.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Filter one scan result.
    ///
    /// Returns a handle only for a device advertising exactly the target
    /// service, and only for the first such device of the session. The
    /// scan is stopped before the handle is returned.
    pub fn on_scan_result(
        &self,
        adv: &Advertisement<'_>,
        scan: &mut impl ScanControl,
    ) -> Option<PeripheralHandle> {
        if !adv.advertises(self.target) {
            return None;
        }

        if self
            .armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Ignoring repeat match from {}", adv.address);
            return None;
        }

        scan.stop_scan();

        let handle = PeripheralHandle {
            address: adv.address,
            name: adv.name(),
            rssi: adv.rssi,
        };
        info!(
            "Matched target service on {} ({}, rssi {}), scan stopped",
            handle.address,
            handle.name.as_str(),
            handle.rssi
        );
        Some(handle)
    }

    /// Publish a matched handle for the superloop.
    pub fn offer(&self, handle: PeripheralHandle) {
        self.slot.signal(handle);
    }

    /// Take the pending handle, leaving the slot empty.
    pub fn take(&self) -> Option<PeripheralHandle> {
        self.slot.try_take()
    }

    pub fn has_candidate(&self) -> bool {
        self.slot.signaled()
    }

    /// Drop any pending handle and disarm (e.g. before a forced rescan).
    pub fn clear(&self) {
        self.armed.store(false, Ordering::Release);
        self.slot.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::AddressKind;

    const SENSOR: Uuid = Uuid::from_u128(0x12785634_1278_5634_12cd_abef1234abcd);

    #[derive(Default)]
    struct StopCounter(usize);

    impl ScanControl for StopCounter {
        fn stop_scan(&mut self) {
            self.0 += 1;
        }
    }

    fn adv_data(service: Uuid) -> std::vec::Vec<u8> {
        let mut data = std::vec![17, 0x07];
        data.extend_from_slice(&service.to_le_bytes());
        data.extend_from_slice(&[0x04, 0x09, b'T', b'm', b'p']);
        data
    }

    fn addr(last: u8) -> BdAddr {
        BdAddr::new(AddressKind::RandomStatic, [last, 0, 0, 0, 0, 0xC0])
    }

    #[test]
    fn non_matching_service_is_ignored() {
        let tracker = DeviceTracker::new(SENSOR);
        tracker.arm();
        let mut scan = StopCounter::default();

        let other = adv_data(Uuid::from_u16(0x180F));
        let adv = Advertisement::new(addr(1), -60, &other);

        assert!(tracker.on_scan_result(&adv, &mut scan).is_none());
        assert_eq!(scan.0, 0);
        assert!(tracker.is_armed());
    }

    #[test]
    fn match_stops_scan_and_builds_handle() {
        let tracker = DeviceTracker::new(SENSOR);
        tracker.arm();
        let mut scan = StopCounter::default();

        let data = adv_data(SENSOR);
        let adv = Advertisement::new(addr(1), -48, &data);
        let handle = tracker.on_scan_result(&adv, &mut scan).unwrap();

        assert_eq!(scan.0, 1);
        assert_eq!(handle.address(), &addr(1));
        assert_eq!(handle.name(), "Tmp");
        assert_eq!(handle.rssi, -48);
        assert!(!tracker.is_armed());
    }

    #[test]
    fn only_first_match_per_session_is_acted_on() {
        let tracker = DeviceTracker::new(SENSOR);
        tracker.arm();
        let mut scan = StopCounter::default();
        let data = adv_data(SENSOR);

        let first = Advertisement::new(addr(1), -50, &data);
        let second = Advertisement::new(addr(2), -40, &data);
        assert!(tracker.on_scan_result(&first, &mut scan).is_some());
        assert!(tracker.on_scan_result(&second, &mut scan).is_none());
        assert_eq!(scan.0, 1);

        tracker.arm();
        assert!(tracker.on_scan_result(&second, &mut scan).is_some());
    }

    #[test]
    fn unarmed_tracker_never_matches() {
        let tracker = DeviceTracker::new(SENSOR);
        let mut scan = StopCounter::default();
        let data = adv_data(SENSOR);
        let adv = Advertisement::new(addr(1), -50, &data);

        assert!(tracker.on_scan_result(&adv, &mut scan).is_none());
        assert_eq!(scan.0, 0);
    }

    #[test]
    fn slot_hands_off_once() {
        let tracker = DeviceTracker::new(SENSOR);
        tracker.arm();
        let mut scan = StopCounter::default();
        let data = adv_data(SENSOR);
        let adv = Advertisement::new(addr(7), -50, &data);

        assert!(!tracker.has_candidate());
        tracker.offer(tracker.on_scan_result(&adv, &mut scan).unwrap());
        assert!(tracker.has_candidate());

        let handle = tracker.take().unwrap();
        assert_eq!(handle.into_address(), addr(7));
        assert!(tracker.take().is_none());
        assert!(!tracker.has_candidate());
    }

    #[test]
    fn clear_discards_pending_handle() {
        let tracker = DeviceTracker::new(SENSOR);
        tracker.arm();
        let mut scan = StopCounter::default();
        let data = adv_data(SENSOR);
        let adv = Advertisement::new(addr(3), -50, &data);
        tracker.offer(tracker.on_scan_result(&adv, &mut scan).unwrap());

        tracker.clear();
        assert!(tracker.take().is_none());
        assert!(!tracker.is_armed());
    }
}
