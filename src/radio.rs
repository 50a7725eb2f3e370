//! Radio capability consumed by the core.
//!
//! The core never touches a BLE stack directly. The firmware binary
//! implements [`Radio`] over the SoftDevice; tests implement it with a
//! scripted fake. Scan results do not come back through this trait:
//! the radio feeds them to [`crate::ble::events::EventDispatcher`] from
//! its own context.

use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use crate::ble::{BdAddr, Uuid};

/// Subset of radio failures the core distinguishes (keeps the enum `Copy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Raw stack error code.
    Raw(u32),
    /// The stack gave up waiting (connect or GATT procedure).
    Timeout,
    /// The link dropped underneath the operation.
    Disconnected,
    /// Scan could not start.
    ScanFailed,
    /// Connected, but the link could not be brought up to the required
    /// security level.
    SecurityFailed,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::Raw(code) => write!(f, "radio error {:#06x}", code),
            RadioError::Timeout => f.write_str("timed out"),
            RadioError::Disconnected => f.write_str("disconnected"),
            RadioError::ScanFailed => f.write_str("scan failed"),
            RadioError::SecurityFailed => f.write_str("link security failed"),
        }
    }
}

/// Parameters of one scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// How long the radio keeps scanning before giving up on its own.
    pub window: Duration,
    /// Active scanning requests scan responses (names live there).
    pub active: bool,
}

/// The one radio operation a discovery callback may perform.
///
/// Scanning and connecting are mutually exclusive radio modes, so a
/// matched advertisement stops the scan before anyone connects.
pub trait ScanControl {
    fn stop_scan(&mut self);
}

/// BLE central operations used by the connection core.
///
/// Calls are bounded: `connect` and the GATT procedures may suspend
/// the caller, but timeouts are the implementation's business.
#[allow(async_fn_in_trait)]
pub trait Radio: ScanControl {
    /// Discovered remote service on the live connection.
    type Service;
    /// Discovered remote characteristic.
    type Characteristic;

    /// Begin scanning. Returns once the scan is running; results are
    /// delivered to the event dispatcher.
    fn start_scan(&mut self, params: ScanParams) -> Result<(), RadioError>;

    /// Whether a scan session is still running.
    fn is_scanning(&self) -> bool;

    async fn connect(&mut self, address: &BdAddr) -> Result<(), RadioError>;

    fn is_connected(&self) -> bool;

    /// Resolve a service by UUID. `Ok(None)` means the peer does not have it.
    async fn service(&mut self, id: Uuid) -> Result<Option<Self::Service>, RadioError>;

    /// Resolve a characteristic by UUID within `service`.
    async fn characteristic(
        &mut self,
        service: &Self::Service,
        id: Uuid,
    ) -> Result<Option<Self::Characteristic>, RadioError>;

    fn can_read(&self, characteristic: &Self::Characteristic) -> bool;

    /// Read the characteristic value into `buf`, returning the number of
    /// bytes written. Longer values are truncated to `buf.len()`.
    async fn read_value(
        &mut self,
        characteristic: &Self::Characteristic,
        buf: &mut [u8],
    ) -> Result<usize, RadioError>;
}

/// Scan requests from the superloop to the task that runs the scan.
///
/// A radio whose scan is a long-running future (rather than a
/// start/stop call pair) keeps one of these in a static. The session
/// counts as running from [`request`](Self::request) until
/// [`finish`](Self::finish); `finish` must come as soon as the scan is
/// told to stop, not once the stack confirms, or a rescan asked for in
/// between is lost.
pub struct ScanSession {
    running: AtomicBool,
    request: Signal<CriticalSectionRawMutex, ScanParams>,
}

impl ScanSession {
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            request: Signal::new(),
        }
    }

    /// Ask for a scan. Ignored while one is already running.
    pub fn request(&self, params: ScanParams) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.request.signal(params);
    }

    /// Wait for the next requested scan.
    pub async fn next(&self) -> ScanParams {
        self.request.wait().await
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

/// The service a statically-typed GATT client discovers next.
///
/// Such clients name their service through an associated function, so
/// the UUID asked for at run time is parked here first.
pub struct DiscoveryTarget(Mutex<CriticalSectionRawMutex, Cell<Uuid>>);

impl DiscoveryTarget {
    pub const fn new(initial: Uuid) -> Self {
        Self(Mutex::new(Cell::new(initial)))
    }

    pub fn set(&self, id: Uuid) {
        self.0.lock(|cell| cell.set(id));
    }

    pub fn get(&self) -> Uuid {
        self.0.lock(|cell| cell.get())
    }
}
