//! Connection lifecycle.
//!
//! ```text
//!   Idle --start--> Scanning --match--> PendingConnect(h) --ok--> Connected
//!                     ^                        |                    |
//!                     |                       err               link lost
//!                     |                        v                    |
//!                     +--rediscover-- ReconnectRequested <----------+
//! ```
//!
//! `h` is dropped whichever way the connect goes.

mod machine;

use core::fmt;

pub use machine::ConnectionStateMachine;

use crate::ble::tracker::PeripheralHandle;

/// Where the link is. Exactly one state at a time.
///
/// Only `PendingConnect` carries a handle: a connected link keeps no
/// discovery identity, so reconnecting always needs a fresh scan.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    PendingConnect(PeripheralHandle),
    Connected,
    ReconnectRequested,
}

impl ConnectionState {
    pub fn kind(&self) -> StateKind {
        match self {
            ConnectionState::Idle => StateKind::Idle,
            ConnectionState::Scanning => StateKind::Scanning,
            ConnectionState::PendingConnect(_) => StateKind::PendingConnect,
            ConnectionState::Connected => StateKind::Connected,
            ConnectionState::ReconnectRequested => StateKind::ReconnectRequested,
        }
    }
}

/// [`ConnectionState`] without its payload, for logging and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateKind {
    Idle,
    Scanning,
    PendingConnect,
    Connected,
    ReconnectRequested,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateKind::Idle => "Idle",
            StateKind::Scanning => "Scanning",
            StateKind::PendingConnect => "PendingConnect",
            StateKind::Connected => "Connected",
            StateKind::ReconnectRequested => "ReconnectRequested",
        })
    }
}
