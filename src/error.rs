//! Unified error type for sensorlink.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (feature `defmt`) for on-target logging.
//!
//! None of these are fatal. The state machine and superloop handle
//! every kind locally; [`Error::triggers_reconnect`] decides which
//! ones send the link back through discovery.

use core::fmt;

use crate::radio::RadioError;

/// Top-level error type used across the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // GATT resolution
    /// The connected peripheral does not expose the configured service.
    ServiceNotFound,

    /// The service exists but lacks the configured characteristic.
    CharacteristicNotFound,

    /// The characteristic is present but not readable.
    ReadNotSupported,

    // Link
    /// The radio failed while talking to a live connection.
    TransportError(RadioError),

    /// A connect attempt to the tracked peripheral failed.
    ConnectFailed(RadioError),

    /// A connect was requested with no discovered peripheral to use.
    NoCandidateDevice,
}

impl Error {
    /// Whether this failure means the link is probably gone and a fresh
    /// discovery should follow.
    ///
    /// Resolution failures (`ServiceNotFound`, `CharacteristicNotFound`,
    /// `ReadNotSupported`) keep the link up: a schema mismatch would
    /// otherwise turn into a reconnect storm.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(self, Error::TransportError(_) | Error::ConnectFailed(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ServiceNotFound => f.write_str("service not found"),
            Error::CharacteristicNotFound => f.write_str("characteristic not found"),
            Error::ReadNotSupported => f.write_str("characteristic is not readable"),
            Error::TransportError(e) => write!(f, "transport error: {}", e),
            Error::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            Error::NoCandidateDevice => f.write_str("no candidate device"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_link_failures_trigger_reconnect() {
        assert!(Error::TransportError(RadioError::Disconnected).triggers_reconnect());
        assert!(Error::ConnectFailed(RadioError::Timeout).triggers_reconnect());

        assert!(!Error::ServiceNotFound.triggers_reconnect());
        assert!(!Error::CharacteristicNotFound.triggers_reconnect());
        assert!(!Error::ReadNotSupported.triggers_reconnect());
        assert!(!Error::NoCandidateDevice.triggers_reconnect());
    }

    #[test]
    fn display_includes_radio_cause() {
        let text = std::format!("{}", Error::TransportError(RadioError::Raw(0x3001)));
        assert_eq!(text, "transport error: radio error 0x3001");
    }
}
