//! Output sink: where readings and diagnostics go.
//!
//! One line per successful read, one per state change or failure.
//! The firmware sends both to defmt via [`LogSink`]; tests record them.

use core::fmt;

use crate::ble::{BdAddr, Uuid};
use crate::error::Error;
use crate::link::StateKind;
use crate::read::ReadResult;

/// Structured diagnostic emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Diagnostic {
    StateChanged { from: StateKind, to: StateKind },
    /// A connect attempt to the tracked peripheral is starting.
    Connecting(BdAddr),
    Connected(BdAddr),
    /// Identifiers about to be read on a fresh connection.
    Target { service: Uuid, characteristic: Uuid },
    /// The poll found no live link and asked for a reconnect.
    NotConnected,
    /// A scan was still running when the poll came round.
    ScanInProgress,
    Failure(Error),
    /// A reading was taken but the wall clock is unknown.
    TimeUnavailable,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::StateChanged { from, to } => write!(f, "state {} -> {}", from, to),
            Diagnostic::Connecting(addr) => write!(f, "connecting to {}", addr),
            Diagnostic::Connected(addr) => write!(f, "connected to {}", addr),
            Diagnostic::Target {
                service,
                characteristic,
            } => write!(f, "service {}, characteristic {}", service, characteristic),
            Diagnostic::NotConnected => {
                f.write_str("device is not connected, attempting to reconnect")
            }
            Diagnostic::ScanInProgress => f.write_str("scan in progress"),
            Diagnostic::Failure(e) => write!(f, "failure: {}", e),
            Diagnostic::TimeUnavailable => f.write_str("time unavailable"),
        }
    }
}

pub trait OutputSink {
    fn reading(&mut self, reading: &ReadResult);
    fn diagnostic(&mut self, event: Diagnostic);
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn reading(&mut self, reading: &ReadResult) {
        (**self).reading(reading)
    }

    fn diagnostic(&mut self, event: Diagnostic) {
        (**self).diagnostic(event)
    }
}

/// Sink that writes every line to the log (defmt on target).
pub struct LogSink;

impl OutputSink for LogSink {
    fn reading(&mut self, reading: &ReadResult) {
        #[cfg(feature = "defmt")]
        defmt::println!("{}", defmt::Display2Format(reading));
        #[cfg(not(feature = "defmt"))]
        let _ = reading;
    }

    fn diagnostic(&mut self, event: Diagnostic) {
        match event {
            Diagnostic::Failure(_) | Diagnostic::NotConnected | Diagnostic::TimeUnavailable => {
                warn!("{}", event)
            }
            _ => info!("{}", event),
        }
    }
}
