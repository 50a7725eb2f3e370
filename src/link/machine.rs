use core::mem;

use super::{ConnectionState, StateKind};
use crate::ble::tracker::{DeviceTracker, PeripheralHandle};
use crate::error::Error;
use crate::output::{Diagnostic, OutputSink};
use crate::radio::{Radio, ScanParams};

/// Owns the link state and every operation that changes it.
///
/// Only the superloop drives this. Discovery callbacks never reach it;
/// they leave handles in the [`DeviceTracker`] slot instead.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    scan: ScanParams,
}

impl ConnectionStateMachine {
    pub const fn new(scan: ScanParams) -> Self {
        Self {
            state: ConnectionState::Idle,
            scan,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// The "should reconnect" signal: set by a failed connect or a lost
    /// link, cleared by [`begin_rediscovery`](Self::begin_rediscovery).
    pub fn evaluate_reconnect_needed(&self) -> bool {
        matches!(self.state, ConnectionState::ReconnectRequested)
    }

    fn enter(&mut self, next: ConnectionState, sink: &mut impl OutputSink) {
        let from = self.state.kind();
        let to = next.kind();
        self.state = next;
        if from != to {
            info!("Link: {} -> {}", from, to);
            sink.diagnostic(Diagnostic::StateChanged { from, to });
        }
    }

    /// `Idle -> Scanning`. No-op in any other state.
    pub fn start<R: Radio>(
        &mut self,
        radio: &mut R,
        tracker: &DeviceTracker,
        sink: &mut impl OutputSink,
    ) {
        if matches!(self.state, ConnectionState::Idle) {
            self.begin_scan(radio, tracker, sink);
        }
    }

    fn begin_scan<R: Radio>(
        &mut self,
        radio: &mut R,
        tracker: &DeviceTracker,
        sink: &mut impl OutputSink,
    ) {
        // A handle left over from an earlier session is stale.
        tracker.clear();
        tracker.arm();

        match radio.start_scan(self.scan) {
            Ok(()) => self.enter(ConnectionState::Scanning, sink),
            Err(e) => {
                // Stay out of the reconnect path; the next poll cycle
                // asks again, which bounds the retry rate.
                warn!("Scan failed to start: {}", e);
                tracker.clear();
                sink.diagnostic(Diagnostic::Failure(Error::TransportError(e)));
                self.enter(ConnectionState::Idle, sink);
            }
        }
    }

    /// `Scanning -> PendingConnect(handle)`.
    ///
    /// A handle arriving in any other state is stale and dropped here.
    pub fn on_advertisement_matched(
        &mut self,
        handle: PeripheralHandle,
        sink: &mut impl OutputSink,
    ) -> bool {
        if !matches!(self.state, ConnectionState::Scanning) {
            debug!("Dropping candidate {} in state {}", handle.address(), self.kind());
            return false;
        }
        self.enter(ConnectionState::PendingConnect(handle), sink);
        true
    }

    /// Connect to the pending peripheral.
    ///
    /// Already connected: no-op, `Ok`. Pending: the handle is consumed
    /// whatever the outcome; failure moves to `ReconnectRequested`.
    /// Nothing pending: `NoCandidateDevice`, state untouched.
    pub async fn attempt_connect<R: Radio>(
        &mut self,
        radio: &mut R,
        sink: &mut impl OutputSink,
    ) -> Result<(), Error> {
        let handle = match mem::replace(&mut self.state, ConnectionState::Idle) {
            ConnectionState::PendingConnect(handle) => handle,
            other => {
                let connected = matches!(other, ConnectionState::Connected);
                self.state = other;
                if connected {
                    return Ok(());
                }
                warn!("Connect requested with no candidate in state {}", self.kind());
                sink.diagnostic(Diagnostic::Failure(Error::NoCandidateDevice));
                return Err(Error::NoCandidateDevice);
            }
        };

        let address = handle.into_address();
        info!("Connecting to {}", address);
        sink.diagnostic(Diagnostic::Connecting(address));

        match radio.connect(&address).await {
            Ok(()) => {
                sink.diagnostic(Diagnostic::Connected(address));
                self.enter_from(StateKind::PendingConnect, ConnectionState::Connected, sink);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", address, e);
                let err = Error::ConnectFailed(e);
                sink.diagnostic(Diagnostic::Failure(err));
                self.enter_from(
                    StateKind::PendingConnect,
                    ConnectionState::ReconnectRequested,
                    sink,
                );
                Err(err)
            }
        }
    }

    /// Like [`enter`](Self::enter) when `self.state` is a placeholder.
    fn enter_from(&mut self, from: StateKind, next: ConnectionState, sink: &mut impl OutputSink) {
        let to = next.kind();
        self.state = next;
        info!("Link: {} -> {}", from, to);
        sink.diagnostic(Diagnostic::StateChanged { from, to });
    }

    /// `Connected -> ReconnectRequested`: a read or liveness check found
    /// the session gone.
    pub fn on_link_lost(&mut self, sink: &mut impl OutputSink) {
        if self.is_connected() {
            warn!("Link lost");
            self.enter(ConnectionState::ReconnectRequested, sink);
        }
    }

    /// The poll cycle found no usable link.
    ///
    /// A scan still inside its window is left alone; an expired scan
    /// counts as `NoCandidateDevice`. A pending connect is about to be
    /// attempted and is not disturbed.
    pub fn request_reconnect<R: Radio>(&mut self, radio: &R, sink: &mut impl OutputSink) {
        match self.state {
            ConnectionState::Scanning if radio.is_scanning() => {
                debug!("Scan still running");
                sink.diagnostic(Diagnostic::ScanInProgress);
            }
            ConnectionState::Scanning => {
                info!("Scan window closed without a candidate");
                sink.diagnostic(Diagnostic::Failure(Error::NoCandidateDevice));
                self.enter(ConnectionState::ReconnectRequested, sink);
            }
            ConnectionState::Idle | ConnectionState::Connected => {
                warn!("Device is not connected, attempting to reconnect");
                sink.diagnostic(Diagnostic::NotConnected);
                self.enter(ConnectionState::ReconnectRequested, sink);
            }
            ConnectionState::PendingConnect(_) | ConnectionState::ReconnectRequested => {}
        }
    }

    /// `ReconnectRequested -> Scanning`. Returns whether a rediscovery
    /// was started.
    pub fn begin_rediscovery<R: Radio>(
        &mut self,
        radio: &mut R,
        tracker: &DeviceTracker,
        sink: &mut impl OutputSink,
    ) -> bool {
        if !self.evaluate_reconnect_needed() {
            return false;
        }
        self.begin_scan(radio, tracker, sink);
        true
    }
}
