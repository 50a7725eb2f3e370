//! Radio-stack events and the callback surface that answers them.
//!
//! The radio calls [`EventDispatcher::dispatch`] from its own context
//! (scan callback, security handler). Dispatch only ever records state
//! or answers the stack: it never connects and never touches the
//! connection state machine.

use super::security::SecurityPolicy;
use super::tracker::DeviceTracker;
use super::Advertisement;
use crate::radio::ScanControl;

/// Pairing-related requests and notifications from the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityEvent {
    /// Peer wants us to enter a passkey.
    PasskeyRequest,
    /// A passkey to show to the user.
    PasskeyNotify(u32),
    /// Numeric comparison: confirm the peer shows the same value.
    ConfirmPin(u32),
    /// Peer asks to raise the link's security level.
    SecurityRequest,
    AuthenticationComplete { success: bool },
}

/// Event kinds delivered by the radio, one variant per callback.
#[derive(Debug, Clone, Copy)]
pub enum RadioEvent<'a> {
    ScanResult(Advertisement<'a>),
    Security(SecurityEvent),
}

/// Answer to a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityResponse {
    Passkey(Option<u32>),
    Confirm(bool),
    Accept(bool),
    Acknowledged,
}

/// What the radio should do after a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventResponse {
    /// Nothing to do.
    None,
    /// A target was matched and handed off; the scan was stopped.
    CandidateFound,
    Security(SecurityResponse),
}

/// Routes radio events to the tracker or the security policy.
pub struct EventDispatcher<'t> {
    tracker: &'t DeviceTracker,
    policy: SecurityPolicy,
}

impl<'t> EventDispatcher<'t> {
    pub const fn new(tracker: &'t DeviceTracker, policy: SecurityPolicy) -> Self {
        Self { tracker, policy }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    pub fn dispatch(&self, event: RadioEvent<'_>, scan: &mut impl ScanControl) -> EventResponse {
        match event {
            RadioEvent::ScanResult(adv) => self.on_scan_result(&adv, scan),
            RadioEvent::Security(ev) => EventResponse::Security(self.on_security(ev)),
        }
    }

    fn on_scan_result(&self, adv: &Advertisement<'_>, scan: &mut impl ScanControl) -> EventResponse {
        debug!(
            "Advertisement: name {}, address {}, rssi {}",
            adv.name().as_str(),
            adv.address,
            adv.rssi
        );

        match self.tracker.on_scan_result(adv, scan) {
            Some(handle) => {
                self.tracker.offer(handle);
                EventResponse::CandidateFound
            }
            None => EventResponse::None,
        }
    }

    fn on_security(&self, event: SecurityEvent) -> SecurityResponse {
        match event {
            SecurityEvent::PasskeyRequest => {
                info!("Passkey request");
                if self.policy.passkey.is_none() {
                    warn!("No passkey configured, refusing");
                }
                SecurityResponse::Passkey(self.policy.passkey)
            }
            SecurityEvent::PasskeyNotify(passkey) => {
                info!("Passkey notify: {}", passkey);
                SecurityResponse::Acknowledged
            }
            SecurityEvent::ConfirmPin(pin) => {
                info!(
                    "Confirm PIN {}: {}",
                    pin,
                    self.policy.confirm_numeric_comparison
                );
                SecurityResponse::Confirm(self.policy.confirm_numeric_comparison)
            }
            SecurityEvent::SecurityRequest => {
                info!(
                    "Security request: {}",
                    self.policy.accept_security_requests
                );
                SecurityResponse::Accept(self.policy.accept_security_requests)
            }
            SecurityEvent::AuthenticationComplete { success } => {
                if success {
                    info!("Authentication complete: pairing succeeded");
                } else {
                    warn!("Authentication complete: pairing failed");
                }
                SecurityResponse::Acknowledged
            }
        }
    }
}
