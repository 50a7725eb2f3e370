//! Pairing and trust policy.
//!
//! Nothing here has a `Default`: whoever boots the radio states how
//! passkeys, numeric comparison and peer security requests are handled.

/// How the central answers pairing/security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityPolicy {
    /// Static passkey entered when the peer asks for one. `None` refuses.
    pub passkey: Option<u32>,
    /// Answer to numeric-comparison confirmations.
    pub confirm_numeric_comparison: bool,
    /// Answer to peer-initiated security requests.
    pub accept_security_requests: bool,
    /// Store keys so later connections re-encrypt without pairing.
    pub bond: bool,
    /// Require an authenticated (MITM-protected) link.
    pub require_mitm: bool,
}

/// Largest value a 6-digit BLE passkey can take.
pub const MAX_PASSKEY: u32 = 999_999;

impl SecurityPolicy {
    /// Refuse every pairing interaction.
    pub const fn reject_all() -> Self {
        Self {
            passkey: None,
            confirm_numeric_comparison: false,
            accept_security_requests: false,
            bond: false,
            require_mitm: false,
        }
    }

    /// Static-passkey pairing with MITM protection.
    ///
    /// A passkey above 999999 cannot be typed into a BLE pairing exchange
    /// and is treated as absent.
    pub const fn static_passkey(passkey: u32) -> Self {
        Self {
            passkey: if passkey <= MAX_PASSKEY {
                Some(passkey)
            } else {
                None
            },
            confirm_numeric_comparison: false,
            accept_security_requests: true,
            bond: true,
            require_mitm: true,
        }
    }

    /// Passkey as the six ASCII digits the SoftDevice expects.
    pub fn passkey_digits(&self) -> Option<[u8; 6]> {
        let mut value = self.passkey?;
        let mut digits = [b'0'; 6];
        for d in digits.iter_mut().rev() {
            *d = b'0' + (value % 10) as u8;
            value /= 10;
        }
        Some(digits)
    }
}
