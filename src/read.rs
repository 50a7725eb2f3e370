//! Characteristic read pipeline.
//!
//! Resolve service, resolve characteristic, check it is readable, read,
//! stamp. Each step has its own failure; only a radio failure is a
//! [`Error::TransportError`].

use core::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use heapless::Vec;

use crate::ble::Uuid;
use crate::clock::Clock;
use crate::config::CHAR_VALUE_MAX_LEN;
use crate::error::Error;
use crate::radio::Radio;

/// Raw characteristic bytes as read.
pub type CharValue = Vec<u8, CHAR_VALUE_MAX_LEN>;

/// One timestamped reading. Produced once, handed to the sink, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    value: CharValue,
    timestamp: Option<NaiveDateTime>,
}

impl ReadResult {
    pub fn new(value: CharValue, timestamp: Option<NaiveDateTime>) -> Self {
        Self { value, timestamp }
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Wall-clock time of the read; `None` if the clock was unavailable.
    pub fn timestamp(&self) -> Option<&NaiveDateTime> {
        self.timestamp.as_ref()
    }
}

impl fmt::Display for ReadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("characteristic value at ")?;
        match &self.timestamp {
            Some(ts) => write!(
                f,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                ts.year(),
                ts.month(),
                ts.day(),
                ts.hour(),
                ts.minute(),
                ts.second()
            )?,
            None => f.write_str("<time unavailable>")?,
        }
        write!(f, " was: {}", ValueDisplay(&self.value))
    }
}

/// Printable UTF-8 as text, anything else as hex.
struct ValueDisplay<'a>(&'a [u8]);

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(text) if !text.chars().any(char::is_control) => f.write_str(text),
            _ => {
                for b in self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Reads one characteristic of one service on the live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPipeline {
    service: Uuid,
    characteristic: Uuid,
}

impl ReadPipeline {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    pub async fn read_characteristic<R: Radio, C: Clock>(
        &self,
        radio: &mut R,
        clock: &C,
    ) -> Result<ReadResult, Error> {
        let service = radio
            .service(self.service)
            .await
            .map_err(Error::TransportError)?
            .ok_or(Error::ServiceNotFound)?;

        let characteristic = radio
            .characteristic(&service, self.characteristic)
            .await
            .map_err(Error::TransportError)?
            .ok_or(Error::CharacteristicNotFound)?;

        if !radio.can_read(&characteristic) {
            return Err(Error::ReadNotSupported);
        }

        let mut buf = [0u8; CHAR_VALUE_MAX_LEN];
        let len = radio
            .read_value(&characteristic, &mut buf)
            .await
            .map_err(Error::TransportError)?;

        let mut value = CharValue::new();
        // Cannot fail: `buf` has the same capacity as `value`.
        let _ = value.extend_from_slice(&buf[..len.min(buf.len())]);

        debug!("Read {} bytes from {}", value.len(), self.characteristic);
        Ok(ReadResult::new(value, clock.now()))
    }
}
