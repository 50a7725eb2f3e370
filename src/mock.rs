//! Scripted radio, clock and sink for host tests.

use std::collections::VecDeque;
use std::vec::Vec;

use chrono::NaiveDateTime;

pub use embassy_futures::block_on;

use crate::ble::{BdAddr, Uuid};
use crate::clock::Clock;
use crate::output::{Diagnostic, OutputSink};
use crate::radio::{Radio, RadioError, ScanControl, ScanParams};
use crate::read::ReadResult;

/// Radio calls in the order they were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan(ScanParams),
    StopScan,
    Connect(BdAddr),
    Service(Uuid),
    Characteristic(Uuid),
    Read(Uuid),
}

pub struct MockRadio {
    pub calls: Vec<Call>,
    /// Popped per connect; empty means success.
    pub connect_results: VecDeque<Result<(), RadioError>>,
    pub scan_start_error: Option<RadioError>,
    pub scanning: bool,
    pub connected: bool,
    /// Services the peer exposes.
    pub services: Vec<Uuid>,
    /// Characteristics the peer exposes, with their readability.
    pub characteristics: Vec<(Uuid, bool)>,
    pub service_error: Option<RadioError>,
    /// Popped per read; empty means `value`.
    pub read_results: VecDeque<Result<Vec<u8>, RadioError>>,
    pub value: Vec<u8>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            connect_results: VecDeque::new(),
            scan_start_error: None,
            scanning: false,
            connected: false,
            services: Vec::new(),
            characteristics: Vec::new(),
            service_error: None,
            read_results: VecDeque::new(),
            value: Vec::new(),
        }
    }

    /// A peer serving `characteristic` (readable) under `service`.
    pub fn serving(service: Uuid, characteristic: Uuid, value: &[u8]) -> Self {
        let mut radio = Self::new();
        radio.services.push(service);
        radio.characteristics.push((characteristic, true));
        radio.value = value.to_vec();
        radio
    }
}

impl ScanControl for MockRadio {
    fn stop_scan(&mut self) {
        self.calls.push(Call::StopScan);
        self.scanning = false;
    }
}

impl Radio for MockRadio {
    type Service = Uuid;
    type Characteristic = (Uuid, bool);

    fn start_scan(&mut self, params: ScanParams) -> Result<(), RadioError> {
        self.calls.push(Call::StartScan(params));
        if let Some(e) = self.scan_start_error {
            return Err(e);
        }
        self.scanning = true;
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        self.scanning
    }

    async fn connect(&mut self, address: &BdAddr) -> Result<(), RadioError> {
        self.calls.push(Call::Connect(*address));
        let result = self.connect_results.pop_front().unwrap_or(Ok(()));
        self.connected = result.is_ok();
        result
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn service(&mut self, id: Uuid) -> Result<Option<Uuid>, RadioError> {
        self.calls.push(Call::Service(id));
        if let Some(e) = self.service_error {
            return Err(e);
        }
        Ok(self.services.iter().copied().find(|s| *s == id))
    }

    async fn characteristic(
        &mut self,
        _service: &Uuid,
        id: Uuid,
    ) -> Result<Option<(Uuid, bool)>, RadioError> {
        self.calls.push(Call::Characteristic(id));
        Ok(self.characteristics.iter().copied().find(|(c, _)| *c == id))
    }

    fn can_read(&self, characteristic: &(Uuid, bool)) -> bool {
        characteristic.1
    }

    async fn read_value(
        &mut self,
        characteristic: &(Uuid, bool),
        buf: &mut [u8],
    ) -> Result<usize, RadioError> {
        self.calls.push(Call::Read(characteristic.0));
        let value = match self.read_results.pop_front() {
            Some(result) => result?,
            None => self.value.clone(),
        };
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }
}

pub struct FixedClock(pub Option<NaiveDateTime>);

impl Clock for FixedClock {
    fn now(&self) -> Option<NaiveDateTime> {
        self.0
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub readings: Vec<ReadResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl OutputSink for RecordingSink {
    fn reading(&mut self, reading: &ReadResult) {
        self.readings.push(reading.clone());
    }

    fn diagnostic(&mut self, event: Diagnostic) {
        self.diagnostics.push(event);
    }
}

/// AD payload advertising `service` as a complete 128-bit list.
pub fn matching_adv(service: Uuid) -> Vec<u8> {
    let mut data = std::vec![0x02, 0x01, 0x06, 17, 0x07];
    data.extend_from_slice(&service.to_le_bytes());
    data
}
