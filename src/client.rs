//! The superloop step.
//!
//! [`SensorClient::tick`] is called over and over from one task. Each
//! call, in order:
//!
//! 1. checks the link is still alive (cheap, every tick);
//! 2. restarts discovery if a reconnect was requested;
//! 3. picks up a candidate the discovery callback left behind, connects
//!    to it and takes a first reading straight away;
//! 4. once per poll interval, reads the characteristic, or asks for a
//!    reconnect if there is no link.
//!
//! Steps 1-3 run every tick so reconnecting stays responsive; step 4 is
//! throttled by the [`PollScheduler`].

use embassy_time::Instant;

use crate::ble::tracker::DeviceTracker;
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::link::{ConnectionStateMachine, StateKind};
use crate::output::{Diagnostic, OutputSink};
use crate::poll::PollScheduler;
use crate::radio::Radio;
use crate::read::ReadPipeline;

pub struct SensorClient<'t, R, C, S> {
    radio: R,
    clock: C,
    sink: S,
    tracker: &'t DeviceTracker,
    machine: ConnectionStateMachine,
    scheduler: PollScheduler,
    pipeline: ReadPipeline,
}

impl<'t, R, C, S> SensorClient<'t, R, C, S>
where
    R: Radio,
    C: Clock,
    S: OutputSink,
{
    /// `tracker` must be the one the radio's event dispatcher feeds.
    /// The first poll falls due one interval after `now`.
    pub fn new(
        config: ClientConfig,
        tracker: &'t DeviceTracker,
        radio: R,
        clock: C,
        sink: S,
        now: Instant,
    ) -> Self {
        Self {
            radio,
            clock,
            sink,
            tracker,
            machine: ConnectionStateMachine::new(config.scan),
            scheduler: PollScheduler::new(config.poll_interval, now),
            pipeline: ReadPipeline::new(config.service, config.characteristic),
        }
    }

    /// Kick off the first scan.
    pub fn start(&mut self) {
        self.machine
            .start(&mut self.radio, self.tracker, &mut self.sink);
    }

    pub fn state(&self) -> StateKind {
        self.machine.kind()
    }

    pub fn machine(&self) -> &ConnectionStateMachine {
        &self.machine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// One pass of the superloop.
    pub async fn tick(&mut self, now: Instant) {
        if self.machine.is_connected() && !self.radio.is_connected() {
            self.machine.on_link_lost(&mut self.sink);
        }

        if self.machine.evaluate_reconnect_needed() {
            self.machine
                .begin_rediscovery(&mut self.radio, self.tracker, &mut self.sink);
        }

        if let Some(handle) = self.tracker.take() {
            // A failed connect is already logged and has flipped the state.
            if self.machine.on_advertisement_matched(handle, &mut self.sink)
                && self
                    .machine
                    .attempt_connect(&mut self.radio, &mut self.sink)
                    .await
                    .is_ok()
            {
                self.sink.diagnostic(Diagnostic::Target {
                    service: self.pipeline.service(),
                    characteristic: self.pipeline.characteristic(),
                });
                // Outside the poll gate: the interval baseline is untouched.
                self.read_once().await;
            }
        }

        if self.scheduler.tick(now) {
            self.action_cycle().await;
        }
    }

    async fn action_cycle(&mut self) {
        if !(self.machine.is_connected() && self.radio.is_connected()) {
            self.machine.request_reconnect(&self.radio, &mut self.sink);
            return;
        }
        self.read_once().await;
    }

    async fn read_once(&mut self) {
        match self
            .pipeline
            .read_characteristic(&mut self.radio, &self.clock)
            .await
        {
            Ok(reading) => {
                if reading.timestamp().is_none() {
                    self.sink.diagnostic(Diagnostic::TimeUnavailable);
                }
                self.sink.reading(&reading);
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                self.sink.diagnostic(Diagnostic::Failure(e));
                if e.triggers_reconnect() {
                    self.machine.on_link_lost(&mut self.sink);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::events::{EventDispatcher, RadioEvent};
    use crate::ble::security::SecurityPolicy;
    use crate::ble::{AddressKind, Advertisement, BdAddr};
    use crate::config::{reference_client_config, CHARACTERISTIC_UUID, SERVICE_UUID};
    use crate::error::Error;
    use crate::mock::{block_on, matching_adv, Call, FixedClock, MockRadio, RecordingSink};
    use crate::radio::RadioError;
    use embassy_time::Duration;

    type TestClient<'t> = SensorClient<'t, MockRadio, FixedClock, RecordingSink>;

    const ADDR: BdAddr = BdAddr::new(AddressKind::RandomStatic, [9, 8, 7, 6, 5, 0xC4]);

    fn client(tracker: &DeviceTracker) -> TestClient<'_> {
        SensorClient::new(
            reference_client_config(),
            tracker,
            MockRadio::serving(SERVICE_UUID, CHARACTERISTIC_UUID, b"22.4"),
            FixedClock(None),
            RecordingSink::default(),
            Instant::from_secs(0),
        )
    }

    /// What the radio's scan callback does with a report.
    fn advertise(c: &mut TestClient<'_>, tracker: &DeviceTracker, data: &[u8]) {
        let dispatcher = EventDispatcher::new(tracker, SecurityPolicy::reject_all());
        let adv = Advertisement::new(ADDR, -40, data);
        dispatcher.dispatch(RadioEvent::ScanResult(adv), &mut c.radio);
    }

    fn connected(tracker: &DeviceTracker) -> TestClient<'_> {
        let mut c = client(tracker);
        c.start();
        advertise(&mut c, tracker, &matching_adv(SERVICE_UUID));
        block_on(c.tick(Instant::from_secs(1)));
        assert_eq!(c.state(), StateKind::Connected);
        c
    }

    fn reads(c: &TestClient<'_>) -> usize {
        c.radio
            .calls
            .iter()
            .filter(|x| matches!(x, Call::Read(_)))
            .count()
    }

    #[test]
    fn discovery_to_connection_within_one_tick() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let c = connected(&tracker);

        let calls = &c.radio.calls;
        let stop = calls.iter().position(|x| *x == Call::StopScan).unwrap();
        let connect = calls.iter().position(|x| *x == Call::Connect(ADDR)).unwrap();
        assert!(stop < connect);
        assert!(!tracker.has_candidate());
    }

    #[test]
    fn first_reading_follows_the_connect() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let c = connected(&tracker);

        assert_eq!(c.sink.readings.len(), 1);
        assert_eq!(c.sink.readings[0].value(), b"22.4");
        assert!(c.sink.diagnostics.contains(&Diagnostic::Target {
            service: SERVICE_UUID,
            characteristic: CHARACTERISTIC_UUID,
        }));
    }

    #[test]
    fn reads_once_per_interval_after_the_first() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = connected(&tracker);

        block_on(c.tick(Instant::from_secs(10)));
        block_on(c.tick(Instant::from_secs(19)));
        assert_eq!(c.sink.readings.len(), 1);

        block_on(c.tick(Instant::from_secs(20)));
        block_on(c.tick(Instant::from_secs(21)));
        block_on(c.tick(Instant::from_secs(39)));
        assert_eq!(c.sink.readings.len(), 2);

        block_on(c.tick(Instant::from_secs(40)));
        assert_eq!(c.sink.readings.len(), 3);
        assert_eq!(reads(&c), 3);
    }

    #[test]
    fn missing_time_is_reported_with_the_reading() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let c = connected(&tracker);

        assert_eq!(c.sink.readings.len(), 1);
        assert!(c.sink.diagnostics.contains(&Diagnostic::TimeUnavailable));
    }

    #[test]
    fn failed_first_read_sends_link_back_to_discovery() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = client(&tracker);
        c.radio.read_results.push_back(Err(RadioError::Disconnected));
        c.start();
        advertise(&mut c, &tracker, &matching_adv(SERVICE_UUID));

        block_on(c.tick(Instant::from_secs(1)));
        assert_eq!(c.state(), StateKind::ReconnectRequested);
        assert!(c.sink.readings.is_empty());

        block_on(c.tick(Instant::from_secs(2)));
        assert_eq!(c.state(), StateKind::Scanning);
    }

    #[test]
    fn transport_error_requests_reconnect_then_rescans() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = connected(&tracker);
        c.radio.read_results.push_back(Err(RadioError::Disconnected));

        block_on(c.tick(Instant::from_secs(20)));
        assert_eq!(c.state(), StateKind::ReconnectRequested);
        assert!(c.machine().evaluate_reconnect_needed());

        block_on(c.tick(Instant::from_secs(21)));
        assert_eq!(c.state(), StateKind::Scanning);
        assert!(tracker.is_armed());
    }

    #[test]
    fn resolution_errors_keep_the_link() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = connected(&tracker);
        c.radio.services.clear();

        block_on(c.tick(Instant::from_secs(20)));
        block_on(c.tick(Instant::from_secs(21)));

        assert_eq!(c.state(), StateKind::Connected);
        assert!(!c.machine().evaluate_reconnect_needed());
        assert!(c
            .sink
            .diagnostics
            .contains(&Diagnostic::Failure(Error::ServiceNotFound)));
    }

    #[test]
    fn dropped_link_is_noticed_before_the_poll() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = connected(&tracker);
        c.radio.connected = false;

        block_on(c.tick(Instant::from_secs(2)));
        assert_eq!(c.state(), StateKind::Scanning);
    }

    #[test]
    fn failed_connect_rescans_on_next_tick() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = client(&tracker);
        c.radio.connect_results.push_back(Err(RadioError::Timeout));
        c.start();
        advertise(&mut c, &tracker, &matching_adv(SERVICE_UUID));

        block_on(c.tick(Instant::from_secs(1)));
        assert_eq!(c.state(), StateKind::ReconnectRequested);
        assert_eq!(reads(&c), 0);

        block_on(c.tick(Instant::from_secs(2)));
        assert_eq!(c.state(), StateKind::Scanning);

        advertise(&mut c, &tracker, &matching_adv(SERVICE_UUID));
        block_on(c.tick(Instant::from_secs(3)));
        assert_eq!(c.state(), StateKind::Connected);
    }

    #[test]
    fn expired_scan_without_candidate_starts_a_new_one() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut c = client(&tracker);
        c.start();
        block_on(c.tick(Instant::from_secs(20)));
        assert_eq!(c.state(), StateKind::Scanning);

        // Window closes with nothing found.
        c.radio.scanning = false;
        block_on(c.tick(Instant::from_secs(40)));
        assert_eq!(c.state(), StateKind::ReconnectRequested);

        block_on(c.tick(Instant::from_secs(41)));
        assert_eq!(c.state(), StateKind::Scanning);
        let scans = c
            .radio
            .calls
            .iter()
            .filter(|x| matches!(x, Call::StartScan(_)))
            .count();
        assert_eq!(scans, 2);
    }

    #[test]
    fn custom_interval_is_honoured() {
        let tracker = DeviceTracker::new(SERVICE_UUID);
        let mut cfg = reference_client_config();
        cfg.poll_interval = Duration::from_secs(5);
        let mut c = SensorClient::new(
            cfg,
            &tracker,
            MockRadio::serving(SERVICE_UUID, CHARACTERISTIC_UUID, b"1"),
            FixedClock(None),
            RecordingSink::default(),
            Instant::from_secs(0),
        );
        c.start();
        advertise(&mut c, &tracker, &matching_adv(SERVICE_UUID));
        block_on(c.tick(Instant::from_secs(1)));
        block_on(c.tick(Instant::from_secs(4)));
        assert_eq!(c.sink.readings.len(), 1);
        block_on(c.tick(Instant::from_secs(5)));
        assert_eq!(c.sink.readings.len(), 2);
    }
}
