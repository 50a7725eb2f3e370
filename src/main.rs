//! sensorlink firmware - nRF52840 + SoftDevice S140.
//!
//! Boots the SoftDevice, starts the scan task and runs the connection
//! core in a superloop: tick, sleep, repeat. Readings and diagnostics
//! go to defmt over RTT.

#![no_std]
#![no_main]

mod softdevice;

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::Priority;
use embassy_time::{Instant, Timer};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use sensorlink::ble::events::EventDispatcher;
use sensorlink::ble::tracker::DeviceTracker;
use sensorlink::clock::SyncedClock;
use sensorlink::config::{
    reference_client_config, reference_security_policy, BUILD_UNIX_TIME, LOOP_IDLE_MS,
    SERVICE_UUID, UTC_OFFSET_SECS,
};
use sensorlink::output::LogSink;
use sensorlink::SensorClient;

use crate::softdevice::{PolicyHandler, SoftdeviceRadio};

/// Single-slot handoff between the scan callback and the superloop.
static TRACKER: DeviceTracker = DeviceTracker::new(SERVICE_UUID);

static DISPATCHER: EventDispatcher<'static> =
    EventDispatcher::new(&TRACKER, reference_security_policy());

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 0,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 1,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("sensorlink starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(nrf_config);

    let sd = Softdevice::enable(&softdevice_config());
    spawner.must_spawn(softdevice_task(sd));
    spawner.must_spawn(softdevice::scan_task(sd, &DISPATCHER));

    static SECURITY: StaticCell<PolicyHandler> = StaticCell::new();
    let security = SECURITY.init(PolicyHandler::new(&DISPATCHER));

    // No time source on this board beyond what the build baked in.
    let mut clock = SyncedClock::new(UTC_OFFSET_SECS);
    match BUILD_UNIX_TIME {
        Some(text) if clock.sync_from_str(text) => info!("Wall clock seeded from build time {}", text),
        Some(text) => warn!("Ignoring unusable SENSORLINK_UNIX_TIME {}", text),
        None => info!("No wall-clock source, readings carry no timestamp"),
    }

    let mut client = SensorClient::new(
        reference_client_config(),
        &TRACKER,
        SoftdeviceRadio::new(sd, security),
        clock,
        LogSink,
        Instant::now(),
    );
    client.start();

    loop {
        client.tick(Instant::now()).await;
        Timer::after_millis(LOOP_IDLE_MS).await;
    }
}
