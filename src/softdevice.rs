//! SoftDevice S140 implementation of the core's [`Radio`].
//!
//! Scanning runs in its own task: `central::scan` is a long-running
//! future whose callback is the only place advertisements appear. The
//! superloop asks for a scan through [`SCAN`] and the callback hands
//! matches to the [`EventDispatcher`]. Connecting, discovery and
//! reads run inline in the superloop on the one [`Connection`].

use core::cell::RefCell;

use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, DiscoverError, ReadError};
use nrf_softdevice::ble::security::{IoCapabilities, PasskeyReply, SecurityHandler};
use nrf_softdevice::ble::{
    central, Address, AddressType, Connection, EncryptError, EncryptionInfo, HvxType, IdentityKey,
    MasterId, SecurityMode, Uuid as SdUuid,
};
use nrf_softdevice::{raw, Softdevice};

use sensorlink::ble::events::{EventDispatcher, RadioEvent, SecurityEvent, SecurityResponse};
use sensorlink::ble::{AddressKind, Advertisement, BdAddr, Uuid};
use sensorlink::config;
use sensorlink::radio::{DiscoveryTarget, Radio, RadioError, ScanControl, ScanParams, ScanSession};

/// Characteristics kept from one service discovery.
const MAX_CHARACTERISTICS: usize = 8;

/// Bonds kept in RAM. Oldest is evicted first.
const MAX_BONDS: usize = 4;

/// Polls of the security mode before a link counts as insecure (200 ms each).
const SECURE_LINK_POLLS: u32 = 25;

/// Stack error code used when a GATT failure carries no raw code.
const GATT_FAILURE: u32 = 0x3000;

static SCAN: ScanSession = ScanSession::new();
static SCAN_STOP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Service the next [`gatt_client::discover`] looks for.
static DISCOVERY: DiscoveryTarget = DiscoveryTarget::new(config::SERVICE_UUID);

fn bd_addr(addr: &Address) -> BdAddr {
    let kind = match addr.address_type() {
        AddressType::Public => AddressKind::Public,
        AddressType::RandomStatic => AddressKind::RandomStatic,
        AddressType::RandomPrivateResolvable => AddressKind::RandomPrivateResolvable,
        AddressType::RandomPrivateNonResolvable | AddressType::Anonymous => {
            AddressKind::RandomPrivateNonResolvable
        }
    };
    BdAddr::new(kind, addr.bytes())
}

fn sd_addr(addr: &BdAddr) -> Address {
    let kind = match addr.kind {
        AddressKind::Public => AddressType::Public,
        AddressKind::RandomStatic => AddressType::RandomStatic,
        AddressKind::RandomPrivateResolvable => AddressType::RandomPrivateResolvable,
        AddressKind::RandomPrivateNonResolvable => AddressType::RandomPrivateNonResolvable,
    };
    Address::new(kind, addr.bytes)
}

fn sd_uuid(id: Uuid) -> SdUuid {
    match id.as_u16() {
        Some(short) => SdUuid::new_16(short),
        None => SdUuid::new_128(&id.to_le_bytes()),
    }
}

/// Scan timeout in the SoftDevice's 10 ms units.
fn scan_timeout(window: Duration) -> u16 {
    (window.as_millis() / 10).min(u16::MAX as u64) as u16
}

/// `ScanControl` handed to callbacks: records the request, the callback's
/// return value does the stopping.
#[derive(Default)]
struct CallbackStop(bool);

impl ScanControl for CallbackStop {
    fn stop_scan(&mut self) {
        self.0 = true;
    }
}

/// Runs one scan per request, feeding every report to `dispatcher`.
#[embassy_executor::task]
pub async fn scan_task(sd: &'static Softdevice, dispatcher: &'static EventDispatcher<'static>) -> ! {
    loop {
        let params = SCAN.next().await;
        // A stop from before this request belongs to an older scan.
        SCAN_STOP.reset();
        if !SCAN.is_running() {
            debug!("BLE scan cancelled before it started");
            continue;
        }
        info!("BLE scan starting ({} ms window)", params.window.as_millis());

        let config = central::ScanConfig {
            active: params.active,
            timeout: scan_timeout(params.window),
            ..Default::default()
        };

        let scan = central::scan(sd, &config, |report| {
            let data = unsafe {
                core::slice::from_raw_parts(report.data.p_data, report.data.len as usize)
            };
            let address = bd_addr(&Address::from_raw(report.peer_addr));
            let adv = Advertisement::new(address, report.rssi, data);

            let mut stop = CallbackStop::default();
            dispatcher.dispatch(RadioEvent::ScanResult(adv), &mut stop);
            if !stop.0 {
                return None;
            }
            // The superloop may rescan before this task loops again.
            SCAN.finish();
            Some(())
        });

        // A match or a stop request has already finished the session.
        match select(scan, SCAN_STOP.wait()).await {
            Either::First(Ok(())) => debug!("BLE scan stopped on a match"),
            Either::First(Err(central::ScanError::Timeout)) => {
                info!("BLE scan window closed");
                SCAN.finish();
            }
            Either::First(Err(e)) => {
                warn!("BLE scan ended with error: {:?}", e);
                SCAN.finish();
            }
            Either::Second(()) => debug!("BLE scan cancelled"),
        }
    }
}

struct StoredBond {
    master_id: MasterId,
    key: EncryptionInfo,
    identity: IdentityKey,
}

/// RAM-only bond table, evicting the oldest entry when full.
#[derive(Default)]
struct BondTable(Vec<StoredBond, MAX_BONDS>);

impl BondTable {
    fn store(&mut self, bond: StoredBond) {
        let table = &mut self.0;
        if let Some(pos) = table.iter().position(|b| b.master_id == bond.master_id) {
            table[pos] = bond;
            return;
        }
        if table.is_full() {
            let evicted = table.remove(0);
            debug!("Bond table full, evicting {}", evicted.identity.addr);
        }
        // Room was made above.
        let _ = table.push(bond);
    }

    fn by_master_id(&self, master_id: MasterId) -> Option<EncryptionInfo> {
        self.0.iter().find(|b| b.master_id == master_id).map(|b| b.key)
    }

    fn by_peer(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        let peer = conn.peer_address();
        self.0
            .iter()
            .find(|b| b.identity.is_match(peer))
            .map(|b| (b.master_id, b.key))
    }
}

/// Answers the SoftDevice's pairing callbacks from the dispatcher's
/// security policy and keeps bonds in RAM.
pub struct PolicyHandler {
    dispatcher: &'static EventDispatcher<'static>,
    bonds: RefCell<BondTable>,
}

impl PolicyHandler {
    pub fn new(dispatcher: &'static EventDispatcher<'static>) -> Self {
        Self {
            dispatcher,
            bonds: RefCell::new(BondTable::default()),
        }
    }

    fn answer(&self, event: SecurityEvent) -> SecurityResponse {
        match self
            .dispatcher
            .dispatch(RadioEvent::Security(event), &mut CallbackStop::default())
        {
            sensorlink::ble::events::EventResponse::Security(response) => response,
            _ => SecurityResponse::Acknowledged,
        }
    }

    /// Bond keys are neither kept nor offered unless the policy bonds.
    fn bonds(&self) -> Option<&RefCell<BondTable>> {
        self.dispatcher.policy().bond.then_some(&self.bonds)
    }

    fn is_secure(&self, mode: SecurityMode) -> bool {
        let policy = self.dispatcher.policy();
        match mode {
            SecurityMode::NoAccess | SecurityMode::Open => false,
            SecurityMode::JustWorks | SecurityMode::Signed => !policy.require_mitm,
            _ => true,
        }
    }
}

impl SecurityHandler for PolicyHandler {
    fn io_capabilities(&self) -> IoCapabilities {
        if self.dispatcher.policy().passkey.is_some() {
            IoCapabilities::KeyboardOnly
        } else {
            IoCapabilities::None
        }
    }

    fn can_recv_security_request(&self, _conn: &Connection) -> bool {
        matches!(
            self.answer(SecurityEvent::SecurityRequest),
            SecurityResponse::Accept(true)
        )
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        self.dispatcher.policy().bond
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        let value = passkey
            .iter()
            .fold(0u32, |acc, d| acc * 10 + d.wrapping_sub(b'0') as u32);
        self.answer(SecurityEvent::PasskeyNotify(value));
    }

    fn enter_passkey(&self, reply: PasskeyReply) {
        match self.answer(SecurityEvent::PasskeyRequest) {
            SecurityResponse::Passkey(Some(_)) => {
                let digits = self.dispatcher.policy().passkey_digits();
                reply.reply(digits.as_ref());
            }
            _ => reply.reply(None),
        }
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("BLE security mode updated: {}", mode);
        self.answer(SecurityEvent::AuthenticationComplete {
            success: self.is_secure(mode),
        });
    }

    fn on_bonded(
        &self,
        _conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        let Some(bonds) = self.bonds() else {
            debug!("Bonding disabled, discarding keys for {}", peer_id.addr);
            return;
        };
        info!("Bonded with {}", peer_id.addr);
        bonds.borrow_mut().store(StoredBond {
            master_id,
            key,
            identity: peer_id,
        });
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.bonds()?.borrow().by_master_id(master_id)
    }

    fn get_peripheral_key(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        self.bonds()?.borrow().by_peer(conn)
    }
}

/// One characteristic as found by discovery.
#[derive(Clone, Copy)]
pub struct SensorCharacteristic {
    uuid: Option<SdUuid>,
    handle: u16,
    readable: bool,
}

/// Discovery result for one service: every characteristic the peer
/// declares under it.
///
/// The SoftDevice asks the client type for its UUID, so the service
/// being resolved is read from [`DISCOVERY`].
pub struct SensorService {
    characteristics: Vec<SensorCharacteristic, MAX_CHARACTERISTICS>,
}

impl gatt_client::Client for SensorService {
    type Event = ();

    fn on_hvx(&self, _conn: &Connection, _type: HvxType, _handle: u16, _data: &[u8]) -> Option<()> {
        None
    }

    fn uuid() -> SdUuid {
        sd_uuid(DISCOVERY.get())
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            characteristics: Vec::new(),
        }
    }

    fn discovered_characteristic(
        &mut self,
        characteristic: &gatt_client::Characteristic,
        _descriptors: &[gatt_client::Descriptor],
    ) {
        let found = SensorCharacteristic {
            uuid: characteristic.uuid,
            handle: characteristic.handle_value,
            readable: characteristic.props.read() != 0,
        };
        if self.characteristics.push(found).is_err() {
            warn!("Too many characteristics, ignoring handle {}", found.handle);
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

fn discover_error(e: DiscoverError) -> RadioError {
    match e {
        DiscoverError::Raw(raw) => RadioError::Raw(raw as u32),
        _ => RadioError::Raw(GATT_FAILURE),
    }
}

fn read_error(e: ReadError) -> RadioError {
    match e {
        ReadError::Disconnected => RadioError::Disconnected,
        ReadError::Raw(raw) => RadioError::Raw(raw as u32),
        _ => RadioError::Raw(GATT_FAILURE),
    }
}

pub struct SoftdeviceRadio {
    sd: &'static Softdevice,
    security: &'static PolicyHandler,
    conn: Option<Connection>,
}

impl SoftdeviceRadio {
    pub fn new(sd: &'static Softdevice, security: &'static PolicyHandler) -> Self {
        Self {
            sd,
            security,
            conn: None,
        }
    }

    fn live(&self) -> Result<&Connection, RadioError> {
        self.conn
            .as_ref()
            .filter(|c| c.is_connected())
            .ok_or(RadioError::Disconnected)
    }

    async fn wait_for_secure_link(&self, conn: &Connection) -> bool {
        for _ in 0..SECURE_LINK_POLLS {
            if self.security.is_secure(conn.security_mode()) {
                return true;
            }
            Timer::after(Duration::from_millis(200)).await;
        }
        false
    }

    /// Encrypt with stored keys, or pair if the peer has none for us.
    async fn secure(&self, conn: &Connection) -> bool {
        match conn.encrypt() {
            Ok(()) => self.wait_for_secure_link(conn).await,
            Err(EncryptError::PeerKeysNotFound) => {
                conn.request_pairing().is_ok() && self.wait_for_secure_link(conn).await
            }
            Err(_) => false,
        }
    }
}

impl ScanControl for SoftdeviceRadio {
    fn stop_scan(&mut self) {
        SCAN_STOP.signal(());
        SCAN.finish();
    }
}

impl Radio for SoftdeviceRadio {
    type Service = SensorService;
    type Characteristic = SensorCharacteristic;

    fn start_scan(&mut self, params: ScanParams) -> Result<(), RadioError> {
        SCAN.request(params);
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        SCAN.is_running()
    }

    async fn connect(&mut self, address: &BdAddr) -> Result<(), RadioError> {
        if let Some(old) = self.conn.take() {
            let _ = old.disconnect();
        }

        let peer = sd_addr(address);
        let whitelist = [&peer];
        let conn_cfg = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
                max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
                slave_latency: config::BLE_SLAVE_LATENCY,
                conn_sup_timeout: config::BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let conn = central::connect_with_security(self.sd, &conn_cfg, self.security)
            .await
            .map_err(|e| match e {
                central::ConnectError::Timeout => RadioError::Timeout,
                central::ConnectError::Raw(raw) => RadioError::Raw(raw as u32),
                _ => RadioError::Raw(GATT_FAILURE),
            })?;

        if self.security.dispatcher.policy().require_mitm && !self.secure(&conn).await {
            warn!("Failed to secure link to {}", defmt::Display2Format(address));
            let _ = conn.disconnect();
            return Err(RadioError::SecurityFailed);
        }

        self.conn = Some(conn);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live().is_ok()
    }

    async fn service(&mut self, id: Uuid) -> Result<Option<SensorService>, RadioError> {
        let conn = self.live()?;
        DISCOVERY.set(id);
        match gatt_client::discover::<SensorService>(conn).await {
            Ok(service) => Ok(Some(service)),
            Err(DiscoverError::ServiceNotFound) => Ok(None),
            Err(e) => Err(discover_error(e)),
        }
    }

    async fn characteristic(
        &mut self,
        service: &SensorService,
        id: Uuid,
    ) -> Result<Option<SensorCharacteristic>, RadioError> {
        let target = sd_uuid(id);
        Ok(service
            .characteristics
            .iter()
            .copied()
            .find(|c| c.uuid == Some(target)))
    }

    fn can_read(&self, characteristic: &SensorCharacteristic) -> bool {
        characteristic.readable
    }

    async fn read_value(
        &mut self,
        characteristic: &SensorCharacteristic,
        buf: &mut [u8],
    ) -> Result<usize, RadioError> {
        let conn = self.live()?;
        gatt_client::read(conn, characteristic.handle, buf)
            .await
            .map_err(read_error)
    }
}
