//! BLE GATT adapter.
//!
//! Exposes a UART-style service: the companion app writes commands to
//! one characteristic and subscribes to packet notifications on another.
//! A third, optional characteristic mirrors field-trigger notices.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: in-memory simulation for host-side tests.
//!
//! ## GATT service layout
//!
//! | Characteristic | UUID                         | Perms        |
//! |----------------|------------------------------|--------------|
//! | Command (RX)   | `6e400002-…-e50e24dcca9e`    | Write        |
//! | Telemetry (TX) | `6e400003-…-e50e24dcca9e`    | Notify       |
//! | Field          | `6e400004-…-e50e24dcca9e`    | Read+Notify  |
//!
//! The layout is fixed for the product's lifetime and lives in
//! [`GATT_TABLE`]; registration walks the table one characteristic at a
//! time as Bluedroid acknowledges each step.
//!
//! Bluedroid callbacks run in the Bluetooth task.  They touch only
//! atomics and the [`COMMAND_QUEUE`] mutex, and hand work to the main
//! loop through the event queue.

use std::sync::Mutex;

use log::{debug, info, warn};

use crate::connectivity::AdvertisingParams;
use crate::error::CommsError;
#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};
use crate::protocol::MAX_FRAME_LEN;

// ───────────────────────────────────────────────────────────────
// Static GATT descriptor table
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_COMMAND: u128 = 0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_TELEMETRY: u128 = 0x6e40_0003_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_FIELD: u128 = 0x6e40_0004_b5a3_f393_e0a9_e50e_24dc_ca9e;

/// Client Characteristic Configuration descriptor.
pub const CCCD_UUID16: u16 = 0x2902;

/// Which role a characteristic plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharRole {
    Command,
    Telemetry,
    Field,
}

#[derive(Debug, Clone, Copy)]
pub struct CharDescriptor {
    pub role: CharRole,
    pub uuid: u128,
    pub readable: bool,
    pub writable: bool,
    pub notify: bool,
}

pub const GATT_TABLE: [CharDescriptor; 3] = [
    CharDescriptor {
        role: CharRole::Command,
        uuid: CHAR_COMMAND,
        readable: false,
        writable: true,
        notify: false,
    },
    CharDescriptor {
        role: CharRole::Telemetry,
        uuid: CHAR_TELEMETRY,
        readable: false,
        writable: false,
        notify: true,
    },
    CharDescriptor {
        role: CharRole::Field,
        uuid: CHAR_FIELD,
        readable: true,
        writable: false,
        notify: true,
    },
];

/// Attribute handles the service needs: the declaration, two per
/// characteristic, one CCCD per notifying characteristic.
pub const fn service_handle_count() -> u16 {
    let mut n = 1;
    let mut i = 0;
    while i < GATT_TABLE.len() {
        n += 2;
        if GATT_TABLE[i].notify {
            n += 1;
        }
        i += 1;
    }
    n
}

// ───────────────────────────────────────────────────────────────
// Inbound command queue (BT task → main loop)
// ───────────────────────────────────────────────────────────────

/// One raw command write.
pub type CommandBytes = heapless::Vec<u8, MAX_FRAME_LEN>;

const COMMAND_QUEUE_DEPTH: usize = 4;

/// Writes waiting for the main loop.  Oldest first; a full queue drops
/// the new write.
pub static COMMAND_QUEUE: Mutex<heapless::Deque<CommandBytes, COMMAND_QUEUE_DEPTH>> =
    Mutex::new(heapless::Deque::new());

/// Queue one write to the command characteristic.  Returns `false` when
/// the write was dropped; the caller raises
/// [`CommandReceived`](crate::events::Event::CommandReceived) otherwise.
pub fn receive_command_write(data: &[u8]) -> bool {
    let mut bytes = CommandBytes::new();
    if bytes.extend_from_slice(data).is_err() {
        warn!("BLE: command write of {} bytes exceeds MTU, dropped", data.len());
        return false;
    }
    let queued = COMMAND_QUEUE
        .lock()
        .map(|mut q| q.push_back(bytes).is_ok())
        .unwrap_or(false);
    if !queued {
        warn!("BLE: command queue full, write dropped");
    }
    queued
}

/// Next pending command write, if any.
pub fn take_command() -> Option<CommandBytes> {
    COMMAND_QUEUE.lock().ok().and_then(|mut q| q.pop_front())
}

// ───────────────────────────────────────────────────────────────
// Adapter state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ── ESP-IDF BLE static state (atomics) ────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_HANDLES: [AtomicU32; GATT_TABLE.len()] =
    [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];
/// Set once every characteristic is registered.
#[cfg(target_os = "espidf")]
static BLE_READY: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_SETUP_FAILED: AtomicBool = AtomicBool::new(false);
/// Current advertising interval bounds, in 0.625 ms units.
#[cfg(target_os = "espidf")]
static ADV_MIN: AtomicU32 = AtomicU32::new(0x200);
#[cfg(target_os = "espidf")]
static ADV_MAX: AtomicU32 = AtomicU32::new(0x258);

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: esp_bt_uuid_t is plain data; all-zero is a valid value.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: as above.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

/// Register characteristic `step` of [`GATT_TABLE`].
#[cfg(target_os = "espidf")]
unsafe fn add_table_char(svc_handle: u16, step: usize) {
    use esp_idf_svc::sys::*;
    let Some(desc) = GATT_TABLE.get(step) else {
        return;
    };
    let mut perm = 0u32;
    let mut prop = 0u32;
    if desc.readable {
        perm |= ESP_GATT_PERM_READ;
        prop |= ESP_GATT_CHAR_PROP_BIT_READ;
    }
    if desc.writable {
        perm |= ESP_GATT_PERM_WRITE;
        prop |= ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR;
    }
    if desc.notify {
        prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
    }
    let mut char_uuid = uuid128_to_esp(desc.uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

/// Move to the next characteristic, or finish registration.
#[cfg(target_os = "espidf")]
unsafe fn advance_char_step(svc_handle: u16) {
    let next = BLE_CHAR_STEP.fetch_add(1, AtomicOrdering::Relaxed) as usize + 1;
    if next < GATT_TABLE.len() {
        unsafe { add_table_char(svc_handle, next) };
    } else {
        BLE_READY.store(true, AtomicOrdering::Release);
        log::info!("BLE GATTS: all {} characteristics registered", GATT_TABLE.len());
    }
}

#[cfg(target_os = "espidf")]
fn handle_for(role: CharRole) -> u16 {
    GATT_TABLE
        .iter()
        .position(|d| d.role == role)
        .map_or(0, |i| BLE_CHAR_HANDLES[i].load(AtomicOrdering::Relaxed) as u16)
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising_with_current_params() {
    use esp_idf_svc::sys::*;
    // SAFETY: esp_ble_adv_params_t is plain data.
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: ADV_MIN.load(AtomicOrdering::Relaxed) as u16,
        adv_int_max: ADV_MAX.load(AtomicOrdering::Relaxed) as u16,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    };
    unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => {
            if !BLE_CONNECTED.load(AtomicOrdering::Relaxed) {
                unsafe { start_advertising_with_current_params() };
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::debug!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::debug!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(u32::from(gatts_if), AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            let ret = unsafe {
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, service_handle_count())
            };
            if ret != ESP_OK {
                BLE_SETUP_FAILED.store(true, AtomicOrdering::Relaxed);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = unsafe { &(*param).create };
            if p.status != esp_gatt_status_t_ESP_GATT_OK {
                log::error!("BLE GATTS: service create failed ({})", p.status);
                BLE_SETUP_FAILED.store(true, AtomicOrdering::Relaxed);
                return;
            }
            let svc_handle = p.service_handle;
            BLE_SVC_HANDLE.store(u32::from(svc_handle), AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
            }
            BLE_CHAR_STEP.store(0, AtomicOrdering::Relaxed);
            unsafe { add_table_char(svc_handle, 0) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = unsafe { &(*param).add_char };
            let step = BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) as usize;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            let Some(desc) = GATT_TABLE.get(step) else {
                return;
            };
            BLE_CHAR_HANDLES[step].store(u32::from(p.attr_handle), AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: {:?} char (handle={})", desc.role, p.attr_handle);
            if desc.notify {
                let mut cccd = uuid16_to_esp(CCCD_UUID16);
                unsafe {
                    esp_ble_gatts_add_char_descr(
                        svc_handle,
                        &mut cccd,
                        (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    );
                }
            } else {
                unsafe { advance_char_step(svc_handle) };
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            unsafe { advance_char_step(svc_handle) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            BLE_CONN_ID.store(u32::from(p.conn_id), AtomicOrdering::Relaxed);
            BLE_CONNECTED.store(true, AtomicOrdering::Relaxed);
            push_event(Event::BleConnected);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONNECTED.store(false, AtomicOrdering::Relaxed);
            push_event(Event::BleDisconnected);
            // The service pushes fresh advertising data on disconnect;
            // restart here too in case that update is refused.
            unsafe { start_advertising_with_current_params() };
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            if p.handle == handle_for(CharRole::Command) && !p.value.is_null() {
                let data = unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) };
                if receive_command_write(data) {
                    push_event(Event::CommandReceived);
                }
            }
        }
        _ => {}
    }
}

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<24>,
    params: Option<AdvertisingParams>,
    /// Simulation: frames notified so far.
    #[cfg(not(target_os = "espidf"))]
    sim_sent: heapless::Vec<heapless::Vec<u8, MAX_FRAME_LEN>, 16>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
            params: None,
            #[cfg(not(target_os = "espidf"))]
            sim_sent: heapless::Vec::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == BleState::Connected
    }

    /// Bring up the controller and register the GATT service.
    pub fn start(&mut self) -> Result<(), CommsError> {
        info!("BLE: starting as '{}'", self.device_name);
        match self.platform_start() {
            Ok(()) => {
                self.state = BleState::Advertising;
                Ok(())
            }
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    /// Track link state as reported by the event queue.
    pub fn on_central_connected(&mut self) {
        if self.state != BleState::Failed {
            self.state = BleState::Connected;
        }
    }

    pub fn on_central_disconnected(&mut self) {
        if self.state == BleState::Connected {
            self.state = BleState::Advertising;
        }
    }

    /// Notify one frame on the telemetry characteristic.
    pub fn notify(&mut self, frame: &[u8]) -> Result<(), CommsError> {
        match self.state {
            BleState::Failed => return Err(CommsError::Disabled),
            BleState::Connected => {}
            _ => return Err(CommsError::NotConnected),
        }
        self.platform_notify(frame)
    }

    /// Remember the interval bounds and push the raw advertising payload.
    pub fn set_advertising(
        &mut self,
        params: AdvertisingParams,
        payload: &[u8],
    ) -> Result<(), CommsError> {
        if self.state == BleState::Failed {
            return Err(CommsError::Disabled);
        }
        self.params = Some(params);
        self.platform_set_advertising(params, payload)
    }

    pub fn advertising_params(&self) -> Option<AdvertisingParams> {
        self.params
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        // SAFETY: called once from the main task before the event loop;
        // every pointer handed to the stack outlives the call.
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK {
                log::error!("BLE: bt_controller_init failed ({})", ret);
                return Err(CommsError::ServiceSetupFailed);
            }
            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK {
                log::error!("BLE: bt_controller_enable failed ({})", ret);
                return Err(CommsError::ServiceSetupFailed);
            }
            let ret = esp_bluedroid_init();
            if ret != ESP_OK {
                log::error!("BLE: bluedroid_init failed ({})", ret);
                return Err(CommsError::ServiceSetupFailed);
            }
            let ret = esp_bluedroid_enable();
            if ret != ESP_OK {
                log::error!("BLE: bluedroid_enable failed ({})", ret);
                return Err(CommsError::ServiceSetupFailed);
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            let ret = esp_ble_gatts_app_register(0);
            if ret != ESP_OK {
                log::error!("BLE: gatts_app_register failed ({})", ret);
                return Err(CommsError::ServiceSetupFailed);
            }

            let mut name = heapless::Vec::<u8, 25>::new();
            let _ = name.extend_from_slice(self.device_name.as_bytes());
            let _ = name.push(0);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);
        }

        if BLE_SETUP_FAILED.load(AtomicOrdering::Relaxed) {
            return Err(CommsError::ServiceSetupFailed);
        }
        info!("BLE(espidf): Bluedroid up, service {:032x}", SERVICE_UUID);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), CommsError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, frame: &[u8]) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        if !BLE_READY.load(AtomicOrdering::Acquire) {
            return Err(CommsError::Busy);
        }
        let handle = handle_for(CharRole::Telemetry);
        let conn = BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16;
        let mut buf = heapless::Vec::<u8, MAX_FRAME_LEN>::new();
        buf.extend_from_slice(frame).map_err(|_| CommsError::Busy)?;
        // SAFETY: `buf` outlives the call; the stack copies the value.
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t,
                conn,
                handle,
                buf.len() as u16,
                buf.as_mut_ptr(),
                false,
            )
        };
        if ret == ESP_OK {
            Ok(())
        } else {
            debug!("BLE: notify refused ({})", ret);
            Err(CommsError::Busy)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, frame: &[u8]) -> Result<(), CommsError> {
        let mut copy = heapless::Vec::new();
        copy.extend_from_slice(frame).map_err(|_| CommsError::Busy)?;
        if self.sim_sent.is_full() {
            self.sim_sent.remove(0);
        }
        let _ = self.sim_sent.push(copy);
        debug!("BLE(sim): notify {:02X?}", frame);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_advertising(
        &mut self,
        params: AdvertisingParams,
        payload: &[u8],
    ) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        ADV_MIN.store(u32::from(params.min_interval), AtomicOrdering::Relaxed);
        ADV_MAX.store(u32::from(params.max_interval), AtomicOrdering::Relaxed);

        let mut raw = heapless::Vec::<u8, { crate::connectivity::ADV_PAYLOAD_MAX }>::new();
        raw.extend_from_slice(payload).map_err(|_| CommsError::Busy)?;
        // SAFETY: the stack copies the payload before returning.  The
        // GAP callback restarts advertising once the data is applied.
        let ret = unsafe {
            if !BLE_CONNECTED.load(AtomicOrdering::Relaxed) {
                esp_ble_gap_stop_advertising();
            }
            esp_ble_gap_config_adv_data_raw(raw.as_mut_ptr(), raw.len() as u32)
        };
        if ret == ESP_OK {
            Ok(())
        } else {
            warn!("BLE: adv data refused ({})", ret);
            Err(CommsError::Busy)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_advertising(
        &mut self,
        params: AdvertisingParams,
        payload: &[u8],
    ) -> Result<(), CommsError> {
        debug!(
            "BLE(sim): adv interval {}..{} units, {} byte payload",
            params.min_interval,
            params.max_interval,
            payload.len()
        );
        Ok(())
    }

    /// Simulation: frames notified so far, oldest first.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_sent(&self) -> &[heapless::Vec<u8, MAX_FRAME_LEN>] {
        &self.sim_sent
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
