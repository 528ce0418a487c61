//! Connectivity Manager: advertising profiles, connection lifecycle and
//! the heartbeat.
//!
//! ```text
//!             field trigger                 deadline / FieldAck / disconnect
//!  Normal ─────────────────────▶ Aggressive ─────────────────────────────▶ Normal
//!  (320–375 ms)                  (20–40 ms, one AggressiveDeadline slot)
//! ```
//!
//! Connect arms the heartbeat and a short handshake delay so the
//! greeting does not race the central's service discovery.  Disconnect
//! disarms both, forces the Normal profile and drops any pending field
//! notice.

use log::info;

use crate::config::SystemConfig;
use crate::fsm::context::DeviceState;
use crate::protocol::Packet;
use crate::scheduler::{Scheduler, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvertisingProfile {
    #[default]
    Normal,
    Aggressive,
}

/// Advertising interval bounds in 0.625 ms controller units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub min_interval: u16,
    pub max_interval: u16,
}

/// Legacy advertising interval range, in controller units.
const ADV_UNITS_MIN: u16 = 0x0020;
const ADV_UNITS_MAX: u16 = 0x4000;

/// Milliseconds → 0.625 ms units, clamped to the legacy range.
pub fn ms_to_adv_units(ms: u16) -> u16 {
    let units = u32::from(ms) * 8 / 5;
    (units.min(u32::from(ADV_UNITS_MAX)) as u16).max(ADV_UNITS_MIN)
}

impl AdvertisingParams {
    pub fn for_profile(profile: AdvertisingProfile, config: &SystemConfig) -> Self {
        let (min_ms, max_ms) = match profile {
            AdvertisingProfile::Normal => (config.normal_adv_min_ms, config.normal_adv_max_ms),
            AdvertisingProfile::Aggressive => {
                (config.aggressive_adv_min_ms, config.aggressive_adv_max_ms)
            }
        };
        Self {
            min_interval: ms_to_adv_units(min_ms),
            max_interval: ms_to_adv_units(max_ms),
        }
    }
}

// ── Advertising payload ───────────────────────────────────────

/// Legacy advertising PDU data limit.
pub const ADV_PAYLOAD_MAX: usize = 31;

pub type AdvPayload = heapless::Vec<u8, ADV_PAYLOAD_MAX>;

const AD_FLAGS: u8 = 0x01;
const AD_NAME_SHORT: u8 = 0x08;
const AD_NAME_COMPLETE: u8 = 0x09;
const AD_SERVICE_DATA_16: u8 = 0x16;
/// LE General Discoverable | BR/EDR not supported.
const FLAGS_LE_GENERAL: u8 = 0x06;
const BATTERY_SERVICE_UUID: u16 = 0x180F;

/// Flags, Battery Service data (when known) and the local name,
/// truncated to a shortened name if it would overflow the PDU.
pub fn build_adv_payload(name: &str, battery_percent: Option<u8>) -> AdvPayload {
    let mut out = AdvPayload::new();
    // Every push below is bounded by the arithmetic on `room`.
    let _ = out.extend_from_slice(&[2, AD_FLAGS, FLAGS_LE_GENERAL]);

    if let Some(pct) = battery_percent {
        let [lo, hi] = BATTERY_SERVICE_UUID.to_le_bytes();
        let _ = out.extend_from_slice(&[4, AD_SERVICE_DATA_16, lo, hi, pct.min(100)]);
    }

    let room = ADV_PAYLOAD_MAX - out.len() - 2;
    if !name.is_empty() && room > 0 {
        let bytes = name.as_bytes();
        let (ad_type, take) = if bytes.len() > room {
            (AD_NAME_SHORT, room)
        } else {
            (AD_NAME_COMPLETE, bytes.len())
        };
        let _ = out.extend_from_slice(&[take as u8 + 1, ad_type]);
        let _ = out.extend_from_slice(&bytes[..take]);
    }
    out
}

// ── Connection lifecycle ──────────────────────────────────────

/// Heartbeat sequencing and profile switching.  Connection and profile
/// state itself lives in [`DeviceState`].
#[derive(Debug, Default)]
pub struct ConnectivityManager {
    heartbeat_seq: u16,
    connections: u32,
}

impl ConnectivityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A central attached.
    pub fn on_connected(
        &mut self,
        device: &mut DeviceState,
        sched: &mut Scheduler,
        config: &SystemConfig,
        now_ms: u64,
    ) {
        device.connection = ConnectionState::Connected;
        self.connections = self.connections.wrapping_add(1);
        self.heartbeat_seq = 0;
        sched.schedule_periodic(TimerId::Heartbeat, now_ms, u64::from(config.heartbeat_interval_ms));
        sched.schedule_once(TimerId::Handshake, now_ms, u64::from(config.handshake_delay_ms));
        info!(
            "Link: connected (#{}), handshake in {} ms",
            self.connections, config.handshake_delay_ms
        );
    }

    /// The central went away.  Returns `true` if the advertising profile
    /// changed and must be pushed to the radio.
    pub fn on_disconnected(&mut self, device: &mut DeviceState, sched: &mut Scheduler) -> bool {
        device.connection = ConnectionState::Disconnected;
        device.field_trigger_pending = false;
        sched.cancel(TimerId::Heartbeat);
        sched.cancel(TimerId::Handshake);
        info!("Link: disconnected");
        self.revert_to_normal(device, sched)
    }

    /// Switch to fast advertising with a fresh deadline.  An already
    /// running deadline is replaced, never stacked.
    pub fn enter_aggressive(
        &mut self,
        device: &mut DeviceState,
        sched: &mut Scheduler,
        config: &SystemConfig,
        now_ms: u64,
    ) {
        sched.schedule_once(
            TimerId::AggressiveDeadline,
            now_ms,
            u64::from(config.aggressive_window_ms),
        );
        if device.advertising_profile != AdvertisingProfile::Aggressive {
            info!(
                "Adv: aggressive for {} ms",
                config.aggressive_window_ms
            );
        }
        device.advertising_profile = AdvertisingProfile::Aggressive;
    }

    /// Back to the Normal profile, cancelling the deadline.  Returns
    /// `true` if the profile actually changed.
    pub fn revert_to_normal(&mut self, device: &mut DeviceState, sched: &mut Scheduler) -> bool {
        sched.cancel(TimerId::AggressiveDeadline);
        if device.advertising_profile == AdvertisingProfile::Normal {
            return false;
        }
        device.advertising_profile = AdvertisingProfile::Normal;
        info!("Adv: back to normal");
        true
    }

    /// Next heartbeat packet.
    pub fn heartbeat(&mut self, now_ms: u64) -> Packet {
        let seq = self.heartbeat_seq;
        self.heartbeat_seq = self.heartbeat_seq.wrapping_add(1);
        Packet::Heartbeat {
            seq,
            uptime_s: u32::try_from(now_ms / 1000).unwrap_or(u32::MAX),
        }
    }
}
