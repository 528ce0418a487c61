//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the blackboard the session states read from and write
//! to: the process-wide [`DeviceState`], the configuration, the current
//! time, and an outbox of packets the handlers want sent.  The service
//! drains the outbox after every handler, so states never touch the
//! radio directly.

use log::warn;

use crate::config::SystemConfig;
use crate::connectivity::{AdvertisingProfile, ConnectionState};
use crate::protocol::{Packet, StatusFlags};
use crate::sensors::Vector3;

/// Packets a single handler may queue.
pub const OUTBOX_CAP: usize = 8;

// ---------------------------------------------------------------------------
// Device state (single owned instance)
// ---------------------------------------------------------------------------

/// Everything the firmware knows about itself.  Created once at boot and
/// mutated only from inside event handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Changes only while a session runs, except on an explicit reset.
    pub rep_count: u32,
    /// Meaningful only when `is_calibrated`.
    pub calibration_baseline: Vector3,
    pub is_calibrated: bool,
    /// A calibration collection is in progress.
    pub calibrating: bool,
    pub session_active: bool,
    pub last_activity_ms: u64,
    pub battery_percent: u8,
    pub low_battery: bool,
    pub connection: ConnectionState,
    pub advertising_profile: AdvertisingProfile,
    /// A field trigger fired while disconnected; delivered on connect.
    pub field_trigger_pending: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            rep_count: 0,
            calibration_baseline: Vector3::ZERO,
            is_calibrated: false,
            calibrating: false,
            session_active: false,
            last_activity_ms: 0,
            battery_percent: 100,
            low_battery: false,
            connection: ConnectionState::Disconnected,
            advertising_profile: AdvertisingProfile::Normal,
            field_trigger_pending: false,
        }
    }
}

impl DeviceState {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn status_flags(&self) -> StatusFlags {
        let mut f = StatusFlags::default();
        f.set(StatusFlags::CALIBRATED, self.is_calibrated);
        f.set(StatusFlags::SESSION_ACTIVE, self.session_active);
        f.set(StatusFlags::CONNECTED, self.is_connected());
        f.set(
            StatusFlags::AGGRESSIVE_ADV,
            self.advertising_profile == AdvertisingProfile::Aggressive,
        );
        f.set(StatusFlags::FIELD_PENDING, self.field_trigger_pending);
        f.set(StatusFlags::LOW_BATTERY, self.low_battery);
        f.set(StatusFlags::CALIBRATING, self.calibrating);
        f
    }

    /// `Status` snapshot of this state, as of now.
    pub fn status_packet(&self) -> Packet {
        Packet::Status {
            flags: self.status_flags(),
            battery_percent: self.battery_percent,
            rep_count: crate::protocol::codec::wire_count(self.rep_count),
        }
    }

    /// `session_active ⇒ is_calibrated`.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        if self.session_active && !self.is_calibrated {
            return Err("session active while uncalibrated");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session bookkeeping
// ---------------------------------------------------------------------------

/// Why the running session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    Command,
    Inactivity,
    Recalibration,
    Disconnect,
    Fault,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    pub device: DeviceState,
    pub config: SystemConfig,
    /// Monotonic milliseconds, refreshed before each handler.
    pub now_ms: u64,
    /// `rep_count` at session start.
    pub session_start_reps: u32,
    /// Set by whoever ends a session, consumed by the Active exit action.
    pub end_reason: Option<SessionEndReason>,
    outbox: heapless::Vec<Packet, OUTBOX_CAP>,
}

impl FsmContext {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            device: DeviceState::default(),
            config,
            now_ms: 0,
            session_start_reps: 0,
            end_reason: None,
            outbox: heapless::Vec::new(),
        }
    }

    /// Queue a packet for the service to send.
    pub fn send(&mut self, packet: Packet) {
        if self.outbox.push(packet).is_err() {
            warn!("FSM: outbox full, {:?} dropped", packet.kind());
        }
    }

    /// Take every queued packet, oldest first.
    pub fn take_outbox(&mut self) -> heapless::Vec<Packet, OUTBOX_CAP> {
        core::mem::take(&mut self.outbox)
    }

    /// Reps counted since the session began.
    pub fn session_reps(&self) -> u32 {
        self.device.rep_count.saturating_sub(self.session_start_reps)
    }
}
