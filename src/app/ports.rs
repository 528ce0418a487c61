//! Port traits: the hexagonal boundary between domain logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (accelerometer, battery gauge, radio, indicators,
//! event sinks) implement these traits.  The
//! [`AppService`](super::service::AppService) consumes them via generics,
//! so the domain core never touches hardware directly.

use crate::connectivity::AdvertisingParams;
use crate::error::{CommsError, SensorError};
use crate::scheduler::TimerId;
use crate::sensors::Vector3;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

pub trait SensorPort {
    /// One acceleration sample in g.
    fn read_accel(&mut self) -> Result<Vector3, SensorError>;

    /// Battery state of charge, 0–100.
    fn read_battery_percent(&mut self) -> Result<u8, SensorError>;

    /// Current level of the near-field presence line.
    fn field_present(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain → BLE stack)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget access to the GATT notify characteristic and the
/// advertiser.  Nothing here blocks or queues.
pub trait RadioPort {
    /// Notify one encoded frame to the connected central.
    fn notify(&mut self, frame: &[u8]) -> Result<(), CommsError>;

    /// Apply new advertising interval bounds and payload.
    fn set_advertising(
        &mut self,
        params: AdvertisingParams,
        payload: &[u8],
    ) -> Result<(), CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → LED / haptic)
// ───────────────────────────────────────────────────────────────

/// What the status LED should convey.  Transient patterns play once
/// over the steady one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPattern {
    Off,
    // Steady session patterns
    Uncalibrated,
    Calibrating,
    Idle,
    SessionActive,
    // Steady connectivity patterns
    Advertising,
    FastAdvertising,
    Connected,
    // Transient flashes
    Rep,
    FieldTrigger,
    LowBattery,
    Fault,
}

pub trait IndicatorPort {
    fn show(&mut self, pattern: IndicatorPattern);

    /// Drive the vibration motor for `duration_ms`.
    fn pulse_haptic(&mut self, duration_ms: u16);
}

/// Everything the service drives in one handler call.  Taking a single
/// `hw` avoids juggling several mutable borrows of the same adapter.
pub trait Hardware: SensorPort + RadioPort + IndicatorPort {}

impl<T: SensorPort + RadioPort + IndicatorPort> Hardware for T {}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the service)
// ───────────────────────────────────────────────────────────────

/// Callback the [`Scheduler`](crate::scheduler::Scheduler) invokes for
/// every due timer.  The scheduler knows nothing about what a timer
/// means; the delegate decides.
pub trait SchedulerDelegate {
    fn on_timer_fired(&mut self, id: TimerId);
}
