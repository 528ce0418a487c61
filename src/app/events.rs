//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  They describe what
//! happened; the wire packets sent to the companion app are a separate,
//! narrower channel.

use crate::app::commands::AppCommand;
use crate::connectivity::AdvertisingProfile;
use crate::error::{CalibrationError, CommsError, Error, ProtocolError, SensorError};
use crate::fsm::StateId;
use crate::protocol::PacketKind;
use crate::sensors::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started.
    Started { state: StateId },

    /// The session state machine moved.
    StateChanged { from: StateId, to: StateId },

    /// A sensor read failed; the cycle was skipped.
    SensorReadFailed(SensorError),

    /// A rep was counted.
    Rep { count: u32 },

    /// Rep counter zeroed by command.
    CounterReset,

    /// A calibration collection began.
    CalibrationStarted { samples: usize },

    /// A baseline was accepted.
    Calibrated { baseline: Vector3 },

    /// A collection was rejected.
    CalibrationFailed(CalibrationError),

    Connected,
    Disconnected,

    /// Advertising switched profile.
    AdvertisingChanged(AdvertisingProfile),

    /// Near-field trigger fired; `delivered` is false when the notice
    /// was deferred until the next connection.
    FieldTriggered { delivered: bool },

    /// Periodic battery sample.
    BatterySampled { percent: u8, low: bool },

    /// Low-battery condition raised.
    LowBattery { percent: u8 },

    /// A command was understood but refused.
    CommandRejected {
        command: AppCommand,
        reason: &'static str,
    },

    /// An inbound write could not be decoded; it was dropped.
    CommandIgnored(ProtocolError),

    /// An outbound packet was not sent.
    PacketDropped { kind: PacketKind, reason: CommsError },

    /// A fault reached the supervisor.
    Fault(Error),

    /// Radio setup failed; sensing continues without connectivity.
    ConnectivityDisabled,
}
