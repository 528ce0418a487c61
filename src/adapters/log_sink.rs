//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per
//! application event to the ESP-IDF logger (UART / USB-CDC in
//! production, stderr on the host).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { state } => info!("START | initial_state={:?}", state),
            AppEvent::StateChanged { from, to } => info!("STATE | {:?} -> {:?}", from, to),
            AppEvent::SensorReadFailed(e) => warn!("SENSOR | read failed: {}", e),
            AppEvent::Rep { count } => info!("REP | count={}", count),
            AppEvent::CounterReset => info!("REP | counter reset"),
            AppEvent::CalibrationStarted { samples } => info!("CAL | collecting {} samples", samples),
            AppEvent::Calibrated { baseline } => info!(
                "CAL | baseline=({:.3}, {:.3}, {:.3})",
                baseline.x, baseline.y, baseline.z
            ),
            AppEvent::CalibrationFailed(e) => warn!("CAL | rejected: {}", e),
            AppEvent::Connected => info!("LINK | connected"),
            AppEvent::Disconnected => info!("LINK | disconnected"),
            AppEvent::AdvertisingChanged(profile) => info!("ADV | profile={:?}", profile),
            AppEvent::FieldTriggered { delivered } => {
                info!("FIELD | triggered, {}", if *delivered { "notified" } else { "deferred" });
            }
            AppEvent::BatterySampled { percent, low } => {
                info!("BATT | {}%{}", percent, if *low { " LOW" } else { "" });
            }
            AppEvent::LowBattery { percent } => warn!("BATT | low battery at {}%", percent),
            AppEvent::CommandRejected { command, reason } => {
                info!("CMD | {:?} rejected: {}", command, reason);
            }
            AppEvent::CommandIgnored(e) => info!("CMD | ignored: {}", e),
            AppEvent::PacketDropped { kind, reason } => info!("LINK | {:?} dropped: {}", kind, reason),
            AppEvent::Fault(e) => warn!("FAULT | {} (code 0x{:02X})", e, e.code()),
            AppEvent::ConnectivityDisabled => warn!("LINK | connectivity disabled"),
        }
    }
}
