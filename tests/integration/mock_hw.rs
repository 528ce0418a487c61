//! Mock hardware adapter for integration tests.
//!
//! Implements every port the service drives and records each call, so
//! tests can assert on the full history without a radio, an LED or an
//! accelerometer.  Sensor inputs are plain fields the test sets before
//! invoking a handler.

#![allow(dead_code)]

use repclip::app::commands::AppCommand;
use repclip::app::events::AppEvent;
use repclip::app::ports::{EventSink, IndicatorPattern, IndicatorPort, RadioPort, SensorPort};
use repclip::app::service::{AppService, DeviceIdentity};
use repclip::config::SystemConfig;
use repclip::connectivity::AdvertisingParams;
use repclip::error::{CommsError, SensorError};
use repclip::protocol::{decode_packet, encode_command, Packet};
use repclip::sensors::Vector3;

/// Clip lying still, upright.
pub const AT_REST: Vector3 = Vector3::new(0.0, 0.0, 1.0);
/// A jolt well above the default tap threshold.
pub const SPIKE: Vector3 = Vector3::new(2.0, 0.0, 1.0);

// ── MockHw ────────────────────────────────────────────────────

pub struct MockHw {
    pub accel: Vector3,
    pub accel_error: Option<SensorError>,
    pub battery_percent: u8,
    pub battery_error: Option<SensorError>,
    pub field: bool,

    pub notify_error: Option<CommsError>,
    pub frames: Vec<Vec<u8>>,
    pub adverts: Vec<(AdvertisingParams, Vec<u8>)>,

    pub patterns: Vec<IndicatorPattern>,
    pub haptics: Vec<u16>,
}

impl MockHw {
    pub fn new() -> Self {
        Self {
            accel: AT_REST,
            accel_error: None,
            battery_percent: 100,
            battery_error: None,
            field: false,
            notify_error: None,
            frames: Vec::new(),
            adverts: Vec::new(),
            patterns: Vec::new(),
            haptics: Vec::new(),
        }
    }

    /// Every notified frame, decoded.  Panics on a malformed frame.
    pub fn packets(&self) -> Vec<Packet> {
        self.frames
            .iter()
            .map(|f| decode_packet(f).expect("service sent a malformed frame"))
            .collect()
    }

    pub fn last_packet(&self) -> Option<Packet> {
        self.packets().pop()
    }

    pub fn last_advert(&self) -> Option<AdvertisingParams> {
        self.adverts.last().map(|(p, _)| *p)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.adverts.clear();
        self.patterns.clear();
        self.haptics.clear();
    }
}

impl Default for MockHw {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockHw {
    fn read_accel(&mut self) -> Result<Vector3, SensorError> {
        match self.accel_error {
            Some(e) => Err(e),
            None => Ok(self.accel),
        }
    }

    fn read_battery_percent(&mut self) -> Result<u8, SensorError> {
        match self.battery_error {
            Some(e) => Err(e),
            None => Ok(self.battery_percent),
        }
    }

    fn field_present(&mut self) -> bool {
        self.field
    }
}

impl RadioPort for MockHw {
    fn notify(&mut self, frame: &[u8]) -> Result<(), CommsError> {
        if let Some(e) = self.notify_error {
            return Err(e);
        }
        self.frames.push(frame.to_vec());
        Ok(())
    }

    fn set_advertising(
        &mut self,
        params: AdvertisingParams,
        payload: &[u8],
    ) -> Result<(), CommsError> {
        self.adverts.push((params, payload.to_vec()));
        Ok(())
    }
}

impl IndicatorPort for MockHw {
    fn show(&mut self, pattern: IndicatorPattern) {
        self.patterns.push(pattern);
    }

    fn pulse_haptic(&mut self, duration_ms: u16) {
        self.haptics.push(duration_ms);
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saw(&self, pred: impl Fn(&AppEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Defaults tuned for deterministic tests: no smoothing lag, a short
/// calibration, and a command gate that never throttles.
pub fn test_config() -> SystemConfig {
    SystemConfig {
        smoothing_alpha: 1.0,
        calibration_sample_count: 4,
        calibration_interval_ms: 20,
        command_rate_per_sec: 1_000,
        command_burst: 1_000,
        ..SystemConfig::default()
    }
}

pub fn test_identity() -> DeviceIdentity {
    DeviceIdentity {
        tag: [0xAA, 0xBB, 0xCC],
        ..DeviceIdentity::default()
    }
}

/// Service, mock hardware, sink and a hand-driven clock.
pub struct Rig {
    pub app: AppService,
    pub hw: MockHw,
    pub sink: RecordingSink,
    pub now: u64,
}

impl Rig {
    /// Started, not yet calibrated.
    pub fn started(config: SystemConfig) -> Self {
        let mut rig = Self {
            app: AppService::new(config, test_identity()),
            hw: MockHw::new(),
            sink: RecordingSink::new(),
            now: 0,
        };
        rig.app.start(rig.now, &mut rig.hw, &mut rig.sink);
        rig
    }

    /// Started with the boot calibration finished.
    pub fn calibrated(config: SystemConfig) -> Self {
        let mut rig = Self::started(config);
        rig.finish_calibration();
        rig
    }

    /// Poll timers until the running calibration completes or fails.
    pub fn finish_calibration(&mut self) {
        let step = u64::from(self.app.config().calibration_interval_ms);
        for _ in 0..=repclip::config::MAX_CALIBRATION_SAMPLES {
            if !self.app.is_calibrating() {
                break;
            }
            self.advance(step);
        }
        assert!(!self.app.is_calibrating(), "calibration never finished");
    }

    /// Move the clock forward and fire due timers.
    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
        self.app.poll_timers(self.now, &mut self.hw, &mut self.sink);
    }

    /// Move the clock forward in `step` increments, polling each time.
    pub fn run_for(&mut self, ms: u64, step: u64) {
        let end = self.now + ms;
        while self.now < end {
            self.advance(step.min(end - self.now));
        }
    }

    /// One accelerometer tick with `sample`, `dt` after the last event.
    pub fn sample(&mut self, sample: Vector3, dt: u64) {
        self.now += dt;
        self.hw.accel = sample;
        self.app.on_sensor_tick(self.now, &mut self.hw, &mut self.sink);
    }

    /// A spike past the cooldown, then back to rest.
    pub fn rep(&mut self) {
        let cooldown = u64::from(self.app.config().rep_cooldown_ms);
        self.sample(SPIKE, cooldown + 10);
        self.sample(AT_REST, 10);
    }

    pub fn connect(&mut self) {
        self.app.on_connected(self.now, &mut self.hw, &mut self.sink);
    }

    /// Connect and let the handshake go out.
    pub fn connect_and_handshake(&mut self) {
        self.connect();
        let delay = u64::from(self.app.config().handshake_delay_ms);
        self.advance(delay);
    }

    pub fn disconnect(&mut self) {
        self.app.on_disconnected(self.now, &mut self.hw, &mut self.sink);
    }

    /// Write raw bytes to the command characteristic.
    pub fn command(&mut self, bytes: &[u8]) {
        self.app.on_command(self.now, bytes, &mut self.hw, &mut self.sink);
    }

    /// Write `cmd` the way the companion app does.
    pub fn send(&mut self, cmd: AppCommand) {
        self.command(&encode_command(cmd));
    }

    pub fn set_field(&mut self, present: bool) {
        self.hw.field = present;
        self.app.on_field_changed(self.now, &mut self.hw, &mut self.sink);
    }
}
