//! Fuzz target: command writes into a running service
//!
//! Splits the input into writes on 0xFF and feeds each one to
//! `AppService::on_command` against a connected no-op radio.  The
//! service must never panic, every frame it notifies must decode, and
//! every accepted command id must re-encode to the same byte.
//!
//! cargo fuzz run fuzz_command_stream

#![no_main]

use libfuzzer_sys::fuzz_target;
use repclip::app::events::AppEvent;
use repclip::app::ports::{EventSink, IndicatorPattern, IndicatorPort, RadioPort, SensorPort};
use repclip::app::service::{AppService, DeviceIdentity};
use repclip::config::SystemConfig;
use repclip::connectivity::AdvertisingParams;
use repclip::error::{CommsError, SensorError};
use repclip::protocol::{decode_command, decode_packet, encode_command};
use repclip::sensors::Vector3;

struct NullHw;

impl SensorPort for NullHw {
    fn read_accel(&mut self) -> Result<Vector3, SensorError> {
        Ok(Vector3::new(0.0, 0.0, 1.0))
    }

    fn read_battery_percent(&mut self) -> Result<u8, SensorError> {
        Ok(80)
    }

    fn field_present(&mut self) -> bool {
        false
    }
}

impl RadioPort for NullHw {
    fn notify(&mut self, frame: &[u8]) -> Result<(), CommsError> {
        assert!(decode_packet(frame).is_ok(), "service notified a bad frame");
        Ok(())
    }

    fn set_advertising(&mut self, _: AdvertisingParams, payload: &[u8]) -> Result<(), CommsError> {
        assert!(payload.len() <= 31);
        Ok(())
    }
}

impl IndicatorPort for NullHw {
    fn show(&mut self, _: IndicatorPattern) {}
    fn pulse_haptic(&mut self, _: u16) {}
}

struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let config = SystemConfig {
        calibration_sample_count: 2,
        command_rate_per_sec: 1_000,
        command_burst: 1_000,
        ..SystemConfig::default()
    };
    let mut app = AppService::new(config, DeviceIdentity::default());
    let (mut hw, mut sink) = (NullHw, NullSink);
    let mut now = 0u64;

    app.start(now, &mut hw, &mut sink);
    app.on_connected(now, &mut hw, &mut sink);

    for write in data.split(|b| *b == 0xFF) {
        if let Ok(cmd) = decode_command(write) {
            assert_eq!(encode_command(cmd)[..], write[..1]);
        }
        now += 100;
        app.on_command(now, write, &mut hw, &mut sink);
        app.poll_timers(now, &mut hw, &mut sink);
        app.on_sensor_tick(now, &mut hw, &mut sink);
    }
});
