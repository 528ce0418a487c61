//! Battery monitoring, sensor failures and the fault supervisor.

use super::mock_hw::{test_config, Rig, AT_REST};

use repclip::app::commands::AppCommand;
use repclip::app::events::AppEvent;
use repclip::app::ports::IndicatorPattern;
use repclip::config::{LowBatteryPolicy, SystemConfig};
use repclip::error::{Error, FaultKind, SensorError};
use repclip::fsm::StateId;
use repclip::protocol::{Packet, StatusFlags};

/// Run until the next periodic battery check has fired.
fn next_battery_check(rig: &mut Rig) {
    let period = u64::from(rig.app.config().battery_check_interval_ms);
    let due = (rig.now / period + 1) * period;
    rig.advance(due - rig.now);
}

fn battery_packets(rig: &Rig) -> Vec<u8> {
    rig.hw
        .packets()
        .iter()
        .filter_map(|p| match p {
            Packet::Battery { percent } => Some(*percent),
            _ => None,
        })
        .collect()
}

// ── Battery ───────────────────────────────────────────────────

#[test]
fn boot_takes_a_battery_reading() {
    let mut rig = Rig::started(test_config());
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::BatterySampled { percent: 100, low: false })));
    rig.hw.battery_percent = 64;
    next_battery_check(&mut rig);
    assert_eq!(rig.app.device().battery_percent, 64);
}

#[test]
fn low_battery_repeats_every_check_by_default() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.battery_percent = 15;
    rig.hw.clear();

    next_battery_check(&mut rig);
    next_battery_check(&mut rig);

    assert_eq!(battery_packets(&rig), vec![15, 15]);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::LowBattery { .. })), 2);
    assert!(rig.hw.patterns.contains(&IndicatorPattern::LowBattery));
    assert!(rig.app.device().low_battery);
}

#[test]
fn latched_low_battery_fires_once() {
    let mut rig = Rig::calibrated(SystemConfig {
        low_battery_policy: LowBatteryPolicy::Latch { rearm_margin: 5 },
        ..test_config()
    });
    rig.connect_and_handshake();
    rig.hw.battery_percent = 15;
    rig.hw.clear();

    next_battery_check(&mut rig);
    next_battery_check(&mut rig);
    assert_eq!(battery_packets(&rig), vec![15]);

    // Charged past threshold + margin, then drained again.
    rig.hw.battery_percent = 30;
    next_battery_check(&mut rig);
    rig.hw.battery_percent = 12;
    next_battery_check(&mut rig);
    assert_eq!(battery_packets(&rig), vec![15, 12]);
}

#[test]
fn low_battery_shows_in_status_flags() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.battery_percent = 10;
    next_battery_check(&mut rig);
    rig.hw.clear();

    rig.send(AppCommand::RequestStatus);
    match rig.hw.last_packet() {
        Some(Packet::Status { flags, battery_percent, .. }) => {
            assert!(flags.contains(StatusFlags::LOW_BATTERY));
            assert_eq!(battery_percent, 10);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[test]
fn battery_change_refreshes_the_advert_while_disconnected() {
    let mut rig = Rig::calibrated(test_config());
    rig.hw.battery_percent = 50;
    rig.hw.clear();

    next_battery_check(&mut rig);

    assert_eq!(rig.hw.adverts.len(), 1);
    let (_, payload) = &rig.hw.adverts[0];
    // Flags (3 bytes), then Battery Service data ending in the level.
    assert_eq!(&payload[3..8], &[4, 0x16, 0x0F, 0x18, 50]);
}

#[test]
fn unchanged_or_connected_battery_keeps_the_advert() {
    let mut rig = Rig::calibrated(test_config());
    rig.hw.clear();
    next_battery_check(&mut rig);
    assert!(rig.hw.adverts.is_empty(), "level unchanged");

    rig.connect();
    rig.hw.battery_percent = 40;
    next_battery_check(&mut rig);
    assert!(rig.hw.adverts.is_empty(), "connected");
}

#[test]
fn battery_read_failure_keeps_the_last_level() {
    let mut rig = Rig::calibrated(test_config());
    rig.hw.battery_error = Some(SensorError::AdcReadFailed);
    let failures = rig.app.metrics().sensor_failures;

    next_battery_check(&mut rig);

    assert_eq!(rig.app.device().battery_percent, 100);
    assert_eq!(rig.app.metrics().sensor_failures, failures + 1);
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::SensorReadFailed(SensorError::AdcReadFailed))));
}

// ── Sensor failures ───────────────────────────────────────────

#[test]
fn failed_accel_read_skips_the_cycle() {
    let mut rig = Rig::calibrated(test_config());
    rig.send(AppCommand::StartSession);
    rig.hw.accel_error = Some(SensorError::BusFailed);

    rig.sample(AT_REST, 10);
    rig.sample(AT_REST, 10);

    assert_eq!(rig.app.metrics().sensor_failures, 2);
    assert_eq!(rig.app.state(), StateId::Active);
    assert_eq!(rig.app.metrics().faults, 0);

    rig.hw.accel_error = None;
    rig.rep();
    assert_eq!(rig.app.device().rep_count, 1);
}

// ── Supervisor ────────────────────────────────────────────────

#[test]
fn unhandled_fault_is_reported_to_the_app() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.clear();

    let err = Error::from(FaultKind::Unhandled("event queue overflow"));
    rig.app.report_fault(rig.now, err, &mut rig.hw, &mut rig.sink);

    assert_eq!(rig.hw.packets(), vec![Packet::Error { code: 0x7F }]);
    assert!(rig.hw.patterns.contains(&IndicatorPattern::Fault));
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::Fault(Error::Fault(FaultKind::Unhandled(_))))));
    assert_eq!(rig.app.faults().total(), 1);
    assert_eq!(rig.app.metrics().faults, 1);
    assert_eq!(rig.app.state(), StateId::Idle);
}

#[test]
fn invariant_violation_ends_the_session() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.send(AppCommand::StartSession);
    rig.hw.clear();

    let err = Error::from(FaultKind::InvariantViolated("session active while uncalibrated"));
    rig.app.report_fault(rig.now, err, &mut rig.hw, &mut rig.sink);

    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(!rig.app.device().session_active);
    assert!(rig.hw.packets().contains(&Packet::Error { code: 0x06 }));
}

#[test]
fn fault_log_keeps_the_most_recent() {
    let mut rig = Rig::calibrated(test_config());
    for _ in 0..10 {
        let err = Error::from(FaultKind::Unhandled("x"));
        rig.app.report_fault(rig.now, err, &mut rig.hw, &mut rig.sink);
    }
    rig.app
        .report_fault(rig.now, SensorError::NotReady.into(), &mut rig.hw, &mut rig.sink);

    assert_eq!(rig.app.faults().total(), 11);
    assert_eq!(
        rig.app.faults().records().len(),
        repclip::diagnostics::FAULT_RING_SLOTS
    );
    assert_eq!(rig.app.faults().latest().map(|r| r.error.code()), Some(0x01));
}

#[test]
fn diagnostics_snapshot_serialises_counters() {
    let mut rig = Rig::calibrated(test_config());
    rig.send(AppCommand::StartSession);
    rig.rep();
    rig.app.disable_connectivity(rig.now, &mut rig.hw, &mut rig.sink);

    let report = rig.app.diagnostics(rig.now);
    assert_eq!(report.metrics.reps, 1);
    assert_eq!(report.last_fault_code, Some(0x02));

    let json = report.to_json().expect("report serialises");
    assert!(json.contains("\"reps\":1"), "{json}");
    assert!(json.contains("\"last_fault_code\":2"), "{json}");
}
