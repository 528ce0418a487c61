//! Calibration, session lifecycle, rep counting and command handling.

use super::mock_hw::{test_config, Rig, AT_REST, SPIKE};

use repclip::app::commands::AppCommand;
use repclip::app::events::AppEvent;
use repclip::app::ports::IndicatorPattern;
use repclip::config::SystemConfig;
use repclip::error::{CalibrationError, ProtocolError};
use repclip::fsm::StateId;
use repclip::protocol::{Packet, StatusFlags};
use repclip::sensors::Vector3;

// ── Boot and calibration ──────────────────────────────────────

#[test]
fn boot_calibration_reaches_idle() {
    let mut rig = Rig::started(test_config());
    assert_eq!(rig.app.state(), StateId::Uncalibrated);
    assert!(rig.app.is_calibrating());
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::CalibrationStarted { samples: 4 })));
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::Calibrating));

    rig.finish_calibration();

    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(rig.app.device().is_calibrated);
    assert_eq!(rig.app.device().calibration_baseline, AT_REST);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::StateChanged { from: StateId::Uncalibrated, to: StateId::Idle }
    )));
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::Advertising));
}

#[test]
fn no_boot_calibration_when_disabled() {
    let rig = Rig::started(SystemConfig {
        calibrate_on_boot: false,
        ..test_config()
    });
    assert!(!rig.app.is_calibrating());
    assert_eq!(rig.app.state(), StateId::Uncalibrated);
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::Uncalibrated));
}

#[test]
fn unstable_calibration_is_rejected() {
    let mut rig = Rig::started(SystemConfig {
        calibration_max_variance: Some(0.001),
        ..test_config()
    });
    for i in 0..4 {
        rig.hw.accel = if i % 2 == 0 { AT_REST } else { Vector3::new(0.5, 0.0, 1.0) };
        rig.advance(20);
    }

    assert!(!rig.app.is_calibrating());
    assert_eq!(rig.app.state(), StateId::Uncalibrated);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::CalibrationFailed(CalibrationError::Unstable { .. })
    )));
    assert_eq!(rig.app.faults().latest().map(|r| r.error.code()), Some(0x05));

    // A still clip calibrates on the next attempt.
    rig.hw.accel = AT_REST;
    rig.send(AppCommand::Calibrate);
    rig.finish_calibration();
    assert_eq!(rig.app.state(), StateId::Idle);
}

#[test]
fn failed_sample_read_does_not_abort_calibration() {
    let mut rig = Rig::started(test_config());
    rig.hw.accel_error = Some(repclip::error::SensorError::BusFailed);
    rig.advance(20);
    assert!(rig.app.is_calibrating());
    assert_eq!(rig.app.metrics().sensor_failures, 1);

    rig.hw.accel_error = None;
    rig.finish_calibration();
    assert_eq!(rig.app.state(), StateId::Idle);
}

// ── Sessions ──────────────────────────────────────────────────

#[test]
fn start_session_refused_while_calibrating() {
    let mut rig = Rig::started(test_config());
    rig.send(AppCommand::StartSession);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::CommandRejected { command: AppCommand::StartSession, reason: "calibration in progress" }
    )));
    assert_eq!(rig.app.state(), StateId::Uncalibrated);
}

#[test]
fn start_session_refused_when_uncalibrated() {
    let mut rig = Rig::started(SystemConfig {
        calibrate_on_boot: false,
        ..test_config()
    });
    rig.send(AppCommand::StartSession);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::CommandRejected { reason: "not calibrated", .. }
    )));
    assert!(!rig.app.device().session_active);
}

#[test]
fn reps_count_only_inside_a_session() {
    let mut rig = Rig::calibrated(test_config());

    rig.rep();
    assert_eq!(rig.app.device().rep_count, 0);
    assert!(!rig.sink.saw(|e| matches!(e, AppEvent::Rep { .. })));

    rig.send(AppCommand::StartSession);
    assert_eq!(rig.app.state(), StateId::Active);
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::SessionActive));

    rig.rep();
    rig.rep();
    assert_eq!(rig.app.device().rep_count, 2);
    assert_eq!(rig.app.metrics().reps, 2);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::Rep { .. })), 2);
    assert_eq!(rig.hw.haptics, vec![30, 30]);
    assert!(rig.hw.patterns.contains(&IndicatorPattern::Rep));
}

#[test]
fn cooldown_suppresses_double_counting() {
    let mut rig = Rig::calibrated(test_config());
    rig.send(AppCommand::StartSession);

    rig.sample(SPIKE, 300);
    rig.sample(AT_REST, 50);
    rig.sample(SPIKE, 50);
    assert_eq!(rig.app.device().rep_count, 1);

    rig.sample(SPIKE, 300);
    assert_eq!(rig.app.device().rep_count, 2);
}

#[test]
fn session_packets_reach_a_connected_app() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.clear();

    rig.send(AppCommand::StartSession);
    rig.rep();
    rig.send(AppCommand::EndSession);

    let packets = rig.hw.packets();
    assert_eq!(packets.len(), 3, "{packets:?}");
    match packets[0] {
        Packet::Status { flags, rep_count, .. } => {
            assert!(flags.contains(StatusFlags::SESSION_ACTIVE));
            assert_eq!(rep_count, 0);
        }
        other => panic!("expected Status, got {other:?}"),
    }
    assert_eq!(packets[1], Packet::RepCount { count: 1 });
    match packets[2] {
        Packet::Status { flags, rep_count, .. } => {
            assert!(!flags.contains(StatusFlags::SESSION_ACTIVE));
            assert_eq!(rep_count, 1);
        }
        other => panic!("expected Status, got {other:?}"),
    }
    assert_eq!(rig.app.state(), StateId::Idle);
}

#[test]
fn inactivity_ends_the_session() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.send(AppCommand::StartSession);
    rig.rep();
    rig.hw.clear();

    let timeout = u64::from(rig.app.config().inactivity_timeout_ms);
    rig.advance(timeout + 1);

    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(!rig.app.device().session_active);
    assert!(rig.hw.packets().iter().any(|p| matches!(
        p,
        Packet::Status { flags, .. } if !flags.contains(StatusFlags::SESSION_ACTIVE)
    )));
}

#[test]
fn activity_keeps_the_session_alive() {
    let mut rig = Rig::calibrated(test_config());
    rig.send(AppCommand::StartSession);
    let timeout = u64::from(rig.app.config().inactivity_timeout_ms);

    // Movement above the rest threshold but below a rep.
    let wiggle = Vector3::new(0.5, 0.0, 1.0);
    for _ in 0..4 {
        rig.sample(wiggle, timeout / 2);
    }
    assert_eq!(rig.app.state(), StateId::Active);
    assert_eq!(rig.app.device().rep_count, 0);
}

#[test]
fn short_session_end_is_not_reported() {
    let mut rig = Rig::calibrated(SystemConfig {
        min_session_reps: 3,
        ..test_config()
    });
    rig.connect_and_handshake();
    rig.send(AppCommand::StartSession);
    rig.rep();
    rig.hw.clear();

    let timeout = u64::from(rig.app.config().inactivity_timeout_ms);
    rig.advance(timeout + 1);

    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(!rig.hw.packets().iter().any(|p| matches!(p, Packet::Status { .. })));
}

#[test]
fn auto_start_on_first_rep() {
    let mut rig = Rig::calibrated(SystemConfig {
        auto_start_on_rep: true,
        ..test_config()
    });
    rig.rep();
    assert_eq!(rig.app.state(), StateId::Active);
    assert_eq!(rig.app.device().rep_count, 1);
}

#[test]
fn recalibration_ends_a_running_session() {
    let mut rig = Rig::calibrated(test_config());
    rig.send(AppCommand::StartSession);
    rig.rep();

    rig.send(AppCommand::Calibrate);
    assert_eq!(rig.app.state(), StateId::Uncalibrated);
    assert!(!rig.app.device().session_active);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::StateChanged { from: StateId::Active, to: StateId::Uncalibrated }
    )));

    rig.finish_calibration();
    assert_eq!(rig.app.state(), StateId::Idle);
    // The counter survives recalibration.
    assert_eq!(rig.app.device().rep_count, 1);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn reset_zeroes_the_counter() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.send(AppCommand::StartSession);
    rig.rep();
    rig.rep();
    rig.hw.clear();

    rig.send(AppCommand::Reset);
    assert_eq!(rig.app.device().rep_count, 0);
    assert_eq!(rig.hw.packets(), vec![Packet::RepCount { count: 0 }]);
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::CounterReset)));
    // Still in the session.
    assert_eq!(rig.app.state(), StateId::Active);
}

#[test]
fn request_status_ignores_trailing_params() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.clear();

    rig.command(&[AppCommand::RequestStatus.id(), 0xFF, 0xFF]);
    match rig.hw.last_packet() {
        Some(Packet::Status { flags, battery_percent, rep_count }) => {
            assert!(flags.contains(StatusFlags::CALIBRATED));
            assert!(flags.contains(StatusFlags::CONNECTED));
            assert_eq!(battery_percent, 100);
            assert_eq!(rep_count, 0);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[test]
fn malformed_commands_are_ignored() {
    let mut rig = Rig::calibrated(test_config());
    let before = rig.app.state();

    rig.command(&[]);
    rig.command(&[0x42]);

    assert!(rig.sink.saw(|e| matches!(e, AppEvent::CommandIgnored(ProtocolError::Empty))));
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::CommandIgnored(ProtocolError::UnknownCommand(0x42))
    )));
    assert_eq!(rig.app.state(), before);
    assert_eq!(rig.app.metrics().faults, 0);
}

#[test]
fn command_flood_is_throttled() {
    let mut rig = Rig::calibrated(SystemConfig {
        command_rate_per_sec: 1,
        command_burst: 3,
        ..test_config()
    });
    for _ in 0..10 {
        rig.send(AppCommand::RequestStatus);
    }
    assert_eq!(rig.app.metrics().dropped_commands, 7);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::CommandIgnored(_))), 0);
}

#[test]
fn throttle_refills_on_the_service_clock() {
    let mut rig = Rig::calibrated(SystemConfig {
        command_rate_per_sec: 1,
        command_burst: 2,
        ..test_config()
    });
    rig.send(AppCommand::RequestStatus);
    rig.send(AppCommand::RequestStatus);
    rig.send(AppCommand::RequestStatus);
    assert_eq!(rig.app.metrics().dropped_commands, 1);

    rig.advance(1_000);
    rig.send(AppCommand::StartSession);
    assert_eq!(rig.app.state(), StateId::Active);
    rig.send(AppCommand::EndSession);
    assert_eq!(rig.app.state(), StateId::Active, "bucket empty again");
    assert_eq!(rig.app.metrics().dropped_commands, 2);
}

#[test]
fn end_session_without_session_is_harmless() {
    let mut rig = Rig::calibrated(test_config());
    rig.send(AppCommand::EndSession);
    assert_eq!(rig.app.state(), StateId::Idle);
}
