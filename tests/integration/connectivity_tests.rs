//! Link lifecycle, advertising profiles and the near-field trigger.

use super::mock_hw::{test_config, Rig};

use repclip::app::commands::AppCommand;
use repclip::app::events::AppEvent;
use repclip::app::ports::IndicatorPattern;
use repclip::app::service::DeviceIdentity;
use repclip::config::SystemConfig;
use repclip::connectivity::{AdvertisingParams, AdvertisingProfile, ConnectionState};
use repclip::fsm::StateId;
use repclip::protocol::{Packet, StatusFlags};
use repclip::scheduler::TimerId;

fn normal(config: &SystemConfig) -> AdvertisingParams {
    AdvertisingParams::for_profile(AdvertisingProfile::Normal, config)
}

fn aggressive(config: &SystemConfig) -> AdvertisingParams {
    AdvertisingParams::for_profile(AdvertisingProfile::Aggressive, config)
}

// ── Link lifecycle ────────────────────────────────────────────

#[test]
fn boot_advertises_with_normal_profile() {
    let config = test_config();
    let rig = Rig::started(config.clone());
    assert_eq!(rig.hw.last_advert(), Some(normal(&config)));
    let (_, payload) = rig.hw.adverts.last().unwrap();
    assert!(payload.len() <= 31);
}

#[test]
fn handshake_follows_connect() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect();
    assert!(rig.hw.frames.is_empty(), "handshake waits for the delay");
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::Connected));

    let delay = u64::from(rig.app.config().handshake_delay_ms);
    rig.advance(delay);

    let packets = rig.hw.packets();
    assert_eq!(packets.len(), 2, "{packets:?}");
    assert_eq!(
        packets[0],
        Packet::Handshake {
            rep_count: 0,
            firmware: DeviceIdentity::firmware_version(),
            device: [0xAA, 0xBB, 0xCC],
        }
    );
    match packets[1] {
        Packet::Status { flags, .. } => {
            assert!(flags.contains(StatusFlags::CONNECTED));
            assert!(flags.contains(StatusFlags::CALIBRATED));
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[test]
fn heartbeats_are_sequenced() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.clear();

    let interval = u64::from(rig.app.config().heartbeat_interval_ms);
    rig.run_for(2 * interval, 500);

    let beats: Vec<u16> = rig
        .hw
        .packets()
        .iter()
        .filter_map(|p| match p {
            Packet::Heartbeat { seq, .. } => Some(*seq),
            _ => None,
        })
        .collect();
    assert_eq!(beats, vec![0, 1]);
}

#[test]
fn disconnect_cancels_link_timers() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect();
    rig.disconnect();

    assert_eq!(rig.app.device().connection, ConnectionState::Disconnected);
    assert!(!rig.app.scheduler().is_armed(TimerId::Heartbeat));
    assert!(!rig.app.scheduler().is_armed(TimerId::Handshake));
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::Disconnected)));
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::Advertising));

    rig.advance(1_000);
    assert!(rig.hw.frames.is_empty());
}

#[test]
fn sends_while_disconnected_are_dropped() {
    let mut rig = Rig::calibrated(test_config());
    let before = rig.app.metrics().dropped_sends;
    rig.send(AppCommand::RequestStatus);
    assert!(rig.hw.frames.is_empty());
    assert_eq!(rig.app.metrics().dropped_sends, before + 1);
}

#[test]
fn session_survives_disconnect_by_default() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect();
    rig.send(AppCommand::StartSession);
    rig.disconnect();
    assert_eq!(rig.app.state(), StateId::Active);

    rig.rep();
    assert_eq!(rig.app.device().rep_count, 1);
}

#[test]
fn session_can_end_on_disconnect() {
    let mut rig = Rig::calibrated(SystemConfig {
        end_session_on_disconnect: true,
        ..test_config()
    });
    rig.connect();
    rig.send(AppCommand::StartSession);
    rig.disconnect();
    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(!rig.app.device().session_active);
}

// ── Field trigger ─────────────────────────────────────────────

#[test]
fn field_trigger_while_disconnected_is_deferred() {
    let config = test_config();
    let mut rig = Rig::calibrated(config.clone());
    let trigger_at = rig.now;

    rig.set_field(true);

    assert!(rig.sink.saw(|e| matches!(e, AppEvent::FieldTriggered { delivered: false })));
    assert!(rig.app.device().field_trigger_pending);
    assert_eq!(rig.app.device().advertising_profile, AdvertisingProfile::Aggressive);
    assert_eq!(rig.hw.last_advert(), Some(aggressive(&config)));
    assert!(rig.hw.patterns.contains(&IndicatorPattern::FieldTrigger));
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::FastAdvertising));
    assert_eq!(rig.hw.haptics, vec![80]);

    rig.connect_and_handshake();
    let packets = rig.hw.packets();
    assert_eq!(packets.len(), 3, "{packets:?}");
    assert!(matches!(packets[0], Packet::Handshake { .. }));
    match packets[1] {
        Packet::Status { flags, .. } => {
            assert!(flags.contains(StatusFlags::FIELD_PENDING));
            assert!(flags.contains(StatusFlags::AGGRESSIVE_ADV));
        }
        other => panic!("expected Status, got {other:?}"),
    }
    assert_eq!(
        packets[2],
        Packet::FieldDetected {
            deferred: true,
            at_ms: trigger_at as u32,
        }
    );
    assert!(!rig.app.device().field_trigger_pending);
}

#[test]
fn field_trigger_while_connected_is_immediate() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.clear();

    rig.set_field(true);
    assert_eq!(
        rig.hw.packets(),
        vec![Packet::FieldDetected {
            deferred: false,
            at_ms: rig.now as u32,
        }]
    );
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::FieldTriggered { delivered: true })));
    assert!(!rig.app.device().field_trigger_pending);
}

#[test]
fn aggressive_window_expires() {
    let config = test_config();
    let mut rig = Rig::calibrated(config.clone());
    rig.set_field(true);

    rig.advance(u64::from(config.aggressive_window_ms));

    assert_eq!(rig.app.device().advertising_profile, AdvertisingProfile::Normal);
    assert_eq!(rig.hw.last_advert(), Some(normal(&config)));
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::AdvertisingChanged(AdvertisingProfile::Normal))));
    assert!(!rig.app.scheduler().is_armed(TimerId::AggressiveDeadline));
}

#[test]
fn retrigger_extends_the_window_without_stacking() {
    let config = test_config();
    let window = u64::from(config.aggressive_window_ms);
    let mut rig = Rig::calibrated(config);

    rig.set_field(true);
    rig.set_field(false);
    rig.advance(5_000);
    rig.set_field(true);

    rig.advance(window - 4_000);
    assert_eq!(rig.app.device().advertising_profile, AdvertisingProfile::Aggressive);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::AdvertisingChanged(AdvertisingProfile::Aggressive))),
        1
    );

    rig.advance(4_000);
    assert_eq!(rig.app.device().advertising_profile, AdvertisingProfile::Normal);
}

#[test]
fn field_bounce_is_ignored() {
    let mut rig = Rig::calibrated(test_config());
    rig.set_field(true);
    rig.set_field(false);
    rig.now += 100;
    rig.set_field(true);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::FieldTriggered { .. })), 1);
}

#[test]
fn holding_in_field_does_not_retrigger() {
    let mut rig = Rig::calibrated(test_config());
    rig.set_field(true);
    rig.now += 5_000;
    rig.set_field(true);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::FieldTriggered { .. })), 1);
}

#[test]
fn field_ack_returns_to_normal_advertising() {
    let config = test_config();
    let mut rig = Rig::calibrated(config.clone());
    rig.connect();
    rig.set_field(true);

    rig.send(AppCommand::FieldAck);
    assert_eq!(rig.app.device().advertising_profile, AdvertisingProfile::Normal);
    assert_eq!(rig.hw.last_advert(), Some(normal(&config)));
    assert!(!rig.app.scheduler().is_armed(TimerId::AggressiveDeadline));
}

#[test]
fn disconnect_drops_pending_trigger_and_fast_advertising() {
    let config = test_config();
    let mut rig = Rig::calibrated(config.clone());
    rig.set_field(true);
    rig.connect();
    rig.disconnect();

    assert!(!rig.app.device().field_trigger_pending);
    assert_eq!(rig.app.device().advertising_profile, AdvertisingProfile::Normal);
    assert_eq!(rig.hw.last_advert(), Some(normal(&config)));
}

// ── Connectivity failure ──────────────────────────────────────

#[test]
fn disabled_connectivity_keeps_counting() {
    let mut rig = Rig::calibrated(test_config());
    rig.app.disable_connectivity(rig.now, &mut rig.hw, &mut rig.sink);

    assert!(!rig.app.connectivity_enabled());
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::ConnectivityDisabled)));
    assert_eq!(rig.app.faults().latest().map(|r| r.error.code()), Some(0x02));
    assert_eq!(rig.hw.patterns.last(), Some(&IndicatorPattern::Idle));

    let adverts = rig.hw.adverts.len();
    rig.connect();
    assert_eq!(rig.app.device().connection, ConnectionState::Disconnected);

    rig.send(AppCommand::StartSession);
    rig.rep();
    rig.set_field(true);
    assert_eq!(rig.app.device().rep_count, 1);
    assert!(rig.hw.frames.is_empty());
    assert_eq!(rig.hw.adverts.len(), adverts);
}

#[test]
fn refused_notification_is_counted() {
    let mut rig = Rig::calibrated(test_config());
    rig.connect_and_handshake();
    rig.hw.notify_error = Some(repclip::error::CommsError::Busy);
    let before = rig.app.metrics().dropped_sends;

    rig.send(AppCommand::RequestStatus);

    assert_eq!(rig.app.metrics().dropped_sends, before + 1);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::PacketDropped { reason: repclip::error::CommsError::Busy, .. }
    )));
}
