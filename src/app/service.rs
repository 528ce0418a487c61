//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the session state machine, the scheduler, the
//! sensing pipeline and every manager.  Each public `on_*` method is one
//! run-to-completion handler: it updates state, ticks the FSM, flushes
//! queued packets through the radio port and refreshes the indicator.
//! All I/O flows through port traits injected at call sites, so the whole
//! service runs against mock adapters on the host.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │          AppService          │
//!   RadioPort ◀──│ FSM · Scheduler · Pipeline    │
//! IndicatorPort ◀─│ Link · Field · Power · Gate  │
//!                 └──────────────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::config::SystemConfig;
use crate::connectivity::{build_adv_payload, AdvertisingParams, AdvertisingProfile, ConnectivityManager};
use crate::diagnostics::{DiagnosticsReport, FaultLog, RuntimeMetrics};
use crate::error::{CommsError, Error, FaultKind};
use crate::field_trigger::FieldTrigger;
use crate::fsm::context::{DeviceState, FsmContext, SessionEndReason};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::power::PowerMonitor;
use crate::protocol::codec::{decode_command, encode, wire_count};
use crate::protocol::gate::CommandGate;
use crate::protocol::Packet;
use crate::scheduler::{Scheduler, TimerId};
use crate::sensors::calibration::{CalibrationManager, CalibrationProgress};
use crate::sensors::pipeline::SensorPipeline;
use crate::sensors::rep_detector::RepDetector;
use crate::sensors::Vector3;

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{EventSink, Hardware, IndicatorPattern, SchedulerDelegate};

/// Haptic pulse on each counted rep.
const REP_HAPTIC_MS: u16 = 30;
/// Haptic pulse on a field trigger.
const FIELD_HAPTIC_MS: u16 = 80;

// ───────────────────────────────────────────────────────────────
// Device identity
// ───────────────────────────────────────────────────────────────

/// Who this unit is, as told to the companion app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Advertised BLE name.
    pub name: heapless::String<24>,
    /// Last three MAC bytes, carried in `Handshake`.
    pub tag: [u8; 3],
    /// `[major, minor, patch]`.
    pub firmware: [u8; 3],
}

impl DeviceIdentity {
    /// Firmware version of this build.
    pub fn firmware_version() -> [u8; 3] {
        [
            env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        ]
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        let mut name = heapless::String::new();
        let _ = name.push_str("repclip");
        Self {
            name,
            tag: [0; 3],
            firmware: Self::firmware_version(),
        }
    }
}

/// Collects due timers so they are handled after the scheduler borrow
/// ends.
#[derive(Default)]
struct FiredTimers(heapless::Vec<TimerId, { TimerId::COUNT }>);

impl SchedulerDelegate for FiredTimers {
    fn on_timer_fired(&mut self, id: TimerId) {
        let _ = self.0.push(id);
    }
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    sched: Scheduler,
    pipeline: SensorPipeline,
    detector: RepDetector,
    calibration: CalibrationManager,
    link: ConnectivityManager,
    field: FieldTrigger,
    power: PowerMonitor,
    gate: CommandGate,
    identity: DeviceIdentity,
    metrics: RuntimeMetrics,
    faults: FaultLog,
    connectivity_enabled: bool,
    /// Trigger time of the deferred `FieldDetected` notice.
    field_pending_at_ms: u32,
    steady: Option<IndicatorPattern>,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig, identity: DeviceIdentity) -> Self {
        let pipeline = SensorPipeline::new(&config);
        let detector = RepDetector::new(&config);
        let calibration = CalibrationManager::new(&config);
        let field = FieldTrigger::new(&config);
        let power = PowerMonitor::new(&config);
        let gate = CommandGate::new(&config);
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::Uncalibrated);

        Self {
            fsm,
            ctx,
            sched: Scheduler::new(),
            pipeline,
            detector,
            calibration,
            link: ConnectivityManager::new(),
            field,
            power,
            gate,
            identity,
            metrics: RuntimeMetrics::default(),
            faults: FaultLog::new(),
            connectivity_enabled: true,
            field_pending_at_ms: 0,
            steady: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter the initial state, arm the periodic battery check, take a
    /// first battery reading, start advertising and, if configured,
    /// begin the boot calibration.
    pub fn start(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        self.ctx.now_ms = now_ms;
        let prev = self.fsm.current_state();
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started { state: prev });
        info!("AppService started in {:?} as {}", prev, self.identity.name);

        self.sched.schedule_periodic(
            TimerId::BatteryCheck,
            now_ms,
            u64::from(self.ctx.config.battery_check_interval_ms),
        );
        self.check_battery(hw, sink);
        if self.apply_advertising(hw) {
            sink.emit(&AppEvent::AdvertisingChanged(self.ctx.device.advertising_profile));
        }
        if self.ctx.config.calibrate_on_boot {
            self.begin_calibration(sink);
        }

        self.fsm.tick(&mut self.ctx);
        self.finish(prev, hw, sink);
    }

    // ── Handlers ──────────────────────────────────────────────

    /// One accelerometer sample tick.
    pub fn on_sensor_tick(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);

        match hw.read_accel() {
            Ok(sample) => self.process_sample(sample, hw, sink),
            Err(e) => {
                self.metrics.sensor_failures = self.metrics.sensor_failures.saturating_add(1);
                warn!("Sensor: read failed, cycle skipped ({e})");
                sink.emit(&AppEvent::SensorReadFailed(e));
            }
        }

        self.fsm.tick(&mut self.ctx);
        self.finish(prev, hw, sink);
    }

    /// A central connected.
    pub fn on_connected(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);
        if self.connectivity_enabled {
            self.link
                .on_connected(&mut self.ctx.device, &mut self.sched, &self.ctx.config, now_ms);
            sink.emit(&AppEvent::Connected);
        } else {
            warn!("Link: connect event while connectivity is disabled");
        }
        self.finish(prev, hw, sink);
    }

    /// The central went away.
    pub fn on_disconnected(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);

        if self.link.on_disconnected(&mut self.ctx.device, &mut self.sched) {
            sink.emit(&AppEvent::AdvertisingChanged(AdvertisingProfile::Normal));
        }
        self.apply_advertising(hw);
        sink.emit(&AppEvent::Disconnected);

        if self.ctx.config.end_session_on_disconnect && self.fsm.current_state() == StateId::Active {
            self.ctx.end_reason = Some(SessionEndReason::Disconnect);
            self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        }

        self.fsm.tick(&mut self.ctx);
        self.finish(prev, hw, sink);
    }

    /// Raw bytes written to the command characteristic.
    pub fn on_command(
        &mut self,
        now_ms: u64,
        bytes: &[u8],
        hw: &mut impl Hardware,
        sink: &mut impl EventSink,
    ) {
        let prev = self.begin(now_ms);

        // The gate keeps its own drop count; see `metrics()`.
        if self.gate.admit(now_ms) {
            match decode_command(bytes) {
                Ok(cmd) => self.dispatch(cmd, hw, sink),
                Err(e) => {
                    info!("Command: ignored ({e})");
                    sink.emit(&AppEvent::CommandIgnored(e));
                }
            }
        }

        self.finish(prev, hw, sink);
    }

    /// The near-field presence line changed; its level is read from the
    /// sensor port.
    pub fn on_field_changed(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);
        let present = hw.field_present();
        if self.field.update(present, now_ms) {
            self.field_triggered(hw, sink);
        }
        self.finish(prev, hw, sink);
    }

    /// Fire every due timer.
    pub fn poll_timers(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);

        let mut fired = FiredTimers::default();
        self.sched.poll(now_ms, &mut fired);
        for id in fired.0 {
            debug!("Timer: {} fired at {now_ms}", id.label());
            match id {
                TimerId::AggressiveDeadline => {
                    if self.link.revert_to_normal(&mut self.ctx.device, &mut self.sched) {
                        self.apply_advertising(hw);
                        sink.emit(&AppEvent::AdvertisingChanged(AdvertisingProfile::Normal));
                    }
                }
                TimerId::Heartbeat => {
                    let beat = self.link.heartbeat(now_ms);
                    self.ctx.send(beat);
                }
                TimerId::Handshake => self.send_handshake(),
                TimerId::BatteryCheck => self.check_battery(hw, sink),
                TimerId::CalibrationSample => self.calibration_sample(hw, sink),
            }
        }

        self.fsm.tick(&mut self.ctx);
        self.finish(prev, hw, sink);
    }

    /// Radio service registration failed.  Sensing carries on; every
    /// later send is dropped.
    pub fn disable_connectivity(&mut self, now_ms: u64, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);
        error!("Link: service setup failed, connectivity disabled");
        self.connectivity_enabled = false;
        self.link.on_disconnected(&mut self.ctx.device, &mut self.sched);
        sink.emit(&AppEvent::ConnectivityDisabled);
        self.record_fault(Error::Comms(CommsError::ServiceSetupFailed), hw, sink);
        self.finish(prev, hw, sink);
    }

    /// Top-level supervisor entry for faults raised outside the service
    /// (driver init, event queue corruption, ...).
    pub fn report_fault(&mut self, now_ms: u64, err: Error, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let prev = self.begin(now_ms);
        self.supervise(err, hw, sink);
        self.finish(prev, hw, sink);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn device(&self) -> &DeviceState {
        &self.ctx.device
    }

    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    /// Earliest armed timer, for sizing the main loop's sleep.
    pub fn next_deadline(&self) -> Option<u64> {
        self.sched.next_deadline()
    }

    pub fn metrics(&self) -> RuntimeMetrics {
        RuntimeMetrics {
            dropped_commands: self.gate.dropped(),
            ..self.metrics
        }
    }

    pub fn faults(&self) -> &FaultLog {
        &self.faults
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_collecting()
    }

    pub fn connectivity_enabled(&self) -> bool {
        self.connectivity_enabled
    }

    pub fn diagnostics(&self, now_ms: u64) -> DiagnosticsReport {
        DiagnosticsReport::collect(now_ms, self.metrics(), &self.faults)
    }

    // ── Internal: commands ────────────────────────────────────

    fn dispatch(&mut self, cmd: AppCommand, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        debug!("Command: {cmd:?}");
        match cmd {
            AppCommand::Reset => {
                self.ctx.device.rep_count = 0;
                self.ctx.session_start_reps = 0;
                self.ctx.send(Packet::rep_count(0));
                sink.emit(&AppEvent::CounterReset);
            }
            AppCommand::StartSession => {
                let refusal = if self.calibration.is_collecting() {
                    Some("calibration in progress")
                } else if !self.ctx.device.is_calibrated {
                    Some("not calibrated")
                } else {
                    None
                };
                if let Some(reason) = refusal {
                    info!("Command: StartSession refused, {reason}");
                    sink.emit(&AppEvent::CommandRejected { command: cmd, reason });
                } else if self.fsm.current_state() == StateId::Active {
                    debug!("Command: session already running");
                } else {
                    self.fsm.force_transition(StateId::Active, &mut self.ctx);
                }
            }
            AppCommand::EndSession => {
                if self.fsm.current_state() == StateId::Active {
                    self.ctx.end_reason = Some(SessionEndReason::Command);
                    self.fsm.force_transition(StateId::Idle, &mut self.ctx);
                } else {
                    debug!("Command: no session to end");
                }
            }
            AppCommand::Calibrate => {
                self.begin_calibration(sink);
                self.fsm.tick(&mut self.ctx);
            }
            AppCommand::RequestStatus => {
                let status = self.ctx.device.status_packet();
                self.ctx.send(status);
            }
            AppCommand::FieldAck => {
                self.ctx.device.field_trigger_pending = false;
                if self.link.revert_to_normal(&mut self.ctx.device, &mut self.sched) {
                    self.apply_advertising(hw);
                    sink.emit(&AppEvent::AdvertisingChanged(AdvertisingProfile::Normal));
                }
            }
        }
    }

    // ── Internal: sensing ─────────────────────────────────────

    fn process_sample(&mut self, sample: Vector3, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if !self.ctx.device.is_calibrated {
            return;
        }
        let now = self.ctx.now_ms;
        let magnitude = self
            .pipeline
            .process(sample, self.ctx.device.calibration_baseline);
        let class = self.detector.classify(magnitude, now);

        if class.active {
            self.ctx.device.last_activity_ms = now;
        }
        if !class.rep {
            return;
        }

        if self.ctx.config.auto_start_on_rep && self.fsm.current_state() == StateId::Idle {
            info!("Session: auto-start on rep");
            self.fsm.force_transition(StateId::Active, &mut self.ctx);
        }
        if !self.ctx.device.session_active {
            debug!("Rep outside a session, not counted");
            return;
        }

        let count = self.ctx.device.rep_count.saturating_add(1);
        self.ctx.device.rep_count = count;
        self.metrics.reps = self.metrics.reps.saturating_add(1);
        self.ctx.send(Packet::rep_count(count));
        hw.pulse_haptic(REP_HAPTIC_MS);
        hw.show(IndicatorPattern::Rep);
        sink.emit(&AppEvent::Rep { count });
    }

    fn begin_calibration(&mut self, sink: &mut impl EventSink) {
        self.ctx.device.is_calibrated = false;
        self.ctx.device.calibrating = true;
        self.calibration.begin();
        self.pipeline.reset();
        self.detector.reset();
        self.sched.schedule_periodic(
            TimerId::CalibrationSample,
            self.ctx.now_ms,
            u64::from(self.ctx.config.calibration_interval_ms),
        );
        sink.emit(&AppEvent::CalibrationStarted {
            samples: self.calibration.target(),
        });
    }

    fn calibration_sample(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if !self.calibration.is_collecting() {
            self.sched.cancel(TimerId::CalibrationSample);
            return;
        }
        let sample = match hw.read_accel() {
            Ok(s) => s,
            Err(e) => {
                self.metrics.sensor_failures = self.metrics.sensor_failures.saturating_add(1);
                warn!("Calibration: sample read failed ({e})");
                sink.emit(&AppEvent::SensorReadFailed(e));
                return;
            }
        };

        match self.calibration.add_sample(sample) {
            Ok(CalibrationProgress::Collecting { .. }) => {}
            Ok(CalibrationProgress::Complete(baseline)) => {
                self.sched.cancel(TimerId::CalibrationSample);
                self.ctx.device.calibration_baseline = baseline;
                self.ctx.device.is_calibrated = true;
                self.ctx.device.calibrating = false;
                sink.emit(&AppEvent::Calibrated { baseline });
            }
            Err(e) => {
                self.sched.cancel(TimerId::CalibrationSample);
                self.ctx.device.calibrating = false;
                sink.emit(&AppEvent::CalibrationFailed(e));
                self.supervise(e.into(), hw, sink);
            }
        }
    }

    // ── Internal: connectivity ────────────────────────────────

    fn field_triggered(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let was = self.ctx.device.advertising_profile;
        self.link.enter_aggressive(
            &mut self.ctx.device,
            &mut self.sched,
            &self.ctx.config,
            self.ctx.now_ms,
        );
        if was != AdvertisingProfile::Aggressive {
            self.apply_advertising(hw);
            sink.emit(&AppEvent::AdvertisingChanged(AdvertisingProfile::Aggressive));
        }

        let at_ms = u32::try_from(self.ctx.now_ms).unwrap_or(u32::MAX);
        let delivered = self.ctx.device.is_connected();
        if delivered {
            self.ctx.send(Packet::FieldDetected { deferred: false, at_ms });
        } else {
            info!("Field: trigger while disconnected, notice deferred");
            self.ctx.device.field_trigger_pending = true;
            self.field_pending_at_ms = at_ms;
        }

        hw.show(IndicatorPattern::FieldTrigger);
        hw.pulse_haptic(FIELD_HAPTIC_MS);
        sink.emit(&AppEvent::FieldTriggered { delivered });
    }

    fn send_handshake(&mut self) {
        if !self.ctx.device.is_connected() {
            return;
        }
        self.ctx.send(Packet::Handshake {
            rep_count: wire_count(self.ctx.device.rep_count),
            firmware: self.identity.firmware,
            device: self.identity.tag,
        });
        let status = self.ctx.device.status_packet();
        self.ctx.send(status);

        if self.ctx.device.field_trigger_pending {
            self.ctx.send(Packet::FieldDetected {
                deferred: true,
                at_ms: self.field_pending_at_ms,
            });
            self.ctx.device.field_trigger_pending = false;
        }
    }

    /// Push the current profile and payload to the advertiser.  Returns
    /// `false` when nothing was applied.
    fn apply_advertising(&mut self, hw: &mut impl Hardware) -> bool {
        if !self.connectivity_enabled {
            return false;
        }
        let device = &self.ctx.device;
        let params = AdvertisingParams::for_profile(device.advertising_profile, &self.ctx.config);
        let payload = build_adv_payload(&self.identity.name, Some(device.battery_percent));
        match hw.set_advertising(params, &payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("Adv: update refused ({e})");
                false
            }
        }
    }

    // ── Internal: power ───────────────────────────────────────

    fn check_battery(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        let percent = match hw.read_battery_percent() {
            Ok(p) => p.min(100),
            Err(e) => {
                self.metrics.sensor_failures = self.metrics.sensor_failures.saturating_add(1);
                warn!("Power: battery read failed ({e})");
                sink.emit(&AppEvent::SensorReadFailed(e));
                return;
            }
        };

        let fire = self.power.check(percent);
        let changed = self.ctx.device.battery_percent != percent;
        self.ctx.device.battery_percent = percent;
        self.ctx.device.low_battery = self.power.is_low();
        sink.emit(&AppEvent::BatterySampled {
            percent,
            low: self.power.is_low(),
        });

        if fire {
            hw.show(IndicatorPattern::LowBattery);
            self.ctx.send(Packet::Battery { percent });
            sink.emit(&AppEvent::LowBattery { percent });
        }
        if changed && !self.ctx.device.is_connected() {
            self.apply_advertising(hw);
        }
    }

    // ── Internal: supervisor ──────────────────────────────────

    /// Log, count and display a fault.
    fn record_fault(&mut self, err: Error, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        error!("Supervisor: {err} (code 0x{:02X})", err.code());
        self.faults.record(self.ctx.now_ms, err);
        self.metrics.faults = self.metrics.faults.saturating_add(1);
        hw.show(IndicatorPattern::Fault);
        sink.emit(&AppEvent::Fault(err));
    }

    /// Single top-level fault path: record it, send a best-effort
    /// `Error` packet and restore the invariants it may have broken.
    fn supervise(&mut self, err: Error, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        self.record_fault(err, hw, sink);
        self.ctx.send(Packet::Error { code: err.code() });

        if let Error::Fault(FaultKind::InvariantViolated(_)) = err {
            if self.fsm.current_state() == StateId::Active {
                self.ctx.end_reason = Some(SessionEndReason::Fault);
                self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            }
            self.ctx.device.session_active = false;
            self.fsm.tick(&mut self.ctx);
        }
    }

    // ── Internal: handler framing ─────────────────────────────

    fn begin(&mut self, now_ms: u64) -> StateId {
        self.ctx.now_ms = now_ms;
        self.fsm.current_state()
    }

    /// Common tail of every handler.
    fn finish(&mut self, prev: StateId, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if let Err(what) = self.ctx.device.check_invariants() {
            self.supervise(FaultKind::InvariantViolated(what).into(), hw, sink);
        }

        for packet in self.ctx.take_outbox() {
            self.transmit(packet, hw, sink);
        }

        let now = self.fsm.current_state();
        if now != prev {
            sink.emit(&AppEvent::StateChanged { from: prev, to: now });
        }

        let steady = self.steady_pattern();
        if self.steady != Some(steady) {
            self.steady = Some(steady);
            hw.show(steady);
        }
    }

    /// Fire-and-forget send.  Never queued, never retried.
    fn transmit(&mut self, packet: Packet, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if !self.connectivity_enabled || !self.ctx.device.is_connected() {
            self.metrics.dropped_sends = self.metrics.dropped_sends.saturating_add(1);
            debug!("Link: {:?} dropped, not connected", packet.kind());
            return;
        }
        let frame = match encode(&packet) {
            Ok(f) => f,
            Err(e) => {
                self.record_fault(e.into(), hw, sink);
                return;
            }
        };
        if let Err(reason) = hw.notify(&frame) {
            self.metrics.dropped_sends = self.metrics.dropped_sends.saturating_add(1);
            debug!("Link: {:?} dropped ({reason})", packet.kind());
            sink.emit(&AppEvent::PacketDropped {
                kind: packet.kind(),
                reason,
            });
        }
    }

    fn steady_pattern(&self) -> IndicatorPattern {
        let device = &self.ctx.device;
        if device.calibrating {
            return IndicatorPattern::Calibrating;
        }
        match self.fsm.current_state() {
            StateId::Uncalibrated => IndicatorPattern::Uncalibrated,
            StateId::Active => IndicatorPattern::SessionActive,
            StateId::Idle if !self.connectivity_enabled => IndicatorPattern::Idle,
            StateId::Idle if device.is_connected() => IndicatorPattern::Connected,
            StateId::Idle => match device.advertising_profile {
                AdvertisingProfile::Aggressive => IndicatorPattern::FastAdvertising,
                AdvertisingProfile::Normal => IndicatorPattern::Advertising,
            },
        }
    }
}
