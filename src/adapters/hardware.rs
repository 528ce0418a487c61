//! Hardware adapter: bridges real peripherals to the domain port traits.
//!
//! Owns the accelerometer, the BLE adapter and the indicator drivers,
//! exposing them through [`SensorPort`], [`RadioPort`] and
//! [`IndicatorPort`].  This is the only module that touches actual
//! hardware.  On non-espidf targets the sensor inputs come from
//! process-wide atomics that tests and the sim loop set through the
//! `sim_*` functions.

use crate::adapters::ble::BleAdapter;
use crate::adapters::time::MonotonicClock;
use crate::app::ports::{IndicatorPattern, IndicatorPort, RadioPort, SensorPort};
use crate::connectivity::AdvertisingParams;
use crate::drivers::haptic::HapticMotor;
use crate::drivers::led_patterns::LedPatternEngine;
use crate::drivers::status_led::StatusLed;
use crate::error::{CommsError, SensorError};
use crate::power::voltage_to_percent;
use crate::sensors::Vector3;

#[cfg(target_os = "espidf")]
use crate::sensors::lis3dh::Lis3dh;

/// I²C bus the accelerometer sits on.
#[cfg(target_os = "espidf")]
pub type AccelBus = esp_idf_hal::i2c::I2cDriver<'static>;

// ── Simulation inputs ─────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

    use crate::sensors::Vector3;

    static ACCEL_X: AtomicU32 = AtomicU32::new(0);
    static ACCEL_Y: AtomicU32 = AtomicU32::new(0);
    // 1 g at rest
    static ACCEL_Z: AtomicU32 = AtomicU32::new(0x3F80_0000);
    static ACCEL_FAULT: AtomicBool = AtomicBool::new(false);
    static BATTERY_MV: AtomicU16 = AtomicU16::new(3_000);
    static BATTERY_FAULT: AtomicBool = AtomicBool::new(false);
    static FIELD_PRESENT: AtomicBool = AtomicBool::new(false);

    pub fn set_accel(v: Vector3) {
        ACCEL_X.store(v.x.to_bits(), Ordering::Relaxed);
        ACCEL_Y.store(v.y.to_bits(), Ordering::Relaxed);
        ACCEL_Z.store(v.z.to_bits(), Ordering::Relaxed);
    }

    pub fn accel() -> Vector3 {
        Vector3::new(
            f32::from_bits(ACCEL_X.load(Ordering::Relaxed)),
            f32::from_bits(ACCEL_Y.load(Ordering::Relaxed)),
            f32::from_bits(ACCEL_Z.load(Ordering::Relaxed)),
        )
    }

    pub fn set_accel_fault(fail: bool) {
        ACCEL_FAULT.store(fail, Ordering::Relaxed);
    }

    pub fn accel_fault() -> bool {
        ACCEL_FAULT.load(Ordering::Relaxed)
    }

    pub fn set_battery_mv(mv: u16) {
        BATTERY_MV.store(mv, Ordering::Relaxed);
    }

    pub fn battery_mv() -> u16 {
        BATTERY_MV.load(Ordering::Relaxed)
    }

    pub fn set_battery_fault(fail: bool) {
        BATTERY_FAULT.store(fail, Ordering::Relaxed);
    }

    pub fn battery_fault() -> bool {
        BATTERY_FAULT.load(Ordering::Relaxed)
    }

    pub fn set_field(present: bool) {
        FIELD_PRESENT.store(present, Ordering::Relaxed);
    }

    pub fn field() -> bool {
        FIELD_PRESENT.load(Ordering::Relaxed)
    }
}

/// Simulation: acceleration returned by the next reads, in g.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_accel(v: Vector3) {
    sim::set_accel(v);
}

/// Simulation: make accelerometer reads fail with a bus error.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_accel_fault(fail: bool) {
    sim::set_accel_fault(fail);
}

/// Simulation: cell voltage seen by the battery ADC.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_battery_mv(mv: u16) {
    sim::set_battery_mv(mv);
}

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_battery_fault(fail: bool) {
    sim::set_battery_fault(fail);
}

/// Simulation: level of the field-detect line.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_field(present: bool) {
    sim::set_field(present);
}

// ── Adapter ───────────────────────────────────────────────────

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter {
    #[cfg(target_os = "espidf")]
    accel: Option<Lis3dh<AccelBus>>,
    ble: BleAdapter,
    clock: MonotonicClock,
    patterns: LedPatternEngine,
    led: StatusLed,
    haptic: HapticMotor,
    last_tick_ms: u64,
}

impl HardwareAdapter {
    /// `accel` is `None` when the part failed to probe; reads then
    /// report a bus failure.
    #[cfg(target_os = "espidf")]
    pub fn new(accel: Option<Lis3dh<AccelBus>>, ble: BleAdapter) -> Self {
        Self {
            accel,
            ble,
            clock: MonotonicClock::new(),
            patterns: LedPatternEngine::new(),
            led: StatusLed::new(),
            haptic: HapticMotor::new(),
            last_tick_ms: 0,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(ble: BleAdapter) -> Self {
        Self {
            ble,
            clock: MonotonicClock::new(),
            patterns: LedPatternEngine::new(),
            led: StatusLed::new(),
            haptic: HapticMotor::new(),
            last_tick_ms: 0,
        }
    }

    pub fn ble(&self) -> &BleAdapter {
        &self.ble
    }

    pub fn ble_mut(&mut self) -> &mut BleAdapter {
        &mut self.ble
    }

    /// Advance LED animation and stop an expired haptic pulse.  Called
    /// once per main-loop pass.
    pub fn tick(&mut self, now_ms: u64) {
        let delta = now_ms.saturating_sub(self.last_tick_ms).min(u64::from(u32::MAX)) as u32;
        self.last_tick_ms = now_ms;
        let colour = self.patterns.tick(delta);
        self.led.set_colour(colour);
        self.haptic.tick(now_ms);
    }

    /// Dark LED, motor off.
    pub fn all_off(&mut self) {
        self.patterns.clear_all();
        self.led.off();
        self.haptic.stop();
    }

    pub fn led_colour(&self) -> (u8, u8, u8) {
        self.led.current_colour()
    }

    pub fn haptic_running(&self) -> bool {
        self.haptic.is_running()
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    #[cfg(target_os = "espidf")]
    fn read_accel(&mut self) -> Result<Vector3, SensorError> {
        let dev = self.accel.as_mut().ok_or(SensorError::BusFailed)?;
        Ok(dev.read_accel()?)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_accel(&mut self) -> Result<Vector3, SensorError> {
        if sim::accel_fault() {
            return Err(SensorError::BusFailed);
        }
        Ok(sim::accel())
    }

    #[cfg(target_os = "espidf")]
    fn read_battery_percent(&mut self) -> Result<u8, SensorError> {
        let raw = crate::drivers::hw_init::battery_adc_read().ok_or(SensorError::AdcReadFailed)?;
        Ok(voltage_to_percent(crate::drivers::hw_init::raw_to_battery_mv(raw)))
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_battery_percent(&mut self) -> Result<u8, SensorError> {
        if sim::battery_fault() {
            return Err(SensorError::AdcReadFailed);
        }
        Ok(voltage_to_percent(sim::battery_mv()))
    }

    #[cfg(target_os = "espidf")]
    fn field_present(&mut self) -> bool {
        crate::drivers::hw_init::field_line_active()
    }

    #[cfg(not(target_os = "espidf"))]
    fn field_present(&mut self) -> bool {
        sim::field()
    }
}

// ── RadioPort implementation ──────────────────────────────────

impl RadioPort for HardwareAdapter {
    fn notify(&mut self, frame: &[u8]) -> Result<(), CommsError> {
        self.ble.notify(frame)
    }

    fn set_advertising(
        &mut self,
        params: AdvertisingParams,
        payload: &[u8],
    ) -> Result<(), CommsError> {
        self.ble.set_advertising(params, payload)
    }
}

// ── IndicatorPort implementation ──────────────────────────────

impl IndicatorPort for HardwareAdapter {
    fn show(&mut self, pattern: IndicatorPattern) {
        self.patterns.show(pattern);
    }

    fn pulse_haptic(&mut self, duration_ms: u16) {
        let now = self.clock.now_ms();
        self.haptic.pulse(now, duration_ms);
    }
}
