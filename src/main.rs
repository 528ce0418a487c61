//! RepClip firmware: main entry point.
//!
//! Hexagonal architecture with a run-to-completion event loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter            LogEventSink      MonotonicClock   │
//! │  (Sensor+Radio+Indicator)   (EventSink)       (ms since boot)  │
//! │  BleAdapter (GATT UART)                                        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Session FSM · Rep detector · Connectivity · Power     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Scheduler (purpose-keyed slots) · event queue (ISR → loop)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;

use repclip::adapters::ble::{self, BleAdapter};
use repclip::adapters::device_id;
use repclip::adapters::hardware::HardwareAdapter;
use repclip::adapters::log_sink::LogEventSink;
use repclip::adapters::time::MonotonicClock;
use repclip::app::service::AppService;
use repclip::config::SystemConfig;
use repclip::diagnostics;
use repclip::drivers::{hw_init, hw_timer, watchdog::Watchdog};
use repclip::events::{self, Event};
use repclip::field_trigger;
use repclip::pins;
use repclip::sensors::lis3dh::Lis3dh;

/// How often the diagnostics snapshot is logged.
const DIAGNOSTICS_INTERVAL_MS: u64 = 60_000;

/// Build-time JSON overlay on the default configuration.
fn load_config() -> SystemConfig {
    match option_env!("REPCLIP_CONFIG_JSON") {
        Some(json) => match SystemConfig::from_json(json) {
            Ok(cfg) => {
                info!("Config: build-time overlay applied");
                cfg
            }
            Err(e) => {
                warn!("Config: overlay rejected ({}), using defaults", e);
                SystemConfig::default()
            }
        },
        None => SystemConfig::default(),
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RepClip v{:<27}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    diagnostics::install_panic_handler();

    // ── 2. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Nothing useful runs without the ADC/GPIO/LEDC set-up; the
        // watchdog resets the part after its timeout.
        error!("HAL init failed: {}, halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = hw_init::init_isr_service() {
        error!("ISR service init failed: {}, field trigger unavailable", e);
    }
    let watchdog = Watchdog::default();

    let config = load_config();
    let clock = MonotonicClock::new();

    // Accelerometer on I²C0 (SDA = GPIO4, SCL = GPIO5, see pins.rs).
    let peripherals = Peripherals::take()?;
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )?;
    let accel = match Lis3dh::new(i2c, pins::ACCEL_I2C_ADDR) {
        Ok(dev) => {
            info!("LIS3DH: probed at 0x{:02X}", pins::ACCEL_I2C_ADDR);
            Some(dev)
        }
        Err(e) => {
            error!("LIS3DH: probe failed ({:?}), samples will report faults", e);
            None
        }
    };

    // ── 3. Identity and adapters ──────────────────────────────
    let mac = device_id::read_mac();
    let identity = device_id::identity(&mac);
    info!("Device ID: {} (BLE name: {})", device_id::device_id(&mac), identity.name);

    if let Some(record) = field_trigger::bridge_record(&config) {
        info!("Field: NDEF bridge record ready ({} bytes)", record.len());
    }

    let mut ble = BleAdapter::new(identity.name.clone());
    let ble_result = ble.start();

    let mut hw = HardwareAdapter::new(accel, ble);
    let mut sink = LogEventSink::new();
    let mut app = AppService::new(config.clone(), identity);

    // ── 4. Start ──────────────────────────────────────────────
    if let Err(e) = ble_result {
        error!("BLE: start failed ({}), continuing without connectivity", e);
        app.disable_connectivity(clock.now_ms(), &mut hw, &mut sink);
    }
    app.start(clock.now_ms(), &mut hw, &mut sink);
    hw_timer::start_timers(config.sample_period_ms());

    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    let mut next_diagnostics_ms = clock.now_ms() + DIAGNOSTICS_INTERVAL_MS;

    loop {
        events::drain_events(|event| {
            let now = clock.now_ms();
            match event {
                Event::SensorTick => app.on_sensor_tick(now, &mut hw, &mut sink),
                Event::FieldChanged => app.on_field_changed(now, &mut hw, &mut sink),
                Event::BleConnected => {
                    hw.ble_mut().on_central_connected();
                    app.on_connected(now, &mut hw, &mut sink);
                }
                Event::BleDisconnected => {
                    hw.ble_mut().on_central_disconnected();
                    app.on_disconnected(now, &mut hw, &mut sink);
                }
                Event::CommandReceived => {
                    while let Some(bytes) = ble::take_command() {
                        app.on_command(now, &bytes, &mut hw, &mut sink);
                    }
                }
                // Wake-up only; timers are polled below.
                Event::TimerTick => {}
            }
        });

        let now = clock.now_ms();
        app.poll_timers(now, &mut hw, &mut sink);
        hw.tick(now);
        watchdog.feed();

        if now >= next_diagnostics_ms {
            next_diagnostics_ms = now + DIAGNOSTICS_INTERVAL_MS;
            if let Some(json) = app.diagnostics(now).to_json() {
                info!("DIAG | {}", json);
            }
        }

        esp_idf_hal::delay::FreeRtos::delay_ms(config.loop_idle_ms);
    }
}
