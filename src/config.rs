//! System configuration parameters
//!
//! All tunable parameters for the RepClip sensor.  Defaults are the
//! product values; a JSON overlay baked in at build time
//! (`REPCLIP_CONFIG_JSON`) can override any subset of fields.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on calibration samples held in RAM at once.
pub const MAX_CALIBRATION_SAMPLES: usize = 64;

/// What the power monitor does once the battery is below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LowBatteryPolicy {
    /// Fire on every check below the threshold.
    EveryCheck,
    /// Fire once, then stay quiet until the level climbs `rearm_margin`
    /// points above the threshold.
    Latch { rearm_margin: u8 },
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Sensing ---
    /// Accelerometer sample rate (Hz)
    pub sample_rate_hz: u16,
    /// EMA weight given to the newest sample (0 < α ≤ 1)
    pub smoothing_alpha: f32,
    /// Multiplier applied to the vertical (Z) deviation before the norm
    pub vertical_weight: f32,

    // --- Rep detection ---
    /// Magnitude (g) above which the wearer counts as moving
    pub rest_threshold: f32,
    /// Magnitude (g) above which a rep is emitted
    pub tap_threshold: f32,
    /// Minimum spacing between two reps (ms)
    pub rep_cooldown_ms: u32,

    // --- Calibration ---
    /// Stationary samples averaged into the baseline
    pub calibration_sample_count: u8,
    /// Cadence of calibration sampling (ms)
    pub calibration_interval_ms: u32,
    /// Reject a collection whose per-axis variance exceeds this (g²).
    /// `None` accepts every collection.
    pub calibration_max_variance: Option<f32>,
    /// Start a calibration immediately after boot
    pub calibrate_on_boot: bool,

    // --- Session ---
    /// Active session ends after this long without motion (ms)
    pub inactivity_timeout_ms: u32,
    /// Sessions ended by inactivity with fewer reps are not reported
    pub min_session_reps: u32,
    /// A rep detected while idle starts a session
    pub auto_start_on_rep: bool,
    /// Losing the central ends a running session
    pub end_session_on_disconnect: bool,

    // --- Connectivity ---
    /// Heartbeat period while connected (ms)
    pub heartbeat_interval_ms: u32,
    /// Delay between connect and the handshake packet (ms)
    pub handshake_delay_ms: u32,
    /// Normal advertising interval bounds (ms)
    pub normal_adv_min_ms: u16,
    pub normal_adv_max_ms: u16,
    /// Aggressive advertising interval bounds (ms)
    pub aggressive_adv_min_ms: u16,
    pub aggressive_adv_max_ms: u16,
    /// How long aggressive advertising lasts after a field trigger (ms)
    pub aggressive_window_ms: u32,
    /// Minimum gap between two field triggers (ms)
    pub field_rearm_ms: u32,
    /// Companion-app URL published through the NFC bridge record
    pub field_url: Option<heapless::String<48>>,

    // --- Inbound commands ---
    /// Sustained command rate accepted from the central (per second)
    pub command_rate_per_sec: u32,
    /// Burst capacity of the command gate
    pub command_burst: u32,

    // --- Power ---
    /// Battery sampling period (ms)
    pub battery_check_interval_ms: u32,
    /// Low-battery threshold (%)
    pub low_battery_threshold_percent: u8,
    /// Re-fire behaviour below threshold
    pub low_battery_policy: LowBatteryPolicy,

    // --- Housekeeping ---
    /// Main loop idle sleep between event drains (ms)
    pub loop_idle_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Sensing
            sample_rate_hz: 26,
            smoothing_alpha: 0.15,
            vertical_weight: 1.5,

            // Rep detection
            rest_threshold: 0.3,
            tap_threshold: 1.5,
            rep_cooldown_ms: 250,

            // Calibration
            calibration_sample_count: 32,
            calibration_interval_ms: 20,
            calibration_max_variance: None,
            calibrate_on_boot: true,

            // Session
            inactivity_timeout_ms: 30_000,
            min_session_reps: 0,
            auto_start_on_rep: false,
            end_session_on_disconnect: false,

            // Connectivity
            heartbeat_interval_ms: 10_000,
            handshake_delay_ms: 500,
            normal_adv_min_ms: 320,
            normal_adv_max_ms: 375,
            aggressive_adv_min_ms: 20,
            aggressive_adv_max_ms: 40,
            aggressive_window_ms: 20_000,
            field_rearm_ms: 1_000,
            field_url: None,

            // Inbound commands
            command_rate_per_sec: 10,
            command_burst: 10,

            // Power
            battery_check_interval_ms: 60_000,
            low_battery_threshold_percent: 20,
            low_battery_policy: LowBatteryPolicy::EveryCheck,

            // Housekeeping
            loop_idle_ms: 5,
        }
    }
}

/// Errors from loading or validating a [`SystemConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The JSON overlay could not be parsed.
    Parse,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "config JSON malformed"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl SystemConfig {
    /// Parse a JSON overlay; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the pipeline or the timers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate_hz == 0 || self.sample_rate_hz > 400 {
            return Err(ConfigError::ValidationFailed("sample_rate_hz must be 1..=400"));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::ValidationFailed("smoothing_alpha must be in (0, 1]"));
        }
        if !(self.vertical_weight > 0.0) {
            return Err(ConfigError::ValidationFailed("vertical_weight must be positive"));
        }
        if !(self.rest_threshold >= 0.0 && self.rest_threshold < self.tap_threshold) {
            return Err(ConfigError::ValidationFailed(
                "rest_threshold must be non-negative and below tap_threshold",
            ));
        }
        let count = self.calibration_sample_count as usize;
        if count == 0 || count > MAX_CALIBRATION_SAMPLES {
            return Err(ConfigError::ValidationFailed(
                "calibration_sample_count must be 1..=64",
            ));
        }
        if self.calibration_max_variance.is_some_and(|v| !(v > 0.0)) {
            return Err(ConfigError::ValidationFailed(
                "calibration_max_variance must be positive",
            ));
        }
        if self.calibration_interval_ms == 0
            || self.heartbeat_interval_ms == 0
            || self.battery_check_interval_ms == 0
            || self.aggressive_window_ms == 0
            || self.inactivity_timeout_ms == 0
        {
            return Err(ConfigError::ValidationFailed("intervals must be non-zero"));
        }
        if self.normal_adv_min_ms > self.normal_adv_max_ms
            || self.aggressive_adv_min_ms > self.aggressive_adv_max_ms
        {
            return Err(ConfigError::ValidationFailed("advertising min above max"));
        }
        // BLE legacy advertising accepts 20 ms .. 10.24 s
        if self.aggressive_adv_min_ms < 20 || self.normal_adv_max_ms > 10_240 {
            return Err(ConfigError::ValidationFailed(
                "advertising interval outside 20..=10240 ms",
            ));
        }
        if self.aggressive_adv_max_ms >= self.normal_adv_min_ms {
            return Err(ConfigError::ValidationFailed(
                "aggressive advertising must be faster than normal",
            ));
        }
        if self.low_battery_threshold_percent > 100 {
            return Err(ConfigError::ValidationFailed("low battery threshold above 100%"));
        }
        if self.command_rate_per_sec == 0 || self.command_burst == 0 {
            return Err(ConfigError::ValidationFailed("command gate must admit commands"));
        }
        Ok(())
    }

    /// Sensor tick period in milliseconds.
    pub fn sample_period_ms(&self) -> u32 {
        (1000 / u32::from(self.sample_rate_hz.max(1))).max(1)
    }
}
