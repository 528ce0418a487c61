//! Battery monitoring.
//!
//! The battery is sampled on the `BatteryCheck` timer.  A reading below
//! `low_battery_threshold_percent` raises the low-battery condition; with
//! [`LowBatteryPolicy::EveryCheck`] it re-fires on every such reading,
//! with [`LowBatteryPolicy::Latch`] it fires once and re-arms only after
//! the level climbs `rearm_margin` points above the threshold.

use log::{info, warn};

use crate::config::{LowBatteryPolicy, SystemConfig};

/// CR2032 discharge curve under light pulsed load, (mV, percent),
/// descending by voltage.
const CR2032_CURVE: [(u16, u8); 8] = [
    (3000, 100),
    (2900, 80),
    (2800, 60),
    (2700, 40),
    (2600, 25),
    (2500, 12),
    (2300, 4),
    (2000, 0),
];

/// Piecewise-linear millivolts → percent.
pub fn voltage_to_percent(mv: u16) -> u8 {
    let (top_mv, _) = CR2032_CURVE[0];
    if mv >= top_mv {
        return 100;
    }
    for pair in CR2032_CURVE.windows(2) {
        let (hi_mv, hi_pct) = pair[0];
        let (lo_mv, lo_pct) = pair[1];
        if mv >= lo_mv {
            let span = u32::from(hi_mv - lo_mv);
            let into = u32::from(mv - lo_mv);
            let pct = u32::from(lo_pct) + u32::from(hi_pct - lo_pct) * into / span;
            return pct as u8;
        }
    }
    0
}

pub struct PowerMonitor {
    threshold: u8,
    policy: LowBatteryPolicy,
    latched: bool,
    low: bool,
}

impl PowerMonitor {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            threshold: config.low_battery_threshold_percent,
            policy: config.low_battery_policy,
            latched: false,
            low: false,
        }
    }

    /// Evaluate one reading.  Returns `true` when a low-battery event
    /// should be raised for it.
    pub fn check(&mut self, percent: u8) -> bool {
        self.low = percent < self.threshold;

        let fire = match self.policy {
            LowBatteryPolicy::EveryCheck => self.low,
            LowBatteryPolicy::Latch { rearm_margin } => {
                if self.latched {
                    if percent >= self.threshold.saturating_add(rearm_margin) {
                        info!("Power: low-battery latch re-armed at {percent}%");
                        self.latched = false;
                    }
                    false
                } else if self.low {
                    self.latched = true;
                    true
                } else {
                    false
                }
            }
        };

        if fire {
            warn!("Power: battery low ({percent}% < {}%)", self.threshold);
        }
        fire
    }

    /// Last reading was below the threshold.
    pub fn is_low(&self) -> bool {
        self.low
    }
}
