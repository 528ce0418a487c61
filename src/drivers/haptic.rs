//! Vibration motor driver.
//!
//! A pulse switches the motor on at [`HAPTIC_DUTY`](crate::pins::HAPTIC_DUTY)
//! and records an off deadline; [`HapticMotor::tick`] stops it once the
//! deadline passes.  A new pulse while one is running extends it to the
//! later of the two deadlines.

use log::trace;

use crate::drivers::hw_init;
use crate::pins;

#[derive(Debug, Default)]
pub struct HapticMotor {
    off_at_ms: Option<u64>,
    pulses: u32,
}

impl HapticMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulse(&mut self, now_ms: u64, duration_ms: u16) {
        if duration_ms == 0 {
            return;
        }
        let until = now_ms + u64::from(duration_ms);
        if self.off_at_ms.is_none() {
            hw_init::ledc_set(hw_init::LEDC_CH_HAPTIC, pins::HAPTIC_DUTY);
        }
        self.off_at_ms = Some(self.off_at_ms.map_or(until, |t| t.max(until)));
        self.pulses = self.pulses.wrapping_add(1);
        trace!("haptic: on until {} ms", until);
    }

    /// Stop the motor once its deadline has passed.
    pub fn tick(&mut self, now_ms: u64) {
        if let Some(off_at) = self.off_at_ms {
            if now_ms >= off_at {
                self.stop();
            }
        }
    }

    pub fn stop(&mut self) {
        hw_init::ledc_set(hw_init::LEDC_CH_HAPTIC, 0);
        self.off_at_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.off_at_ms.is_some()
    }

    pub fn pulses(&self) -> u32 {
        self.pulses
    }
}
