//! Threshold + cooldown rep classifier.
//!
//! Per sample:
//! 1. `magnitude > rest_threshold` marks activity (refreshes the session's
//!    inactivity clock) whether or not a rep fires.
//! 2. `magnitude > tap_threshold` and strictly more than `cooldown` since
//!    the last rep emits a rep.
//!
//! The cooldown is purely time-based; it does not look at the shape of
//! the motion.

use crate::config::SystemConfig;

/// Outcome of classifying one magnitude sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub active: bool,
    pub rep: bool,
}

pub struct RepDetector {
    rest_threshold: f32,
    tap_threshold: f32,
    cooldown_ms: u64,
    last_rep_ms: Option<u64>,
}

impl RepDetector {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            rest_threshold: config.rest_threshold,
            tap_threshold: config.tap_threshold,
            cooldown_ms: u64::from(config.rep_cooldown_ms),
            last_rep_ms: None,
        }
    }

    pub fn classify(&mut self, magnitude: f32, now_ms: u64) -> Classification {
        let active = magnitude > self.rest_threshold;
        let cooled = match self.last_rep_ms {
            Some(last) => now_ms.saturating_sub(last) > self.cooldown_ms,
            None => true,
        };
        let rep = magnitude > self.tap_threshold && cooled;
        if rep {
            self.last_rep_ms = Some(now_ms);
        }
        Classification { active, rep }
    }

    pub fn last_rep_ms(&self) -> Option<u64> {
        self.last_rep_ms
    }

    pub fn reset(&mut self) {
        self.last_rep_ms = None;
    }
}
