//! Exponential smoothing and baseline-relative motion magnitude.
//!
//! `smoothed = α·sample + (1−α)·smoothed`; the first sample seeds the
//! filter so the output does not ramp up from zero after boot.

use super::Vector3;
use crate::config::SystemConfig;

pub struct SensorPipeline {
    alpha: f32,
    vertical_weight: f32,
    smoothed: Option<Vector3>,
}

impl SensorPipeline {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            alpha: config.smoothing_alpha,
            vertical_weight: config.vertical_weight,
            smoothed: None,
        }
    }

    /// Feed one raw sample through the filter and return the new state.
    pub fn smooth(&mut self, sample: Vector3) -> Vector3 {
        let next = match self.smoothed {
            Some(prev) => sample * self.alpha + prev * (1.0 - self.alpha),
            None => sample,
        };
        self.smoothed = Some(next);
        next
    }

    /// Motion magnitude of `smoothed` relative to `baseline`.
    pub fn magnitude(&self, smoothed: Vector3, baseline: Vector3) -> f32 {
        (smoothed - baseline).weighted_norm(self.vertical_weight)
    }

    /// Smooth `sample` and return its magnitude against `baseline`.
    pub fn process(&mut self, sample: Vector3, baseline: Vector3) -> f32 {
        let smoothed = self.smooth(sample);
        self.magnitude(smoothed, baseline)
    }

    /// Forget the filter state (after recalibration).
    pub fn reset(&mut self) {
        self.smoothed = None;
    }

    pub fn smoothed(&self) -> Option<Vector3> {
        self.smoothed
    }
}
