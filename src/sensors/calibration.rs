//! Stationary-baseline calibration.
//!
//! `Idle → Collecting → Idle`.  While collecting, raw samples are pushed
//! on a fixed cadence until the configured count is reached; the baseline
//! is the per-axis arithmetic mean.  The sample buffer is cleared on
//! completion, on rejection and on abort.
//!
//! With `calibration_max_variance = None` every collection is accepted.
//! With `Some(v)`, a collection whose largest per-axis variance exceeds
//! `v` is rejected and the device stays uncalibrated.

use log::{info, warn};

use super::Vector3;
use crate::config::{SystemConfig, MAX_CALIBRATION_SAMPLES};
use crate::error::CalibrationError;

/// Result of feeding one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationProgress {
    /// More samples needed.
    Collecting { collected: usize, target: usize },
    /// Collection complete; here is the baseline.
    Complete(Vector3),
}

pub struct CalibrationManager {
    target: usize,
    max_variance: Option<f32>,
    samples: heapless::Vec<Vector3, MAX_CALIBRATION_SAMPLES>,
    collecting: bool,
}

impl CalibrationManager {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            target: usize::from(config.calibration_sample_count).clamp(1, MAX_CALIBRATION_SAMPLES),
            max_variance: config.calibration_max_variance,
            samples: heapless::Vec::new(),
            collecting: false,
        }
    }

    /// Start (or restart) a collection, discarding any partial run.
    pub fn begin(&mut self) {
        self.samples.clear();
        self.collecting = true;
        info!("Calibration: collecting {} samples", self.target);
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Feed one raw sample.
    ///
    /// Returns `NoSamples` when called outside a collection.
    pub fn add_sample(&mut self, sample: Vector3) -> Result<CalibrationProgress, CalibrationError> {
        if !self.collecting {
            return Err(CalibrationError::NoSamples);
        }
        // `target` never exceeds capacity, so the push cannot fail before
        // completion below.
        let _ = self.samples.push(sample);

        if self.samples.len() < self.target {
            return Ok(CalibrationProgress::Collecting {
                collected: self.samples.len(),
                target: self.target,
            });
        }

        let outcome = self.finish();
        self.samples.clear();
        self.collecting = false;
        outcome.map(CalibrationProgress::Complete)
    }

    fn finish(&self) -> Result<Vector3, CalibrationError> {
        let baseline = mean(&self.samples).ok_or(CalibrationError::NoSamples)?;

        if let Some(limit) = self.max_variance {
            let variance = max_axis_variance(&self.samples, baseline);
            if variance > limit {
                warn!("Calibration: rejected, variance {variance:.4} > {limit:.4}");
                return Err(CalibrationError::Unstable { variance });
            }
        }

        info!(
            "Calibration: baseline ({:.3}, {:.3}, {:.3})",
            baseline.x, baseline.y, baseline.z
        );
        Ok(baseline)
    }
}

/// Per-axis arithmetic mean.
pub fn mean(samples: &[Vector3]) -> Option<Vector3> {
    if samples.is_empty() {
        return None;
    }
    let sum = samples.iter().fold(Vector3::ZERO, |acc, s| acc + *s);
    Some(sum * (1.0 / samples.len() as f32))
}

/// Largest population variance across the three axes.
pub fn max_axis_variance(samples: &[Vector3], mean: Vector3) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f32;
    let (vx, vy, vz) = samples.iter().fold((0.0f32, 0.0f32, 0.0f32), |(ax, ay, az), s| {
        let d = *s - mean;
        (ax + d.x * d.x, ay + d.y * d.y, az + d.z * d.z)
    });
    (vx / n).max(vy / n).max(vz / n)
}
