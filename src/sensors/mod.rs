//! Sensor subsystem: accelerometer driver, smoothing pipeline, calibration
//! and the rep classifier.
//!
//! ```text
//!  LIS3DH ──▶ SensorPipeline ──▶ RepDetector ──▶ session (fsm)
//!               ▲ baseline
//!  CalibrationManager
//! ```

pub mod calibration;
pub mod lis3dh;
pub mod pipeline;
pub mod rep_detector;

use core::ops::{Add, Mul, Sub};

/// Three-axis acceleration in g.  `z` is the vertical axis when the clip
/// is mounted upright.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm with the vertical component scaled by `z_weight`.
    pub fn weighted_norm(self, z_weight: f32) -> f32 {
        let z = self.z * z_weight;
        (self.x * self.x + self.y * self.y + z * z).sqrt()
    }

    pub fn norm(self) -> f32 {
        self.weighted_norm(1.0)
    }
}

impl Add for Vector3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Self;
    fn mul(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}
