//! # Calibration Engine
//!
//! One-time, per-boot estimation of the gyro zero-bias and accelerometer
//! scale from stationary warm-up samples.
//!
//! While warming up, every inertial cycle feeds raw gyro counts into 64-bit
//! running sums (plus sums of squares for the diagnostic standard deviation)
//! and the accelerometer vector magnitude into a scalar sum. At exactly
//! [`CALIBRATION_SAMPLE_COUNT`] samples the bias, standard deviation and
//! accel scale are computed once and the engine freezes permanently; there is
//! no re-calibration without a full restart.
//!
//! ## Known limitation
//!
//! The engine does not detect motion during warm-up. Bias and scale computed
//! while the vehicle moves will be wrong; this is not silently corrected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::types::{Axis3, CALIBRATION_SAMPLE_COUNT};

/// Gyro bias and accelerometer scale estimator
///
/// Owned exclusively by the acquisition loop; the only state visible outside
/// is the monotonic ready flag.
#[derive(Debug)]
pub struct GyroBiasCalibration {
    sample_count: u32,
    gyro_sum: [i64; 3],
    gyro_sum_squares: [i64; 3],
    accel_magnitude_sum: f32,
    bias: Axis3,
    std_dev: Axis3,
    accel_scale: f32,
    accel_g_per_lsb: f32,
    ready: Arc<AtomicBool>,
}

impl GyroBiasCalibration {
    /// Create a fresh estimator
    ///
    /// # Arguments
    ///
    /// * `accel_g_per_lsb` - Accelerometer scale factor used for the
    ///   magnitude accumulation (unit scale, before bias/scale correction)
    #[must_use]
    pub fn new(accel_g_per_lsb: f32) -> Self {
        Self {
            sample_count: 0,
            gyro_sum: [0; 3],
            gyro_sum_squares: [0; 3],
            accel_magnitude_sum: 0.0,
            bias: Axis3::default(),
            std_dev: Axis3::default(),
            accel_scale: 1.0,
            accel_g_per_lsb,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Feed one cycle of raw counts (already axis-remapped)
    ///
    /// A no-op once the bias has been found.
    pub fn update(&mut self, gyro_raw: [i16; 3], accel_raw: [i16; 3]) {
        if self.is_ready() {
            return;
        }

        for axis in 0..3 {
            let count = i64::from(gyro_raw[axis]);
            self.gyro_sum[axis] += count;
            self.gyro_sum_squares[axis] += count * count;
        }

        let ax = f32::from(accel_raw[0]) * self.accel_g_per_lsb;
        let ay = f32::from(accel_raw[1]) * self.accel_g_per_lsb;
        let az = f32::from(accel_raw[2]) * self.accel_g_per_lsb;
        self.accel_magnitude_sum += (ax * ax + ay * ay + az * az).sqrt();

        self.sample_count += 1;
        if self.sample_count == CALIBRATION_SAMPLE_COUNT {
            self.finalize();
        }
    }

    /// Compute bias, standard deviation and accel scale, then freeze
    fn finalize(&mut self) {
        let n = CALIBRATION_SAMPLE_COUNT as f32;

        self.bias = Axis3::new(
            self.gyro_sum[0] as f32 / n,
            self.gyro_sum[1] as f32 / n,
            self.gyro_sum[2] as f32 / n,
        );

        self.std_dev = Axis3::new(
            variance(self.gyro_sum_squares[0], self.bias.x).sqrt(),
            variance(self.gyro_sum_squares[1], self.bias.y).sqrt(),
            variance(self.gyro_sum_squares[2], self.bias.z).sqrt(),
        );

        let scale = self.accel_magnitude_sum / n;
        if scale > f32::EPSILON {
            self.accel_scale = scale;
        } else {
            warn!("Accel scale came out non-positive ({scale}), keeping 1.0");
        }

        self.ready.store(true, Ordering::Release);
        info!(
            "Gyro bias found: [{:.2}, {:.2}, {:.2}] LSB (σ [{:.2}, {:.2}, {:.2}]), accel scale {:.4}",
            self.bias.x,
            self.bias.y,
            self.bias.z,
            self.std_dev.x,
            self.std_dev.y,
            self.std_dev.z,
            self.accel_scale
        );
    }

    /// Whether the warm-up has completed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Shared handle to the monotonic ready flag
    #[must_use]
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    /// Gyro zero-bias in raw LSB per axis (zero until ready)
    #[must_use]
    pub fn bias(&self) -> Axis3 {
        self.bias
    }

    /// Warm-up standard deviation in raw LSB per axis, diagnostic only
    #[must_use]
    pub fn std_dev(&self) -> Axis3 {
        self.std_dev
    }

    /// Accelerometer scale correction, always > 0 (1.0 until ready)
    #[must_use]
    pub fn accel_scale(&self) -> f32 {
        self.accel_scale
    }

    /// Warm-up samples accumulated so far (frozen at the threshold)
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

/// Warm-up variance of one axis, clamped against float rounding below zero
fn variance(sum_squares: i64, mean: f32) -> f32 {
    (sum_squares as f32 / CALIBRATION_SAMPLE_COUNT as f32 - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const G_PER_LSB_8G: f32 = 2.0 * 8.0 / 65536.0;

    fn feed_constant(cal: &mut GyroBiasCalibration, gyro: [i16; 3], accel: [i16; 3], cycles: u32) {
        for _ in 0..cycles {
            cal.update(gyro, accel);
        }
    }

    #[test]
    fn test_not_ready_below_threshold() {
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        feed_constant(&mut cal, [15, -8, 3], [0, 0, 4096], CALIBRATION_SAMPLE_COUNT - 1);

        assert!(!cal.is_ready());
        assert_eq!(cal.sample_count(), CALIBRATION_SAMPLE_COUNT - 1);
        // Bias still at its zero-initialized default
        assert_eq!(cal.bias(), Axis3::default());
        assert_eq!(cal.accel_scale(), 1.0);
    }

    #[test]
    fn test_constant_input_gives_exact_bias_and_zero_std_dev() {
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        feed_constant(&mut cal, [15, -8, 3], [0, 0, 4096], CALIBRATION_SAMPLE_COUNT);

        assert!(cal.is_ready());
        assert_eq!(cal.bias(), Axis3::new(15.0, -8.0, 3.0));
        assert_eq!(cal.std_dev(), Axis3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_frozen_after_threshold() {
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        feed_constant(&mut cal, [15, -8, 3], [0, 0, 4096], CALIBRATION_SAMPLE_COUNT);
        let bias = cal.bias();
        let scale = cal.accel_scale();

        // Wildly different input after the threshold must change nothing
        feed_constant(&mut cal, [3000, 3000, 3000], [3000, 3000, 3000], 500);

        assert!(cal.is_ready());
        assert_eq!(cal.sample_count(), CALIBRATION_SAMPLE_COUNT);
        assert_eq!(cal.bias(), bias);
        assert_eq!(cal.accel_scale(), scale);
    }

    #[test]
    fn test_accel_scale_normalizes_magnitude() {
        // 4096 LSB on one axis at ±8 g is exactly 1.0 g
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        feed_constant(&mut cal, [0, 0, 0], [0, 0, 4096], CALIBRATION_SAMPLE_COUNT);

        assert!((cal.accel_scale() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_accel_scale_tracks_sensitivity_drift() {
        // 2% hot sensor: magnitude 4178 LSB ≈ 1.02 g
        let raw: i16 = 4178;
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        feed_constant(&mut cal, [0, 0, 0], [0, 0, raw], CALIBRATION_SAMPLE_COUNT);

        let expected = f32::from(raw) * G_PER_LSB_8G;
        assert!((cal.accel_scale() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_accel_scale_guard_on_zero_input() {
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        feed_constant(&mut cal, [0, 0, 0], [0, 0, 0], CALIBRATION_SAMPLE_COUNT);

        assert!(cal.is_ready());
        assert_eq!(cal.accel_scale(), 1.0);
    }

    #[test]
    fn test_std_dev_of_alternating_input() {
        // Alternate ±100 around zero mean: σ = 100 exactly
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        for i in 0..CALIBRATION_SAMPLE_COUNT {
            let value = if i % 2 == 0 { 100 } else { -100 };
            cal.update([value, value, value], [0, 0, 4096]);
        }

        assert!(cal.is_ready());
        assert_eq!(cal.bias(), Axis3::default());
        assert!((cal.std_dev().x - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_ready_flag_handle_tracks_state() {
        let mut cal = GyroBiasCalibration::new(G_PER_LSB_8G);
        let flag = cal.ready_flag();
        assert!(!flag.load(std::sync::atomic::Ordering::Acquire));

        feed_constant(&mut cal, [1, 1, 1], [0, 0, 4096], CALIBRATION_SAMPLE_COUNT);
        assert!(flag.load(std::sync::atomic::Ordering::Acquire));
    }
}
