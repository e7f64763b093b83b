//! # Measurement Decoder
//!
//! Raw combined-read bytes to physical-unit samples for the three channel
//! kinds.
//!
//! The decoder holds persistent state independent of calibration: the
//! magnetometer and barometer only publish fresh raw values when their status
//! bits say so, and stale cycles must keep reporting the previous reading.

use super::calibration::GyroBiasCalibration;
use super::types::{
    Axis3, BaroSample, BARO_BLOCK_LEN, BARO_LSB_PER_CELSIUS, BARO_LSB_PER_MBAR,
    BARO_STATUS_PRESSURE_READY, BARO_STATUS_TEMPERATURE_READY, BARO_TEMP_OFFSET_CELSIUS,
    INERTIAL_BLOCK_LEN, MAG_BLOCK_LEN, MAG_GAUSS_PER_LSB,
};
use crate::devices::altitude_from_pressure;

/// Decodes sensor blocks and drives the calibration engine
#[derive(Debug)]
pub struct MeasurementDecoder {
    calibration: GyroBiasCalibration,
    gyro_deg_per_lsb: f32,
    accel_g_per_lsb: f32,
    last_mag: Axis3,
    raw_pressure: u32,
    raw_temperature: i16,
    altitude_model: fn(f32) -> f32,
}

impl MeasurementDecoder {
    /// Create a decoder for the configured full-scale ranges
    ///
    /// # Arguments
    ///
    /// * `gyro_deg_per_lsb` - Gyro scale factor for the configured range
    /// * `accel_g_per_lsb` - Accelerometer scale factor for the configured range
    #[must_use]
    pub fn new(gyro_deg_per_lsb: f32, accel_g_per_lsb: f32) -> Self {
        Self {
            calibration: GyroBiasCalibration::new(accel_g_per_lsb),
            gyro_deg_per_lsb,
            accel_g_per_lsb,
            last_mag: Axis3::default(),
            raw_pressure: 0,
            raw_temperature: 0,
            altitude_model: altitude_from_pressure,
        }
    }

    /// Replace the barometric-formula collaborator
    #[must_use]
    pub fn with_altitude_model(mut self, model: fn(f32) -> f32) -> Self {
        self.altitude_model = model;
        self
    }

    /// Calibration engine state (read-only)
    #[must_use]
    pub fn calibration(&self) -> &GyroBiasCalibration {
        &self.calibration
    }

    /// Decode the 14-byte inertial block into (gyro °/s, accel g)
    ///
    /// Feeds the calibration engine while it is warming up, then applies the
    /// frozen bias and accel scale.
    ///
    /// `block` must hold at least [`INERTIAL_BLOCK_LEN`] bytes.
    pub fn decode_inertial(&mut self, block: &[u8]) -> (Axis3, Axis3) {
        debug_assert!(block.len() >= INERTIAL_BLOCK_LEN);

        // The package sits rotated 90° on the board: the device X registers
        // carry the body Y axis, so the words are picked up swapped.
        let ay = i16::from_be_bytes([block[0], block[1]]);
        let ax = i16::from_be_bytes([block[2], block[3]]);
        let az = i16::from_be_bytes([block[4], block[5]]);
        // block[6..8] is the temperature word, not used here
        let gy = i16::from_be_bytes([block[8], block[9]]);
        let gx = i16::from_be_bytes([block[10], block[11]]);
        let gz = i16::from_be_bytes([block[12], block[13]]);

        self.calibration.update([gx, gy, gz], [ax, ay, az]);

        let bias = self.calibration.bias();
        let scale = self.calibration.accel_scale();

        let gyro = Axis3::new(
            -(f32::from(gx) - bias.x) * self.gyro_deg_per_lsb,
            (f32::from(gy) - bias.y) * self.gyro_deg_per_lsb,
            (f32::from(gz) - bias.z) * self.gyro_deg_per_lsb,
        );
        let accel = Axis3::new(
            -f32::from(ax) * self.accel_g_per_lsb / scale,
            f32::from(ay) * self.accel_g_per_lsb / scale,
            f32::from(az) * self.accel_g_per_lsb / scale,
        );

        (gyro, accel)
    }

    /// Decode the 8-byte magnetometer block into gauss
    ///
    /// Byte 0 is the status register; without its data-ready bit the previous
    /// reading is returned unchanged.
    ///
    /// `block` must hold at least [`MAG_BLOCK_LEN`] bytes.
    pub fn decode_magnetometer(&mut self, block: &[u8]) -> Axis3 {
        debug_assert!(block.len() >= MAG_BLOCK_LEN);

        if block[0] & super::types::MAG_STATUS_DATA_READY != 0 {
            let x = i16::from_le_bytes([block[1], block[2]]);
            let y = i16::from_le_bytes([block[3], block[4]]);
            let z = i16::from_le_bytes([block[5], block[6]]);

            self.last_mag = Axis3::new(
                f32::from(x) / MAG_GAUSS_PER_LSB,
                f32::from(y) / MAG_GAUSS_PER_LSB,
                f32::from(z) / MAG_GAUSS_PER_LSB,
            );
        }

        self.last_mag
    }

    /// Decode the 6-byte barometer block into mbar / °C / meters
    ///
    /// The status byte carries independent dirty bits for pressure and
    /// temperature; each gates only its own raw field, the other keeps the
    /// value retained from the previous cycle.
    ///
    /// `block` must hold at least [`BARO_BLOCK_LEN`] bytes.
    pub fn decode_barometer(&mut self, block: &[u8]) -> BaroSample {
        debug_assert!(block.len() >= BARO_BLOCK_LEN);

        if block[0] & BARO_STATUS_PRESSURE_READY != 0 {
            self.raw_pressure = (u32::from(block[3]) << 16)
                | (u32::from(block[2]) << 8)
                | u32::from(block[1]);
        }
        if block[0] & BARO_STATUS_TEMPERATURE_READY != 0 {
            self.raw_temperature = i16::from_le_bytes([block[4], block[5]]);
        }

        let pressure_mbar = self.raw_pressure as f32 / BARO_LSB_PER_MBAR;
        let temperature_celsius =
            BARO_TEMP_OFFSET_CELSIUS + f32::from(self.raw_temperature) / BARO_LSB_PER_CELSIUS;
        // No pressure seen yet: don't feed zero into the barometric formula
        let altitude_m = if pressure_mbar > 0.0 {
            (self.altitude_model)(pressure_mbar)
        } else {
            0.0
        };

        BaroSample {
            pressure_mbar,
            temperature_celsius,
            altitude_m,
        }
    }
}
