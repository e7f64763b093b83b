//! # Simulated Devices
//!
//! Stand-ins for the real bus and device drivers so the demo binary runs on a
//! desk with no hardware attached. The bus synthesizes combined frames in the
//! exact layout the bus-master mux produces; the devices answer every probe
//! and self-test.

use async_trait::async_trait;

use sensor_pipeline::bus::SensorBus;
use sensor_pipeline::devices::{
    AuxReadTarget, BaroDevice, ImuDevice, ImuSettings, InterruptPinConfig, MagDevice,
};
use sensor_pipeline::error::Result;

/// Resting gyro counts, the bias the calibration should find
const GYRO_BIAS_LSB: [i16; 3] = [23, -12, 5];

/// 1 g on the z axis at the default ±8 g range
const ACCEL_Z_LSB: i16 = 4096;

/// Bus simulation producing one combined frame per read
pub struct SimBus {
    cycle: u32,
}

impl SimBus {
    pub fn new() -> Self {
        Self { cycle: 0 }
    }

    /// Deterministic low-amplitude sensor noise, ±2 LSB
    fn dither(&self, salt: u32) -> i16 {
        ((self.cycle.wrapping_mul(2654435761).wrapping_add(salt) >> 7) % 5) as i16 - 2
    }
}

#[async_trait]
impl SensorBus for SimBus {
    async fn read(
        &mut self,
        _device_address: u8,
        _register_address: u8,
        length: usize,
    ) -> Result<Vec<u8>> {
        self.cycle = self.cycle.wrapping_add(1);
        let mut frame = vec![0u8; length];

        // Inertial block, big-endian, axes swapped for the 90° mounting:
        // ay, ax, az, temp, gy, gx, gz
        frame[2..4].copy_from_slice(&self.dither(1).to_be_bytes());
        frame[4..6].copy_from_slice(&(ACCEL_Z_LSB + self.dither(2)).to_be_bytes());
        frame[8..10].copy_from_slice(&(GYRO_BIAS_LSB[1] + self.dither(3)).to_be_bytes());
        frame[10..12].copy_from_slice(&(GYRO_BIAS_LSB[0] + self.dither(4)).to_be_bytes());
        frame[12..14].copy_from_slice(&(GYRO_BIAS_LSB[2] + self.dither(5)).to_be_bytes());

        // Magnetometer block, little-endian behind its DRDY status byte
        if length >= 22 {
            frame[14] = 0x01;
            frame[15..17].copy_from_slice(&200i16.to_le_bytes());
            frame[17..19].copy_from_slice(&(-80i16).to_le_bytes());
            frame[19..21].copy_from_slice(&430i16.to_le_bytes());
        }

        // Barometer block: both dirty bits, ~1013 mbar, ~21 °C
        if length >= 28 {
            frame[22] = 0x03;
            let pressure: u32 = (1013.25 * 4096.0) as u32;
            frame[23] = pressure as u8;
            frame[24] = (pressure >> 8) as u8;
            frame[25] = (pressure >> 16) as u8;
            let temperature = ((21.0f32 - 42.5) * 480.0) as i16;
            frame[26..28].copy_from_slice(&temperature.to_le_bytes());
        }

        Ok(frame)
    }
}

/// Simulated primary device; accepts every configuration call
pub struct SimImu;

#[async_trait]
impl ImuDevice for SimImu {
    async fn probe(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn configure(&mut self, _settings: &ImuSettings) -> Result<()> {
        Ok(())
    }

    async fn self_test(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn set_bus_bypass(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn set_bus_master(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn set_aux_read_divider(&mut self, _divider: u8) -> Result<()> {
        Ok(())
    }

    async fn set_interrupt_pin(&mut self, _config: &InterruptPinConfig) -> Result<()> {
        Ok(())
    }

    async fn configure_aux_slot(&mut self, _slot: usize, _target: &AuxReadTarget) -> Result<()> {
        Ok(())
    }

    async fn set_data_ready_interrupt(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn address(&self) -> u8 {
        0x69
    }

    fn sample_register(&self) -> u8 {
        0x3B
    }
}

/// Simulated magnetometer
pub struct SimMag;

#[async_trait]
impl MagDevice for SimMag {
    async fn probe(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn start_continuous(&mut self) -> Result<()> {
        Ok(())
    }

    async fn self_test(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn address(&self) -> u8 {
        0x0C
    }

    fn status_register(&self) -> u8 {
        0x02
    }
}

/// Simulated barometer
pub struct SimBaro;

#[async_trait]
impl BaroDevice for SimBaro {
    async fn probe(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn set_enabled(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn self_test(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn address(&self) -> u8 {
        0x5D
    }

    fn status_register(&self) -> u8 {
        0x27
    }
}
