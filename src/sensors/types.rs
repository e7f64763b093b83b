//! # Sensor Sample Types and Frame Layout
//!
//! Core definitions shared by the decoder, calibration engine and channels.

/// Length of the primary device's sample block: accel (6) + temp (2) + gyro (6)
pub const INERTIAL_BLOCK_LEN: usize = 14;

/// Length of the magnetometer auxiliary block: status + x/y/z + overflow status
pub const MAG_BLOCK_LEN: usize = 8;

/// Length of the barometer auxiliary block: status + 24-bit pressure + 16-bit temp
pub const BARO_BLOCK_LEN: usize = 6;

/// Largest combined read: inertial + magnetometer + barometer blocks
pub const MAX_FRAME_LEN: usize = INERTIAL_BLOCK_LEN + MAG_BLOCK_LEN + BARO_BLOCK_LEN;

/// Warm-up samples accumulated before the gyro bias and accel scale freeze
pub const CALIBRATION_SAMPLE_COUNT: u32 = 1024;

/// Magnetometer LSB per gauss (16-bit mode)
pub const MAG_GAUSS_PER_LSB: f32 = 666.7;

/// Barometer pressure LSB per mbar
pub const BARO_LSB_PER_MBAR: f32 = 4096.0;

/// Barometer temperature LSB per °C
pub const BARO_LSB_PER_CELSIUS: f32 = 480.0;

/// Barometer temperature offset in °C
pub const BARO_TEMP_OFFSET_CELSIUS: f32 = 42.5;

/// Data-ready bit in the magnetometer status byte
pub const MAG_STATUS_DATA_READY: u8 = 0x01;

/// Pressure-dirty bit in the barometer status byte
pub const BARO_STATUS_PRESSURE_READY: u8 = 0x02;

/// Temperature-dirty bit in the barometer status byte
pub const BARO_STATUS_TEMPERATURE_READY: u8 = 0x01;

/// Three-axis sample; unit depends on channel (°/s, g or gauss)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Axis3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Axis3 {
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Barometer sample with the altitude derived from pressure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaroSample {
    /// Pressure in mbar
    pub pressure_mbar: f32,
    /// Temperature in °C
    pub temperature_celsius: f32,
    /// Altitude above sea level in meters
    pub altitude_m: f32,
}

/// One acquisition cycle's outputs
///
/// `mag` and `baro` stay `None` for cycles where the corresponding device is
/// absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleSet {
    pub accel: Option<Axis3>,
    pub gyro: Option<Axis3>,
    pub mag: Option<Axis3>,
    pub baro: Option<BaroSample>,
}

/// Which auxiliary devices answered their connectivity probe at init.
///
/// Fixed once at device-init time, constant for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceFlags {
    pub magnetometer: bool,
    pub barometer: bool,
}

impl PresenceFlags {
    /// Combined read length for one cycle given the present devices
    #[must_use]
    pub fn frame_length(&self) -> usize {
        INERTIAL_BLOCK_LEN
            + if self.magnetometer { MAG_BLOCK_LEN } else { 0 }
            + if self.barometer { BARO_BLOCK_LEN } else { 0 }
    }
}
