//! # Device Collaborator Module
//!
//! Trait seams for the three sensor devices behind the pipeline.
//!
//! Register maps and power-up write sequences belong to the device drivers;
//! the pipeline only drives the operations it needs: connectivity probes,
//! mode changes, self-tests, and the primary device's bus-master mux that
//! appends auxiliary payloads to each combined read.

use async_trait::async_trait;

use crate::error::Result;

/// Read bit ORed into an auxiliary slave address by the bus master
pub const AUX_SLAVE_READ_BIT: u8 = 0x80;

/// Auto-increment flag ORed into a register address for devices that expose
/// their sample block behind an auto-incrementing pointer
pub const REGISTER_AUTO_INCREMENT: u8 = 0x80;

/// Gyro digital low-pass filter bandwidth selection
///
/// Both settings keep the primary device's output at 500 Hz; they differ in
/// the internal sampling clock the rate dividers are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowPassFilter {
    /// 256 Hz bandwidth, 8 kHz internal sampling
    Bw256Hz,
    /// 98 Hz bandwidth, 1 kHz internal sampling
    Bw98Hz,
}

impl LowPassFilter {
    /// Sample-rate divider keeping the output data rate at 500 Hz
    #[must_use]
    pub fn sample_rate_divider(self) -> u8 {
        match self {
            // 8000 / (1 + 15) = 500 Hz
            Self::Bw256Hz => 15,
            // 1000 / (1 + 1) = 500 Hz
            Self::Bw98Hz => 1,
        }
    }

    /// Divider for the bus-master auxiliary reads.
    ///
    /// Derived from the fixed internal sampling clock, independent of which
    /// auxiliary devices end up enabled.
    #[must_use]
    pub fn aux_read_divider(self) -> u8 {
        match self {
            // Slaves read at 500 Hz = 8000 / (1 + 15)
            Self::Bw256Hz => 15,
            // Slaves read at 100 Hz = 500 / (1 + 4)
            Self::Bw98Hz => 4,
        }
    }
}

/// Resolved primary-device settings handed to the collaborator's power-up
/// sequence
#[derive(Debug, Clone, Copy)]
pub struct ImuSettings {
    /// Gyro full-scale range in degrees per second
    pub gyro_range_dps: u16,
    /// Accelerometer full-scale range in g
    pub accel_range_g: u16,
    /// Gyro low-pass filter bandwidth
    pub lowpass: LowPassFilter,
    /// Sample-rate divider for the configured filter
    pub sample_rate_divider: u8,
}

/// Interrupt pin semantics for the data-ready line
#[derive(Debug, Clone, Copy)]
pub struct InterruptPinConfig {
    /// Active-high (vs active-low) polarity
    pub active_high: bool,
    /// Push-pull (vs open-drain) drive
    pub push_pull: bool,
    /// Latch the line until cleared (vs 50 µs pulse)
    pub latched: bool,
    /// Clear the latch on any register read (vs status-read only)
    pub clear_on_any_read: bool,
}

/// One auxiliary read the bus master performs each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxReadTarget {
    /// Slave bus address, including [`AUX_SLAVE_READ_BIT`]
    pub device_address: u8,
    /// Register the read starts at
    pub register: u8,
    /// Payload length appended to the combined read buffer
    pub length: u8,
    /// Pace this slave with the auxiliary read divider instead of every cycle
    pub delayed: bool,
}

/// Trait for the primary inertial device (gyro + accelerometer)
///
/// The primary device also masters the bus towards the auxiliary devices.
#[async_trait]
pub trait ImuDevice: Send {
    /// Connectivity probe; `Ok(false)` means the device did not respond
    async fn probe(&mut self) -> Result<bool>;

    /// Full power-up sequence: reset, wake, clock source, ranges, filter
    async fn configure(&mut self, settings: &ImuSettings) -> Result<()>;

    /// One self-test attempt
    async fn self_test(&mut self) -> Result<bool>;

    /// Route the auxiliary bus straight to the host (true) or to the
    /// bus master (false)
    async fn set_bus_bypass(&mut self, enabled: bool) -> Result<()>;

    /// Enable the internal bus master towards the auxiliary devices
    async fn set_bus_master(&mut self, enabled: bool) -> Result<()>;

    /// Program the divider pacing delayed auxiliary reads
    async fn set_aux_read_divider(&mut self, divider: u8) -> Result<()>;

    /// Program the data-ready interrupt pin semantics
    async fn set_interrupt_pin(&mut self, config: &InterruptPinConfig) -> Result<()>;

    /// Program and enable one auxiliary read slot (0 or 1)
    async fn configure_aux_slot(&mut self, slot: usize, target: &AuxReadTarget) -> Result<()>;

    /// Enable the data-ready interrupt; last step of bring-up
    async fn set_data_ready_interrupt(&mut self, enabled: bool) -> Result<()>;

    /// Bus address of the primary device
    fn address(&self) -> u8;

    /// First register of the 14-byte sample block
    fn sample_register(&self) -> u8;
}

/// Trait for the magnetometer auxiliary device
#[async_trait]
pub trait MagDevice: Send {
    /// Connectivity probe
    async fn probe(&mut self) -> Result<bool>;

    /// Start continuous 16-bit sampling
    async fn start_continuous(&mut self) -> Result<()>;

    /// Self-test, run at most once per boot
    async fn self_test(&mut self) -> Result<bool>;

    /// Bus address
    fn address(&self) -> u8;

    /// Status register the 8-byte auxiliary read starts at
    fn status_register(&self) -> u8;
}

/// Trait for the barometer auxiliary device
#[async_trait]
pub trait BaroDevice: Send {
    /// Connectivity probe
    async fn probe(&mut self) -> Result<bool>;

    /// Power the measurement engine on or off
    async fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    /// Self-test, run at most once per boot
    async fn self_test(&mut self) -> Result<bool>;

    /// Bus address
    fn address(&self) -> u8;

    /// Status register the 6-byte auxiliary read starts at; the mux applies
    /// [`REGISTER_AUTO_INCREMENT`] on top
    fn status_register(&self) -> u8;
}

/// Altitude above sea level from pressure, via the barometric formula.
///
/// Constants match the barometer driver's reference atmosphere (1015.7 mbar,
/// 25 °C, 6.5 mK/m lapse rate).
#[must_use]
pub fn altitude_from_pressure(pressure_mbar: f32) -> f32 {
    const REFERENCE_PRESSURE_MBAR: f32 = 1015.7;
    const PRESSURE_EXPONENT: f32 = 0.190_263_1;
    const REFERENCE_TEMP_CELSIUS: f32 = 25.0;
    const LAPSE_RATE_K_PER_M: f32 = 0.0065;

    ((REFERENCE_PRESSURE_MBAR / pressure_mbar).powf(PRESSURE_EXPONENT) - 1.0)
        * (REFERENCE_TEMP_CELSIUS + 273.15)
        / LAPSE_RATE_K_PER_M
}
