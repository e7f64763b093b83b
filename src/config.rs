//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The original firmware selected the gyro low-pass bandwidth and the optional
//! auxiliary devices at compile time. Here both are plain configuration fields,
//! resolved once at startup and constant for the process lifetime.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::devices::LowPassFilter;
use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub imu: ImuConfig,

    #[serde(default)]
    pub devices: DeviceConfig,
}

/// Acquisition pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Settle time before device bring-up, in milliseconds.
    ///
    /// The sensors need time to power up before the first register access;
    /// the original firmware waits a full second after boot.
    #[serde(default = "default_startup_settle_ms")]
    pub startup_settle_ms: u64,
}

/// Primary inertial device configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ImuConfig {
    /// Gyro full-scale range in degrees per second (250, 500, 1000 or 2000)
    #[serde(default = "default_gyro_range_dps")]
    pub gyro_range_dps: u16,

    /// Accelerometer full-scale range in g (2, 4, 8 or 16)
    #[serde(default = "default_accel_range_g")]
    pub accel_range_g: u16,

    /// Gyro digital low-pass filter bandwidth: "256hz" or "98hz".
    ///
    /// 256 Hz only works with little vibration; 98 Hz handles unbalanced
    /// propellers better but costs agility.
    #[serde(default = "default_lowpass")]
    pub lowpass: String,
}

/// Optional auxiliary device enablement
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Probe for and use the magnetometer if it responds
    #[serde(default = "default_enable_magnetometer")]
    pub enable_magnetometer: bool,

    /// Probe for and use the barometer if it responds
    #[serde(default = "default_enable_barometer")]
    pub enable_barometer: bool,
}

// Default value functions
fn default_startup_settle_ms() -> u64 { 1000 }

fn default_gyro_range_dps() -> u16 { 2000 }
fn default_accel_range_g() -> u16 { 8 }
fn default_lowpass() -> String { "256hz".to_string() }

fn default_enable_magnetometer() -> bool { true }
fn default_enable_barometer() -> bool { true }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            startup_settle_ms: default_startup_settle_ms(),
        }
    }
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            gyro_range_dps: default_gyro_range_dps(),
            accel_range_g: default_accel_range_g(),
            lowpass: default_lowpass(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enable_magnetometer: default_enable_magnetometer(),
            enable_barometer: default_enable_barometer(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            imu: ImuConfig::default(),
            devices: DeviceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if a range or filter selection is not one the primary
    /// device supports.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.imu.gyro_range_dps, 250 | 500 | 1000 | 2000) {
            return Err(toml::de::Error::custom(format!(
                "invalid gyro_range_dps: {} (expected 250, 500, 1000 or 2000)",
                self.imu.gyro_range_dps
            ))
            .into());
        }

        if !matches!(self.imu.accel_range_g, 2 | 4 | 8 | 16) {
            return Err(toml::de::Error::custom(format!(
                "invalid accel_range_g: {} (expected 2, 4, 8 or 16)",
                self.imu.accel_range_g
            ))
            .into());
        }

        if self.lowpass_filter().is_none() {
            return Err(toml::de::Error::custom(format!(
                "invalid lowpass: {:?} (expected \"256hz\" or \"98hz\")",
                self.imu.lowpass
            ))
            .into());
        }

        Ok(())
    }

    /// Resolved low-pass filter selection
    #[must_use]
    pub fn lowpass_filter(&self) -> Option<LowPassFilter> {
        match self.imu.lowpass.to_ascii_lowercase().as_str() {
            "256hz" => Some(LowPassFilter::Bw256Hz),
            "98hz" => Some(LowPassFilter::Bw98Hz),
            _ => None,
        }
    }

    /// Gyro scale factor in degrees per second per LSB for the configured range
    #[must_use]
    pub fn gyro_deg_per_lsb(&self) -> f32 {
        2.0 * f32::from(self.imu.gyro_range_dps) / 65536.0
    }

    /// Accelerometer scale factor in g per LSB for the configured range
    #[must_use]
    pub fn accel_g_per_lsb(&self) -> f32 {
        2.0 * f32::from(self.imu.accel_range_g) / 65536.0
    }
}
