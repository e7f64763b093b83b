//! # Sensor Pipeline Module
//!
//! Interrupt-triggered acquisition and calibration of the flight sensors.
//!
//! This module handles:
//! - Combined-frame decoding (inertial block plus auxiliary payloads)
//! - One-time gyro bias / accel scale calibration during warm-up
//! - Latest-value publication channels with atomic group publish
//! - Self-test orchestration across the devices

pub mod acquisition;
pub mod calibration;
pub mod channels;
pub mod decoder;
pub mod selftest;
pub mod types;

pub use acquisition::{DataReadySignal, SensorPipeline, SensorReader};
pub use types::{Axis3, BaroSample, PresenceFlags, SampleSet};
