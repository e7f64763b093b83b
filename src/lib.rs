//! # Sensor Pipeline Library
//!
//! Sensor acquisition and calibration pipeline for a quadrotor flight stack.
//!
//! This library provides the core functionality for reading a bus-connected
//! IMU with optional magnetometer and barometer, calibrating the gyro online,
//! and publishing scaled samples to consumers through latest-value channels.

pub mod bus;
pub mod config;
pub mod devices;
pub mod error;
pub mod sensors;
