//! # Error Types
//!
//! Custom error types for the sensor pipeline using `thiserror`.

use thiserror::Error;

/// Main error type for the sensor pipeline
#[derive(Debug, Error)]
pub enum SensorPipelineError {
    /// Bus transaction errors (failed or short combined reads)
    #[error("Bus error: {0}")]
    Bus(String),

    /// Device collaborator errors (bring-up, mode changes, mux programming)
    #[error("Device error: {0}")]
    Device(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the sensor pipeline
pub type Result<T> = std::result::Result<T, SensorPipelineError>;
