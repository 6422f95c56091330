//! Error type of the HAL binary and library.

use arm_common::config::ConfigError;
use arm_common::error::MotionError;
use thiserror::Error;

/// Errors surfaced by the HAL layer.
#[derive(Debug, Error)]
pub enum HalError {
    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Motion core rejected an operation.
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    /// Command-line target could not be interpreted.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Report serialization failed.
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}
