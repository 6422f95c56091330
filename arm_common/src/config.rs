//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across the arm motion applications, plus the machine description consumed
//! by the motion core.
//!
//! # Usage
//!
//! ```rust,no_run
//! use arm_common::config::{ConfigLoader, MachineConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MachineConfig::load_validated(Path::new("machine.toml"))?;
//!     println!("{} joints", config.joints.len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::DeviceLimits;
use crate::consts::{CANCEL_JOIN_TIMEOUT, MAX_AXES, TWIN_TICK};
use crate::joint::JointConfig;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "arm-sim-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Motion Settings ────────────────────────────────────────────────

/// Timing and bound settings of the motion core.
///
/// # TOML Example
///
/// ```toml
/// [motion]
/// twin_tick_ms = 40
/// cancel_timeout_ms = 500
/// homing_poll_ms = 100
///
/// [motion.limits]
/// max_speed_rpm = 3000.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Twin sample period [ms].
    #[serde(default = "default_twin_tick_ms")]
    pub twin_tick_ms: u64,

    /// Bounded wait for a cancelled twin worker [ms].
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,

    /// Homing supervision poll period [ms].
    #[serde(default = "default_homing_poll_ms")]
    pub homing_poll_ms: u64,

    /// Upper command bounds applied on top of device-advertised bounds.
    #[serde(default)]
    pub limits: DeviceLimits,
}

fn default_twin_tick_ms() -> u64 {
    TWIN_TICK.as_millis() as u64
}

fn default_cancel_timeout_ms() -> u64 {
    CANCEL_JOIN_TIMEOUT.as_millis() as u64
}

fn default_homing_poll_ms() -> u64 {
    100
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            twin_tick_ms: default_twin_tick_ms(),
            cancel_timeout_ms: default_cancel_timeout_ms(),
            homing_poll_ms: default_homing_poll_ms(),
            limits: DeviceLimits::default(),
        }
    }
}

impl MotionSettings {
    #[inline]
    pub fn twin_tick(&self) -> Duration {
        Duration::from_millis(self.twin_tick_ms)
    }

    #[inline]
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    #[inline]
    pub fn homing_poll(&self) -> Duration {
        Duration::from_millis(self.homing_poll_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.twin_tick_ms == 0 {
            return Err("twin_tick_ms must be > 0".to_string());
        }
        if self.homing_poll_ms == 0 {
            return Err("homing_poll_ms must be > 0".to_string());
        }
        self.limits.validate()
    }
}

// ─── Machine Config ─────────────────────────────────────────────────

/// Machine description: shared settings, motion settings, joint table.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "arm"
///
/// [[joints]]
/// axis_id = 1
/// reducer_ratio = 62.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub motion: MotionSettings,
    #[serde(default)]
    pub joints: Vec<JointConfig>,
}

impl MachineConfig {
    /// Load and validate in one step.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate shared settings, motion settings and every joint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.motion
            .validate()
            .map_err(ConfigError::ValidationError)?;

        if self.joints.len() > MAX_AXES {
            return Err(ConfigError::ValidationError(format!(
                "{} joints exceed MAX_AXES ({MAX_AXES})",
                self.joints.len()
            )));
        }

        let mut seen = BTreeSet::new();
        for joint in &self.joints {
            joint.validate().map_err(ConfigError::ValidationError)?;
            if !seen.insert(joint.axis_id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate axis_id {}",
                    joint.axis_id
                )));
            }
        }
        Ok(())
    }

    /// Axis ids in table order.
    pub fn axis_ids(&self) -> Vec<crate::joint::AxisId> {
        self.joints.iter().map(|j| j.axis_id).collect()
    }
}
