//! HAL configuration: the machine description plus simulator settings.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "arm-sim"
//!
//! [[joints]]
//! axis_id = 1
//! reducer_ratio = 62.0
//!
//! [sim]
//! bus_voltage_mv = 24000
//!
//! [[sim.axes]]
//! axis_id = 1
//! homing_tier = "full"
//! homing_polls = 5
//! ```
//!
//! Axes without a `[[sim.axes]]` entry get a default simulated drive.

use std::collections::BTreeSet;
use std::path::Path;

use arm_common::config::{ConfigError, ConfigLoader, MachineConfig};
use arm_common::homing::HomingTier;
use arm_common::joint::AxisId;
use serde::{Deserialize, Serialize};

/// Full HAL configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalConfig {
    /// Machine description consumed by the motion core.
    #[serde(flatten)]
    pub machine: MachineConfig,

    /// Simulated drive chain.
    #[serde(default)]
    pub sim: SimConfig,
}

/// Simulated drive chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Per-axis overrides.
    #[serde(default)]
    pub axes: Vec<SimAxisConfig>,

    /// Reported supply voltage [mV].
    #[serde(default = "default_bus_voltage_mv")]
    pub bus_voltage_mv: u16,

    /// Reported drive temperature [°C].
    #[serde(default = "default_temperature_c")]
    pub temperature_c: i8,
}

fn default_bus_voltage_mv() -> u16 {
    24_000
}

fn default_temperature_c() -> i8 {
    35
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            axes: Vec::new(),
            bus_voltage_mv: default_bus_voltage_mv(),
            temperature_c: default_temperature_c(),
        }
    }
}

/// Behaviour of one simulated drive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimAxisConfig {
    /// Bus address.
    pub axis_id: AxisId,

    /// Drive accepts the multi-axis envelope.
    #[serde(default = "default_true")]
    pub single_packet: bool,

    /// Advertised homing mode set.
    #[serde(default)]
    pub homing_tier: HomingTier,

    /// Homing status reads before the procedure finishes.
    #[serde(default = "default_homing_polls")]
    pub homing_polls: u32,

    /// Parameter reads return the short 7-byte layout.
    #[serde(default)]
    pub truncated_params: bool,

    /// Homing always ends with the failure flag set.
    #[serde(default)]
    pub fail_homing: bool,

    /// Drive does not answer at all.
    #[serde(default)]
    pub offline: bool,

    /// Motor position at power-up [deg].
    #[serde(default)]
    pub initial_deg: f64,
}

fn default_true() -> bool {
    true
}

fn default_homing_polls() -> u32 {
    3
}

impl SimAxisConfig {
    /// Default drive at `axis_id`.
    pub fn new(axis_id: AxisId) -> Self {
        Self {
            axis_id,
            single_packet: true,
            homing_tier: HomingTier::default(),
            homing_polls: default_homing_polls(),
            truncated_params: false,
            fail_homing: false,
            offline: false,
            initial_deg: 0.0,
        }
    }
}

impl HalConfig {
    /// Load and validate in one step.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the machine description and the simulator overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a duplicate or unknown
    /// simulated axis, or a zero homing poll count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.machine.validate()?;

        let joints: BTreeSet<AxisId> = self.machine.axis_ids().into_iter().collect();
        let mut seen = BTreeSet::new();
        for axis in &self.sim.axes {
            if !seen.insert(axis.axis_id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate sim axis {}",
                    axis.axis_id
                )));
            }
            if !joints.contains(&axis.axis_id) {
                return Err(ConfigError::ValidationError(format!(
                    "sim axis {} has no joint entry",
                    axis.axis_id
                )));
            }
            if axis.homing_polls == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "sim axis {}: homing_polls must be > 0",
                    axis.axis_id
                )));
            }
        }
        Ok(())
    }

    /// Simulator settings for `axis`, defaulted when not listed.
    pub fn sim_axis(&self, axis: AxisId) -> SimAxisConfig {
        self.sim
            .axes
            .iter()
            .find(|a| a.axis_id == axis)
            .cloned()
            .unwrap_or_else(|| SimAxisConfig::new(axis))
    }
}
