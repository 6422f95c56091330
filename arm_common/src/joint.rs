//! Axis identifiers and per-joint mechanical configuration.
//!
//! A joint couples a logical (output-side) angle to the physical angle the
//! drive sees through a reducer ratio and a rotation sign:
//!
//! ```text
//! physical = logical × reducer_ratio × direction
//! ```

use serde::{Deserialize, Serialize};

/// Bus address of one joint actuator (1..=255, 0 is broadcast).
pub type AxisId = u8;

/// Rotation sign between logical and physical frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JointDirection {
    /// Physical rotation follows the logical sign.
    #[default]
    Normal,
    /// Physical rotation is mirrored.
    Inverted,
}

impl JointDirection {
    /// Signed multiplier (+1.0 / -1.0).
    #[inline]
    pub const fn sign(&self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Inverted => -1.0,
        }
    }

    /// Build from an integer sign. Only ±1 are accepted.
    #[inline]
    pub const fn from_sign(sign: i8) -> Option<Self> {
        match sign {
            1 => Some(Self::Normal),
            -1 => Some(Self::Inverted),
            _ => None,
        }
    }
}

/// Mechanical configuration of a single joint.
///
/// # TOML Example
///
/// ```toml
/// [[joints]]
/// axis_id = 1
/// reducer_ratio = 62.0
/// direction = "inverted"
/// min_deg = -170.0
/// max_deg = 170.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// Bus address.
    pub axis_id: AxisId,
    /// Motor turns per output turn, > 0.
    #[serde(default = "default_reducer_ratio")]
    pub reducer_ratio: f64,
    /// Rotation sign.
    #[serde(default)]
    pub direction: JointDirection,
    /// Lower logical angle limit [deg].
    #[serde(default)]
    pub min_deg: Option<f64>,
    /// Upper logical angle limit [deg].
    #[serde(default)]
    pub max_deg: Option<f64>,
}

fn default_reducer_ratio() -> f64 {
    1.0
}

impl JointConfig {
    /// Unlimited joint with the given ratio and direction.
    pub fn new(axis_id: AxisId, reducer_ratio: f64, direction: JointDirection) -> Self {
        Self {
            axis_id,
            reducer_ratio,
            direction,
            min_deg: None,
            max_deg: None,
        }
    }

    /// Fallback used for axes with no registered configuration.
    pub fn fallback(axis_id: AxisId) -> Self {
        Self::new(axis_id, 1.0, JointDirection::Normal)
    }

    /// Attach logical angle limits.
    pub fn with_limits(mut self, min_deg: f64, max_deg: f64) -> Self {
        self.min_deg = Some(min_deg);
        self.max_deg = Some(max_deg);
        self
    }

    /// Validate the joint configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.axis_id == crate::consts::BROADCAST_ADDRESS {
            return Err("axis_id 0 is reserved for broadcast".to_string());
        }
        if !self.reducer_ratio.is_finite() || self.reducer_ratio <= 0.0 {
            return Err(format!(
                "axis {}: reducer_ratio must be finite and > 0, got {}",
                self.axis_id, self.reducer_ratio
            ));
        }
        for (name, limit) in [("min_deg", self.min_deg), ("max_deg", self.max_deg)] {
            if let Some(value) = limit
                && !value.is_finite()
            {
                return Err(format!("axis {}: {name} must be finite", self.axis_id));
            }
        }
        if let (Some(min), Some(max)) = (self.min_deg, self.max_deg)
            && min >= max
        {
            return Err(format!(
                "axis {}: min_deg ({min}) must be < max_deg ({max})",
                self.axis_id
            ));
        }
        Ok(())
    }
}
