//! Motion error taxonomy.
//!
//! | Variant                 | Raised by                  | Bus traffic before failure |
//! |-------------------------|----------------------------|----------------------------|
//! | Config                  | registry, config loading   | none                       |
//! | Range                   | command encoder            | none                       |
//! | UnsupportedMode         | encoder, homing gate       | none                       |
//! | Protocol                | response decoding          | yes                        |
//! | Transport               | bus                        | yes                        |
//! | AxisBusy                | homing gate                | none                       |
//! | PartialDispatchFailure  | dispatch result            | yes                        |
//! | PlanInfeasible          | trajectory planner         | none                       |

use std::collections::BTreeMap;

use thiserror::Error;

use crate::bus::BusError;
use crate::joint::AxisId;

/// Errors raised by the motion core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Axis {axis}: {field} = {value} outside [{min}, {max}]")]
    Range {
        axis: AxisId,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Axis {axis}: unsupported mode: {detail}")]
    UnsupportedMode { axis: AxisId, detail: String },

    #[error("Axis {axis}: protocol error: {detail}")]
    Protocol { axis: AxisId, detail: String },

    #[error("Axis {axis}: transport error: {source}")]
    Transport {
        axis: AxisId,
        #[source]
        source: BusError,
    },

    #[error("Axis {axis} busy: homing {state}")]
    AxisBusy { axis: AxisId, state: &'static str },

    #[error("Partial dispatch: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialDispatchFailure {
        succeeded: Vec<AxisId>,
        failed: BTreeMap<AxisId, String>,
    },

    #[error("Plan infeasible: {0}")]
    PlanInfeasible(String),
}

impl MotionError {
    /// Axis the error refers to, if any.
    pub fn axis(&self) -> Option<AxisId> {
        match self {
            Self::Range { axis, .. }
            | Self::UnsupportedMode { axis, .. }
            | Self::Protocol { axis, .. }
            | Self::Transport { axis, .. }
            | Self::AxisBusy { axis, .. } => Some(*axis),
            _ => None,
        }
    }

    /// True when the failure happened before any bus traffic.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Range { .. }
                | Self::UnsupportedMode { .. }
                | Self::AxisBusy { .. }
                | Self::PlanInfeasible(_)
        )
    }
}

impl From<crate::config::ConfigError> for MotionError {
    fn from(e: crate::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result alias for motion core operations.
pub type MotionResult<T> = Result<T, MotionError>;

/// Build a transport error for `axis`.
pub fn transport_error(axis: AxisId, source: BusError) -> MotionError {
    MotionError::Transport { axis, source }
}
