//! Prelude module for common re-exports.
//!
//! ```rust
//! use arm_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, LogLevel, MachineConfig, MotionSettings, SharedConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{BROADCAST_ADDRESS, MAX_AXES, TWIN_TICK};

// ─── Joints ─────────────────────────────────────────────────────────
pub use crate::joint::{AxisId, JointConfig, JointDirection};

// ─── Homing ─────────────────────────────────────────────────────────
pub use crate::homing::{
    HomingDirection, HomingMode, HomingParameters, HomingTier, HomingTimeout, Reported,
};

// ─── Status ─────────────────────────────────────────────────────────
pub use crate::status::{AxisStatus, HomingStatusFlags, MotorStatusFlags};

// ─── Collaborators ──────────────────────────────────────────────────
pub use crate::bus::{Ack, AxisCapabilities, AxisCapabilityProbe, BusError, DeviceLimits, RawBus, SimSink};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{MotionError, MotionResult};
