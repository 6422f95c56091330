//! Collaborator traits at the edge of the motion core.
//!
//! Provides:
//! - `RawBus` trait - send one encoded frame, receive the device response
//! - `AxisCapabilityProbe` trait - discover what an axis supports
//! - `SimSink` trait - destination of digital twin poses
//! - `BusError` enum - transport failures
//!
//! Implementations live outside the core (see the `arm_hal` crate for the
//! simulated drive bus).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    MAX_ACK_LEN, MAX_WIRE_ACCEL_RPM_S, MAX_WIRE_CURRENT_MA, MAX_WIRE_POSITION_DEG,
    MAX_WIRE_SPEED_RPM,
};
use crate::homing::HomingTier;
use crate::joint::AxisId;

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No response within the device timeout.
    #[error("Bus timeout")]
    Timeout,

    /// Channel closed or adapter gone.
    #[error("Bus disconnected: {0}")]
    Disconnected(String),

    /// Adapter rejected or mangled the frame.
    #[error("Bus I/O error: {0}")]
    Io(String),
}

/// Raw device response. Empty for broadcast or fire-and-forget frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    pub payload: heapless::Vec<u8, MAX_ACK_LEN>,
}

impl Ack {
    /// Acknowledgement with no response bytes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from response bytes, truncating to capacity.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut payload = heapless::Vec::new();
        for b in bytes.iter().take(MAX_ACK_LEN) {
            // capacity checked by take()
            let _ = payload.push(*b);
        }
        Self { payload }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.payload
    }
}

/// Physical bus channel to the drives.
pub trait RawBus: Send {
    /// Send one frame and wait for the device response.
    fn send(&mut self, frame: &[u8]) -> Result<Ack, BusError>;
}

/// Device-advertised command bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceLimits {
    /// [RPM]
    #[serde(default = "default_max_speed")]
    pub max_speed_rpm: f64,
    /// [RPM/s]
    #[serde(default = "default_max_accel")]
    pub max_accel_rpm_s: f64,
    /// Motor-side position magnitude [deg].
    #[serde(default = "default_max_position")]
    pub max_position_deg: f64,
    /// [mA]
    #[serde(default = "default_max_current")]
    pub max_current_ma: f64,
}

fn default_max_speed() -> f64 {
    MAX_WIRE_SPEED_RPM
}
fn default_max_accel() -> f64 {
    MAX_WIRE_ACCEL_RPM_S
}
fn default_max_position() -> f64 {
    MAX_WIRE_POSITION_DEG
}
fn default_max_current() -> f64 {
    MAX_WIRE_CURRENT_MA
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_speed_rpm: MAX_WIRE_SPEED_RPM,
            max_accel_rpm_s: MAX_WIRE_ACCEL_RPM_S,
            max_position_deg: MAX_WIRE_POSITION_DEG,
            max_current_ma: MAX_WIRE_CURRENT_MA,
        }
    }
}

impl DeviceLimits {
    /// Element-wise minimum of two bound sets.
    pub fn intersect(&self, other: &DeviceLimits) -> DeviceLimits {
        DeviceLimits {
            max_speed_rpm: self.max_speed_rpm.min(other.max_speed_rpm),
            max_accel_rpm_s: self.max_accel_rpm_s.min(other.max_accel_rpm_s),
            max_position_deg: self.max_position_deg.min(other.max_position_deg),
            max_current_ma: self.max_current_ma.min(other.max_current_ma),
        }
    }

    /// Validate that bounds are positive and fit the wire encoding.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("max_speed_rpm", self.max_speed_rpm, MAX_WIRE_SPEED_RPM),
            ("max_accel_rpm_s", self.max_accel_rpm_s, MAX_WIRE_ACCEL_RPM_S),
            ("max_position_deg", self.max_position_deg, MAX_WIRE_POSITION_DEG),
            ("max_current_ma", self.max_current_ma, MAX_WIRE_CURRENT_MA),
        ];
        for (name, value, wire_max) in checks {
            if !(value > 0.0 && value <= wire_max) {
                return Err(format!("{name} must be in (0, {wire_max}], got {value}"));
            }
        }
        Ok(())
    }
}

/// Capabilities reported by one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCapabilities {
    /// Accepts the multi-axis envelope in a single packet.
    pub single_packet_dispatch: bool,
    /// Homing mode set.
    pub homing_tier: HomingTier,
    pub limits: DeviceLimits,
}

impl Default for AxisCapabilities {
    fn default() -> Self {
        Self {
            single_packet_dispatch: false,
            homing_tier: HomingTier::Basic,
            limits: DeviceLimits::default(),
        }
    }
}

/// Discovers axis capabilities.
pub trait AxisCapabilityProbe {
    fn probe(&self, axis: AxisId) -> Result<AxisCapabilities, BusError>;
}

/// Destination of twin poses. Holds the last value written.
pub trait SimSink: Send + Sync {
    /// Apply a joint-space pose [deg], one entry per twin joint.
    fn set_pose(&self, joints_deg: &[f64]);
}
