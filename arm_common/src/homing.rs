//! Homing types shared by the motion core and the drive simulator.
//!
//! Defines `HomingMode`, `HomingDirection`, `HomingTier`, and the
//! `HomingParameters` record with explicit availability tags for fields a
//! wire tier does not report.
//!
//! ## Modes
//!
//! | Mode                 | Code | Tier  | Mechanism                              |
//! |----------------------|------|-------|----------------------------------------|
//! | NearestZero          | 0    | Basic | Shortest path to the stored zero       |
//! | DirectionalZero      | 1    | Basic | Travel to zero in configured direction |
//! | CollisionZero        | 2    | Basic | Drive into a stop, detect by current   |
//! | LimitSwitchZero      | 3    | Basic | Drive to a limit switch                |
//! | AbsoluteOriginZero   | 4    | Full  | Absolute encoder origin                |
//! | LastPowerDownPosition| 5    | Full  | Restore position latched at power-down |

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_COLLISION_CURRENT_MA, DEFAULT_COLLISION_SPEED_RPM, DEFAULT_COLLISION_TIME_MS,
    DEFAULT_HOMING_SPEED_RPM, DEFAULT_HOMING_TIMEOUT_MS,
};

/// Homing mode (device reference-finding procedure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HomingMode {
    #[default]
    NearestZero = 0,
    DirectionalZero = 1,
    CollisionZero = 2,
    LimitSwitchZero = 3,
    AbsoluteOriginZero = 4,
    LastPowerDownPosition = 5,
}

impl HomingMode {
    /// All modes in wire order.
    pub const ALL: [HomingMode; 6] = [
        Self::NearestZero,
        Self::DirectionalZero,
        Self::CollisionZero,
        Self::LimitSwitchZero,
        Self::AbsoluteOriginZero,
        Self::LastPowerDownPosition,
    ];

    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NearestZero),
            1 => Some(Self::DirectionalZero),
            2 => Some(Self::CollisionZero),
            3 => Some(Self::LimitSwitchZero),
            4 => Some(Self::AbsoluteOriginZero),
            5 => Some(Self::LastPowerDownPosition),
            _ => None,
        }
    }

    /// Minimum capability tier able to execute this mode.
    #[inline]
    pub const fn required_tier(&self) -> HomingTier {
        match self {
            Self::AbsoluteOriginZero | Self::LastPowerDownPosition => HomingTier::Full,
            _ => HomingTier::Basic,
        }
    }
}

/// Homing travel direction. Wire encoding: 0 = CW, 1 = CCW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum HomingDirection {
    #[default]
    Clockwise = 0,
    CounterClockwise = 1,
}

impl HomingDirection {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Clockwise),
            1 => Some(Self::CounterClockwise),
            _ => None,
        }
    }
}

/// Homing capability tier advertised by a drive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum HomingTier {
    /// Modes 0..=3.
    #[default]
    Basic,
    /// All six modes.
    Full,
}

impl HomingTier {
    /// Modes this tier can execute.
    pub fn modes(&self) -> &'static [HomingMode] {
        match self {
            Self::Basic => &HomingMode::ALL[..4],
            Self::Full => &HomingMode::ALL,
        }
    }

    #[inline]
    pub fn supports(&self, mode: HomingMode) -> bool {
        mode.required_tier() <= *self
    }
}

/// A parameter value as reported by the device.
///
/// `Unavailable` marks a field the wire tier did not return. It is never
/// replaced by a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reported<T> {
    Available(T),
    Unavailable,
}

impl<T: Copy> Reported<T> {
    /// Value if reported.
    #[inline]
    pub fn value(&self) -> Option<T> {
        match self {
            Self::Available(v) => Some(*v),
            Self::Unavailable => None,
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Homing timeout as reported by the device.
///
/// The truncated tier carries only the three high-order bytes of the
/// 32-bit millisecond value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HomingTimeout {
    /// Complete value [ms].
    Exact(u32),
    /// Bits 31..8 of the value; bits 7..0 unknown.
    HighBytesOnly(u32),
}

impl HomingTimeout {
    /// Smallest value consistent with the report [ms].
    pub const fn lower_bound_ms(&self) -> u32 {
        match self {
            Self::Exact(ms) => *ms,
            Self::HighBytesOnly(high) => *high << 8,
        }
    }

    /// Largest value consistent with the report [ms].
    pub const fn upper_bound_ms(&self) -> u32 {
        match self {
            Self::Exact(ms) => *ms,
            Self::HighBytesOnly(high) => (*high << 8) | 0xFF,
        }
    }

    /// Exact value, if known.
    pub const fn exact_ms(&self) -> Option<u32> {
        match self {
            Self::Exact(ms) => Some(*ms),
            Self::HighBytesOnly(_) => None,
        }
    }
}

/// Homing parameter set for one axis.
///
/// Built by callers with all fields available, or decoded from a device
/// read where the truncated tier leaves some fields `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomingParameters {
    pub mode: HomingMode,
    pub direction: HomingDirection,
    /// Homing speed [RPM].
    pub speed_rpm: u16,
    pub timeout: HomingTimeout,
    /// Collision detection speed threshold [RPM].
    pub collision_speed_rpm: Reported<u16>,
    /// Collision detection current threshold [mA].
    pub collision_current_ma: Reported<u16>,
    /// Collision detection time window [ms].
    pub collision_time_ms: Reported<u16>,
    /// Home automatically at power-up.
    pub auto_homing: Reported<bool>,
    /// Persist to device non-volatile storage when written.
    pub persist: bool,
}

impl Default for HomingParameters {
    fn default() -> Self {
        Self::new(HomingMode::default())
    }
}

impl HomingParameters {
    /// Complete parameter set with default speed, timeout and collision thresholds.
    pub fn new(mode: HomingMode) -> Self {
        Self {
            mode,
            direction: HomingDirection::default(),
            speed_rpm: DEFAULT_HOMING_SPEED_RPM,
            timeout: HomingTimeout::Exact(DEFAULT_HOMING_TIMEOUT_MS),
            collision_speed_rpm: Reported::Available(DEFAULT_COLLISION_SPEED_RPM),
            collision_current_ma: Reported::Available(DEFAULT_COLLISION_CURRENT_MA),
            collision_time_ms: Reported::Available(DEFAULT_COLLISION_TIME_MS),
            auto_homing: Reported::Available(false),
            persist: false,
        }
    }

    pub fn with_speed_rpm(mut self, speed_rpm: u16) -> Self {
        self.speed_rpm = speed_rpm;
        self
    }

    /// True when every field holds a device-writable value.
    pub fn is_complete(&self) -> bool {
        self.timeout.exact_ms().is_some()
            && self.collision_speed_rpm.is_available()
            && self.collision_current_ma.is_available()
            && self.collision_time_ms.is_available()
            && self.auto_homing.is_available()
    }

    /// Validate a caller-built parameter set.
    pub fn validate(&self) -> Result<(), String> {
        if self.speed_rpm == 0 {
            return Err("homing speed must be > 0".to_string());
        }
        if self.timeout.lower_bound_ms() == 0 {
            return Err("homing timeout must be > 0".to_string());
        }
        Ok(())
    }
}
