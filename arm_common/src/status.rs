//! Device status flags and the per-axis status snapshot.

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Motor status byte (read 0x3A).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MotorStatusFlags: u8 {
        /// Drive output enabled.
        const ENABLED          = 0x01;
        /// Target position reached.
        const IN_POSITION      = 0x02;
        /// Rotor stall detected.
        const STALLED          = 0x04;
        /// Stall protection has tripped and latched.
        const STALL_PROTECTION = 0x08;
    }
}

bitflags! {
    /// Homing status byte (read 0x3B).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HomingStatusFlags: u8 {
        /// Encoder ready.
        const ENCODER_READY      = 0x01;
        /// Calibration table ready.
        const CAL_TABLE_READY    = 0x02;
        /// Homing procedure running.
        const HOMING_IN_PROGRESS = 0x04;
        /// Last homing procedure failed.
        const HOMING_FAILED      = 0x08;
        /// High-precision position reference.
        const PRECISION_HIGH     = 0x80;
    }
}

impl HomingStatusFlags {
    /// Device reports homing finished without failure.
    #[inline]
    pub fn is_homed(&self) -> bool {
        !self.intersects(Self::HOMING_IN_PROGRESS | Self::HOMING_FAILED)
    }
}

/// Read-only status snapshot of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisStatus {
    pub enabled: bool,
    pub in_position: bool,
    pub stalled: bool,
    pub stall_protection_tripped: bool,
    /// Output-side joint angle [deg].
    pub position_deg: f64,
    /// Motor shaft angle [deg].
    pub motor_position_deg: f64,
    /// Motor speed [RPM], signed.
    pub speed_rpm: f64,
    /// Bus voltage [V].
    pub bus_voltage_v: f64,
    /// Phase current [A].
    pub phase_current_a: f64,
    /// Driver temperature [°C].
    pub temperature_c: f64,
    /// Conversion fell back to ratio 1 / direction +1.
    pub used_default_config: bool,
}

impl AxisStatus {
    /// Fill the boolean fields from the motor status byte.
    pub fn apply_flags(&mut self, flags: MotorStatusFlags) {
        self.enabled = flags.contains(MotorStatusFlags::ENABLED);
        self.in_position = flags.contains(MotorStatusFlags::IN_POSITION);
        self.stalled = flags.contains(MotorStatusFlags::STALLED);
        self.stall_protection_tripped = flags.contains(MotorStatusFlags::STALL_PROTECTION);
    }
}

impl Default for AxisStatus {
    fn default() -> Self {
        Self {
            enabled: false,
            in_position: false,
            stalled: false,
            stall_protection_tripped: false,
            position_deg: 0.0,
            motor_position_deg: 0.0,
            speed_rpm: 0.0,
            bus_voltage_v: 0.0,
            phase_current_a: 0.0,
            temperature_c: 0.0,
            used_default_config: false,
        }
    }
}
