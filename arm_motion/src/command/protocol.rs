//! Drive wire protocol: function codes, response validation, read decoders.
//!
//! ## Frame shapes
//!
//! | Direction | Layout                                        |
//! |-----------|-----------------------------------------------|
//! | Request   | `[addr, func, payload..., 0x6B]`              |
//! | Control   | `[addr, func, status, 0x6B]`                  |
//! | Read      | `[addr, func, data..., 0x6B]`                 |
//! | Rejected  | `[addr, 0x00, 0xEE, 0x6B]`                    |
//!
//! Multi-byte fields are big-endian. Speed and position travel in tenths.

use arm_common::consts::{FRAME_TRAILER, WIRE_SCALE};
use arm_common::error::{MotionError, MotionResult};
use arm_common::homing::{
    HomingDirection, HomingMode, HomingParameters, HomingTimeout, Reported,
};
use arm_common::joint::AxisId;
use arm_common::status::{HomingStatusFlags, MotorStatusFlags};

// ─── Function Codes ─────────────────────────────────────────────────

/// Request function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    Enable = 0xF3,
    Torque = 0xF5,
    Speed = 0xF6,
    PositionDirect = 0xFB,
    PositionTrapezoid = 0xFD,
    ImmediateStop = 0xFE,
    SyncExecute = 0xFF,
    Envelope = 0xAA,
    SetZero = 0x93,
    TriggerHoming = 0x9A,
    ForceStopHoming = 0x9C,
    ReadHomingParams = 0x22,
    WriteHomingParams = 0x4C,
    ReadHomingStatus = 0x3B,
    ReadMotorStatus = 0x3A,
    ReadPosition = 0x36,
    ReadSpeed = 0x35,
    ReadBusVoltage = 0x24,
    ReadPhaseCurrent = 0x27,
    ReadTemperature = 0x39,
}

impl FunctionCode {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xF3 => Some(Self::Enable),
            0xF5 => Some(Self::Torque),
            0xF6 => Some(Self::Speed),
            0xFB => Some(Self::PositionDirect),
            0xFD => Some(Self::PositionTrapezoid),
            0xFE => Some(Self::ImmediateStop),
            0xFF => Some(Self::SyncExecute),
            0xAA => Some(Self::Envelope),
            0x93 => Some(Self::SetZero),
            0x9A => Some(Self::TriggerHoming),
            0x9C => Some(Self::ForceStopHoming),
            0x22 => Some(Self::ReadHomingParams),
            0x4C => Some(Self::WriteHomingParams),
            0x3B => Some(Self::ReadHomingStatus),
            0x3A => Some(Self::ReadMotorStatus),
            0x36 => Some(Self::ReadPosition),
            0x35 => Some(Self::ReadSpeed),
            0x24 => Some(Self::ReadBusVoltage),
            0x27 => Some(Self::ReadPhaseCurrent),
            0x39 => Some(Self::ReadTemperature),
            _ => None,
        }
    }

    /// Motion codes permitted inside a multi-axis envelope.
    #[inline]
    pub const fn is_envelope_motion(&self) -> bool {
        matches!(
            self,
            Self::Torque | Self::Speed | Self::PositionDirect | Self::PositionTrapezoid
        )
    }
}

/// Auxiliary guard bytes that follow certain function codes.
pub mod aux {
    pub const ENABLE: u8 = 0xAB;
    pub const IMMEDIATE_STOP: u8 = 0x98;
    pub const SYNC_EXECUTE: u8 = 0x66;
    pub const SET_ZERO: u8 = 0x88;
    pub const FORCE_STOP_HOMING: u8 = 0x48;
    pub const WRITE_HOMING_PARAMS: u8 = 0xAE;
}

/// Control response status byte.
pub mod status {
    pub const OK: u8 = 0x02;
    pub const CONDITION_NOT_MET: u8 = 0xE2;
    pub const COMMAND_ERROR: u8 = 0xEE;
}

/// Full homing parameter read length.
pub const HOMING_PARAMS_FULL_LEN: usize = 15;

/// Truncated homing parameter read length.
pub const HOMING_PARAMS_TRUNCATED_LEN: usize = 7;

// ─── Field Helpers ──────────────────────────────────────────────────

/// Scale a non-negative magnitude to tenths, saturating at the field width.
#[inline]
pub fn to_tenths_u16(value: f64) -> u16 {
    (value.abs() * WIRE_SCALE).round().min(u16::MAX as f64) as u16
}

#[inline]
pub fn to_tenths_u32(value: f64) -> u32 {
    (value.abs() * WIRE_SCALE).round().min(u32::MAX as f64) as u32
}

#[inline]
fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

#[inline]
fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn signed(sign_byte: u8, magnitude: f64) -> f64 {
    if sign_byte == 0 { magnitude } else { -magnitude }
}

fn protocol(axis: AxisId, detail: impl Into<String>) -> MotionError {
    MotionError::Protocol {
        axis,
        detail: detail.into(),
    }
}

// ─── Response Validation ────────────────────────────────────────────

/// Strip address, function code and trailer from a read response.
///
/// Returns the data bytes.
pub fn read_data(axis: AxisId, func: FunctionCode, response: &[u8]) -> MotionResult<&[u8]> {
    if response.len() < 4 {
        return Err(protocol(
            axis,
            format!("response too short ({} bytes)", response.len()),
        ));
    }
    let last = response.len() - 1;
    if response[last] != FRAME_TRAILER {
        return Err(protocol(axis, format!("bad trailer 0x{:02X}", response[last])));
    }
    if response[0] != axis {
        return Err(protocol(
            axis,
            format!("response from axis {} for axis {axis}", response[0]),
        ));
    }
    if response[1] == 0x00 && response[2] == status::COMMAND_ERROR {
        return Err(protocol(axis, "command rejected by device"));
    }
    if response[1] != func as u8 {
        return Err(protocol(
            axis,
            format!(
                "function mismatch: expected 0x{:02X}, got 0x{:02X}",
                func as u8, response[1]
            ),
        ));
    }
    Ok(&response[2..last])
}

/// Validate a control acknowledgement. An empty response is accepted.
pub fn check_control_ack(axis: AxisId, func: FunctionCode, response: &[u8]) -> MotionResult<()> {
    if response.is_empty() {
        return Ok(());
    }
    let data = read_data(axis, func, response)?;
    match data.first().copied() {
        Some(status::OK) => Ok(()),
        Some(status::CONDITION_NOT_MET) => Err(protocol(axis, "condition not met")),
        Some(status::COMMAND_ERROR) => Err(protocol(axis, "command error")),
        Some(other) => Err(protocol(axis, format!("unknown status 0x{other:02X}"))),
        None => Err(protocol(axis, "missing status byte")),
    }
}

fn expect_len(axis: AxisId, what: &str, data: &[u8], len: usize) -> MotionResult<()> {
    if data.len() != len {
        return Err(protocol(
            axis,
            format!("{what}: expected {len} data bytes, got {}", data.len()),
        ));
    }
    Ok(())
}

// ─── Read Decoders ──────────────────────────────────────────────────

/// Motor shaft position [deg].
pub fn decode_position(axis: AxisId, data: &[u8]) -> MotionResult<f64> {
    expect_len(axis, "position", data, 5)?;
    Ok(signed(data[0], be_u32(&data[1..5]) as f64 / WIRE_SCALE))
}

/// Motor speed [RPM].
pub fn decode_speed(axis: AxisId, data: &[u8]) -> MotionResult<f64> {
    expect_len(axis, "speed", data, 3)?;
    Ok(signed(data[0], be_u16(&data[1..3]) as f64 / WIRE_SCALE))
}

/// Bus voltage [V].
pub fn decode_bus_voltage(axis: AxisId, data: &[u8]) -> MotionResult<f64> {
    expect_len(axis, "bus voltage", data, 2)?;
    Ok(be_u16(data) as f64 / 1000.0)
}

/// Phase current [A].
pub fn decode_phase_current(axis: AxisId, data: &[u8]) -> MotionResult<f64> {
    expect_len(axis, "phase current", data, 2)?;
    Ok(be_u16(data) as f64 / 1000.0)
}

/// Driver temperature [°C].
pub fn decode_temperature(axis: AxisId, data: &[u8]) -> MotionResult<f64> {
    expect_len(axis, "temperature", data, 2)?;
    Ok(signed(data[0], data[1] as f64))
}

pub fn decode_motor_flags(axis: AxisId, data: &[u8]) -> MotionResult<MotorStatusFlags> {
    expect_len(axis, "motor status", data, 1)?;
    Ok(MotorStatusFlags::from_bits_truncate(data[0]))
}

pub fn decode_homing_flags(axis: AxisId, data: &[u8]) -> MotionResult<HomingStatusFlags> {
    expect_len(axis, "homing status", data, 1)?;
    Ok(HomingStatusFlags::from_bits_truncate(data[0]))
}

/// Decode a homing parameter read.
///
/// The full tier returns every field. The truncated tier returns mode,
/// direction, speed and the three high bytes of the timeout; everything
/// else is reported `Unavailable`.
pub fn decode_homing_params(axis: AxisId, data: &[u8]) -> MotionResult<HomingParameters> {
    if data.len() != HOMING_PARAMS_FULL_LEN && data.len() != HOMING_PARAMS_TRUNCATED_LEN {
        return Err(protocol(
            axis,
            format!(
                "homing params: expected {HOMING_PARAMS_FULL_LEN} or \
                 {HOMING_PARAMS_TRUNCATED_LEN} data bytes, got {}",
                data.len()
            ),
        ));
    }

    let mode = HomingMode::from_u8(data[0])
        .ok_or_else(|| protocol(axis, format!("unknown homing mode {}", data[0])))?;
    let direction = HomingDirection::from_u8(data[1])
        .ok_or_else(|| protocol(axis, format!("unknown homing direction {}", data[1])))?;
    let speed_rpm = be_u16(&data[2..4]);

    if data.len() == HOMING_PARAMS_TRUNCATED_LEN {
        let high = u32::from_be_bytes([0, data[4], data[5], data[6]]);
        return Ok(HomingParameters {
            mode,
            direction,
            speed_rpm,
            timeout: HomingTimeout::HighBytesOnly(high),
            collision_speed_rpm: Reported::Unavailable,
            collision_current_ma: Reported::Unavailable,
            collision_time_ms: Reported::Unavailable,
            auto_homing: Reported::Unavailable,
            persist: false,
        });
    }

    Ok(HomingParameters {
        mode,
        direction,
        speed_rpm,
        timeout: HomingTimeout::Exact(be_u32(&data[4..8])),
        collision_speed_rpm: Reported::Available(be_u16(&data[8..10])),
        collision_current_ma: Reported::Available(be_u16(&data[10..12])),
        collision_time_ms: Reported::Available(be_u16(&data[12..14])),
        auto_homing: Reported::Available(data[14] != 0),
        persist: false,
    })
}
