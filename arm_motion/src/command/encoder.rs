//! Motion Command Encoder.
//!
//! Pure translation of a [`MotionCommand`] into wire bytes. Nothing here
//! touches the bus; every range check runs before a frame exists, so a
//! rejected command has no side effects.
//!
//! ## Encodings
//!
//! | Encoding | Layout                                                       |
//! |----------|--------------------------------------------------------------|
//! | Direct   | `[addr, func, payload..., 0x6B]`                             |
//! | Envelope | `[0x00, 0xAA, len_hi, len_lo, direct_frame..., 0x6B]`        |
//!
//! `len` counts the concatenated sub-frames plus the closing trailer.
//! Sub-frames inside an envelope never carry the sync-stage flag: the
//! envelope itself is the synchronization point.

use std::collections::BTreeMap;

use arm_common::bus::DeviceLimits;
use arm_common::consts::{
    BROADCAST_ADDRESS, ENVELOPE_OVERHEAD, FRAME_TRAILER, MAX_DIRECT_FRAME_LEN, MAX_FRAME_LEN,
};
use arm_common::error::{MotionError, MotionResult};
use arm_common::homing::{HomingMode, HomingParameters};
use arm_common::joint::AxisId;
use static_assertions::const_assert;

use super::protocol::{FunctionCode, aux, to_tenths_u16, to_tenths_u32};

/// Encoded frame buffer.
pub type Frame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Direct frame sizes per mode, address and trailer included.
pub const POSITION_FRAME_LEN: usize = 12;
pub const TRAPEZOID_FRAME_LEN: usize = 16;
pub const SPEED_FRAME_LEN: usize = 9;
pub const TORQUE_FRAME_LEN: usize = 9;

const_assert!(TRAPEZOID_FRAME_LEN <= MAX_DIRECT_FRAME_LEN);
const_assert!(POSITION_FRAME_LEN <= MAX_DIRECT_FRAME_LEN);
const_assert!(SPEED_FRAME_LEN <= MAX_DIRECT_FRAME_LEN && TORQUE_FRAME_LEN <= MAX_DIRECT_FRAME_LEN);

// ─── Command Model ──────────────────────────────────────────────────

/// Command mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionMode {
    Position,
    Trapezoid,
    Speed,
    Torque,
    Homing,
}

/// Rotation direction carried on the wire (0 = positive, 1 = negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireDirection {
    Positive = 0,
    Negative = 1,
}

impl WireDirection {
    #[inline]
    pub fn of(value: f64) -> Self {
        if value < 0.0 {
            Self::Negative
        } else {
            Self::Positive
        }
    }
}

/// Target values per mode. Angles are motor-side degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionTarget {
    Position {
        angle_deg: f64,
        speed_rpm: f64,
        absolute: bool,
    },
    Trapezoid {
        angle_deg: f64,
        speed_rpm: f64,
        accel_rpm_s: f64,
        decel_rpm_s: f64,
        absolute: bool,
    },
    /// Signed speed; the sign selects the direction.
    Speed { speed_rpm: f64, accel_rpm_s: f64 },
    /// Signed current; the sign selects the direction.
    Torque { current_ma: f64, slope_ma_s: f64 },
    Homing { mode: HomingMode },
}

/// One per-axis command. Immutable once encoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCommand {
    pub axis: AxisId,
    pub target: MotionTarget,
    /// Stage and wait for the synchronized execute broadcast.
    pub stage: bool,
}

impl MotionCommand {
    pub fn new(axis: AxisId, target: MotionTarget) -> Self {
        Self {
            axis,
            target,
            stage: false,
        }
    }

    pub fn staged(mut self, stage: bool) -> Self {
        self.stage = stage;
        self
    }

    pub fn mode(&self) -> MotionMode {
        match self.target {
            MotionTarget::Position { .. } => MotionMode::Position,
            MotionTarget::Trapezoid { .. } => MotionMode::Trapezoid,
            MotionTarget::Speed { .. } => MotionMode::Speed,
            MotionTarget::Torque { .. } => MotionMode::Torque,
            MotionTarget::Homing { .. } => MotionMode::Homing,
        }
    }

    /// Direction derived from the sign of the target.
    pub fn direction(&self) -> WireDirection {
        match self.target {
            MotionTarget::Position { angle_deg, .. }
            | MotionTarget::Trapezoid { angle_deg, .. } => WireDirection::of(angle_deg),
            MotionTarget::Speed { speed_rpm, .. } => WireDirection::of(speed_rpm),
            MotionTarget::Torque { current_ma, .. } => WireDirection::of(current_ma),
            MotionTarget::Homing { .. } => WireDirection::Positive,
        }
    }

    pub fn function_code(&self) -> FunctionCode {
        match self.target {
            MotionTarget::Position { .. } => FunctionCode::PositionDirect,
            MotionTarget::Trapezoid { .. } => FunctionCode::PositionTrapezoid,
            MotionTarget::Speed { .. } => FunctionCode::Speed,
            MotionTarget::Torque { .. } => FunctionCode::Torque,
            MotionTarget::Homing { .. } => FunctionCode::TriggerHoming,
        }
    }
}

// ─── Validation ─────────────────────────────────────────────────────

fn check(axis: AxisId, field: &'static str, value: f64, min: f64, max: f64) -> MotionResult<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(MotionError::Range {
            axis,
            field,
            value,
            min,
            max,
        })
    }
}

/// Range-check a command against device bounds.
pub fn validate(cmd: &MotionCommand, limits: &DeviceLimits) -> MotionResult<()> {
    let a = cmd.axis;
    if a == BROADCAST_ADDRESS {
        return Err(MotionError::Config(
            "axis 0 is the broadcast address".to_string(),
        ));
    }
    let pos = limits.max_position_deg;
    let spd = limits.max_speed_rpm;
    let acc = limits.max_accel_rpm_s;
    match cmd.target {
        MotionTarget::Position {
            angle_deg,
            speed_rpm,
            ..
        } => {
            check(a, "angle_deg", angle_deg, -pos, pos)?;
            check(a, "speed_rpm", speed_rpm.abs(), 0.0, spd)
        }
        MotionTarget::Trapezoid {
            angle_deg,
            speed_rpm,
            accel_rpm_s,
            decel_rpm_s,
            ..
        } => {
            check(a, "angle_deg", angle_deg, -pos, pos)?;
            check(a, "speed_rpm", speed_rpm.abs(), 0.0, spd)?;
            check(a, "accel_rpm_s", accel_rpm_s, 0.0, acc)?;
            check(a, "decel_rpm_s", decel_rpm_s, 0.0, acc)
        }
        MotionTarget::Speed {
            speed_rpm,
            accel_rpm_s,
        } => {
            check(a, "speed_rpm", speed_rpm, -spd, spd)?;
            check(a, "accel_rpm_s", accel_rpm_s, 0.0, acc)
        }
        MotionTarget::Torque {
            current_ma,
            slope_ma_s,
        } => {
            let cur = limits.max_current_ma;
            check(a, "current_ma", current_ma, -cur, cur)?;
            check(a, "slope_ma_s", slope_ma_s, 0.0, u16::MAX as f64)
        }
        MotionTarget::Homing { .. } => Ok(()),
    }
}

// ─── Byte Assembly ──────────────────────────────────────────────────

/// Bounded byte writer over a `Frame`.
struct FrameWriter {
    buf: Frame,
}

impl FrameWriter {
    fn new() -> Self {
        Self { buf: Frame::new() }
    }

    fn u8(&mut self, axis: AxisId, v: u8) -> MotionResult<&mut Self> {
        self.buf.push(v).map_err(|_| MotionError::Protocol {
            axis,
            detail: format!("frame exceeds {MAX_FRAME_LEN} bytes"),
        })?;
        Ok(self)
    }

    fn u16(&mut self, axis: AxisId, v: u16) -> MotionResult<&mut Self> {
        self.bytes(axis, &v.to_be_bytes())
    }

    fn u32(&mut self, axis: AxisId, v: u32) -> MotionResult<&mut Self> {
        self.bytes(axis, &v.to_be_bytes())
    }

    fn bytes(&mut self, axis: AxisId, v: &[u8]) -> MotionResult<&mut Self> {
        self.buf
            .extend_from_slice(v)
            .map_err(|_| MotionError::Protocol {
                axis,
                detail: format!("frame exceeds {MAX_FRAME_LEN} bytes"),
            })?;
        Ok(self)
    }

    fn finish(self) -> Frame {
        self.buf
    }
}

fn write_body(w: &mut FrameWriter, cmd: &MotionCommand, stage: bool) -> MotionResult<()> {
    let a = cmd.axis;
    let dir = cmd.direction() as u8;
    let sync = stage as u8;
    w.u8(a, a)?.u8(a, cmd.function_code() as u8)?;
    match cmd.target {
        MotionTarget::Position {
            angle_deg,
            speed_rpm,
            absolute,
        } => {
            w.u8(a, dir)?
                .u16(a, to_tenths_u16(speed_rpm))?
                .u32(a, to_tenths_u32(angle_deg))?
                .u8(a, absolute as u8)?
                .u8(a, sync)?;
        }
        MotionTarget::Trapezoid {
            angle_deg,
            speed_rpm,
            accel_rpm_s,
            decel_rpm_s,
            absolute,
        } => {
            w.u8(a, dir)?
                .u16(a, accel_rpm_s.round() as u16)?
                .u16(a, decel_rpm_s.round() as u16)?
                .u16(a, to_tenths_u16(speed_rpm))?
                .u32(a, to_tenths_u32(angle_deg))?
                .u8(a, absolute as u8)?
                .u8(a, sync)?;
        }
        MotionTarget::Speed {
            speed_rpm,
            accel_rpm_s,
        } => {
            w.u8(a, dir)?
                .u16(a, accel_rpm_s.round() as u16)?
                .u16(a, to_tenths_u16(speed_rpm))?
                .u8(a, sync)?;
        }
        MotionTarget::Torque {
            current_ma,
            slope_ma_s,
        } => {
            w.u8(a, dir)?
                .u16(a, slope_ma_s.round() as u16)?
                .u16(a, current_ma.abs().round() as u16)?
                .u8(a, sync)?;
        }
        MotionTarget::Homing { mode } => {
            w.u8(a, mode as u8)?.u8(a, sync)?;
        }
    }
    w.u8(a, FRAME_TRAILER)?;
    Ok(())
}

// ─── Encoder ────────────────────────────────────────────────────────

/// Frame encoder holding per-axis device bounds.
#[derive(Debug, Clone, Default)]
pub struct CommandEncoder {
    default_limits: DeviceLimits,
    axis_limits: BTreeMap<AxisId, DeviceLimits>,
}

impl CommandEncoder {
    pub fn new(default_limits: DeviceLimits) -> Self {
        Self {
            default_limits,
            axis_limits: BTreeMap::new(),
        }
    }

    /// Record bounds advertised by one axis, narrowed by the defaults.
    pub fn set_axis_limits(&mut self, axis: AxisId, limits: DeviceLimits) {
        self.axis_limits
            .insert(axis, limits.intersect(&self.default_limits));
    }

    pub fn limits(&self, axis: AxisId) -> DeviceLimits {
        self.axis_limits
            .get(&axis)
            .copied()
            .unwrap_or(self.default_limits)
    }

    /// Direct encoding of one command.
    pub fn encode(&self, cmd: &MotionCommand) -> MotionResult<Frame> {
        validate(cmd, &self.limits(cmd.axis))?;
        let mut w = FrameWriter::new();
        write_body(&mut w, cmd, cmd.stage)?;
        Ok(w.finish())
    }

    /// Batched envelope covering several axes in one packet.
    pub fn encode_envelope(&self, cmds: &[MotionCommand]) -> MotionResult<Frame> {
        let Some(first) = cmds.first() else {
            return Err(MotionError::Config("empty envelope".to_string()));
        };
        for cmd in cmds {
            if !cmd.function_code().is_envelope_motion() {
                return Err(MotionError::UnsupportedMode {
                    axis: cmd.axis,
                    detail: format!("{:?} is not allowed inside an envelope", cmd.mode()),
                });
            }
            validate(cmd, &self.limits(cmd.axis))?;
        }

        let mut body = FrameWriter::new();
        for cmd in cmds {
            write_body(&mut body, cmd, false)?;
        }
        let body = body.finish();
        let len = (body.len() + 1) as u16;

        let a = first.axis;
        let mut w = FrameWriter::new();
        w.u8(a, BROADCAST_ADDRESS)?
            .u8(a, FunctionCode::Envelope as u8)?
            .u16(a, len)?
            .bytes(a, &body)?
            .u8(a, FRAME_TRAILER)?;
        let frame = w.finish();
        debug_assert!(frame.len() <= cmds.len() * MAX_DIRECT_FRAME_LEN + ENVELOPE_OVERHEAD);
        Ok(frame)
    }
}

// ─── Control Frames ─────────────────────────────────────────────────

fn fixed(bytes: &[u8]) -> Frame {
    let mut f = Frame::new();
    // control frames are far below MAX_FRAME_LEN
    let _ = f.extend_from_slice(bytes);
    f
}

/// Broadcast that releases every staged command.
pub fn sync_execute_frame() -> Frame {
    fixed(&[
        BROADCAST_ADDRESS,
        FunctionCode::SyncExecute as u8,
        aux::SYNC_EXECUTE,
        FRAME_TRAILER,
    ])
}

pub fn enable_frame(axis: AxisId, enable: bool, stage: bool) -> Frame {
    fixed(&[
        axis,
        FunctionCode::Enable as u8,
        aux::ENABLE,
        enable as u8,
        stage as u8,
        FRAME_TRAILER,
    ])
}

pub fn immediate_stop_frame(axis: AxisId, stage: bool) -> Frame {
    fixed(&[
        axis,
        FunctionCode::ImmediateStop as u8,
        aux::IMMEDIATE_STOP,
        stage as u8,
        FRAME_TRAILER,
    ])
}

/// Declare the current position as zero.
pub fn set_zero_frame(axis: AxisId, persist: bool) -> Frame {
    fixed(&[
        axis,
        FunctionCode::SetZero as u8,
        aux::SET_ZERO,
        persist as u8,
        FRAME_TRAILER,
    ])
}

pub fn force_stop_homing_frame(axis: AxisId) -> Frame {
    fixed(&[
        axis,
        FunctionCode::ForceStopHoming as u8,
        aux::FORCE_STOP_HOMING,
        FRAME_TRAILER,
    ])
}

/// Single-byte read request (`[addr, func, 0x6B]`).
pub fn read_frame(axis: AxisId, func: FunctionCode) -> Frame {
    fixed(&[axis, func as u8, FRAME_TRAILER])
}

/// Write homing parameters. Rejects sets with unavailable fields.
pub fn write_homing_params_frame(axis: AxisId, params: &HomingParameters) -> MotionResult<Frame> {
    let incomplete = || {
        MotionError::Config(format!(
            "axis {axis}: homing parameters contain unavailable fields"
        ))
    };
    let timeout = params.timeout.exact_ms().ok_or_else(incomplete)?;
    let coll_speed = params.collision_speed_rpm.value().ok_or_else(incomplete)?;
    let coll_current = params.collision_current_ma.value().ok_or_else(incomplete)?;
    let coll_time = params.collision_time_ms.value().ok_or_else(incomplete)?;
    let auto = params.auto_homing.value().ok_or_else(incomplete)?;
    params.validate().map_err(MotionError::Config)?;

    let a = axis;
    let mut w = FrameWriter::new();
    w.u8(a, axis)?
        .u8(a, FunctionCode::WriteHomingParams as u8)?
        .u8(a, aux::WRITE_HOMING_PARAMS)?
        .u8(a, params.persist as u8)?
        .u8(a, params.mode as u8)?
        .u8(a, params.direction as u8)?
        .u16(a, params.speed_rpm)?
        .u32(a, timeout)?
        .u16(a, coll_speed)?
        .u16(a, coll_current)?
        .u16(a, coll_time)?
        .u8(a, auto as u8)?
        .u8(a, FRAME_TRAILER)?;
    Ok(w.finish())
}
