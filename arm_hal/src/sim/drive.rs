//! One simulated closed-loop stepper drive.
//!
//! The drive answers the direct-frame protocol: motion commands, staged
//! execution, enable, stop, zeroing, homing and status reads. Motion is
//! kinematic only: a move runs at its commanded speed until it reaches the
//! target, with no ramp.
//!
//! ## Homing
//!
//! ```text
//! trigger ─► Running(polls) ─► status read × polls ─► Done   (position = 0)
//!                 │                                  └─► Failed (fail_homing)
//!                 └─ force stop ─► Idle
//! ```

use std::time::Instant;

use arm_common::consts::{
    DEFAULT_COLLISION_CURRENT_MA, DEFAULT_COLLISION_SPEED_RPM, DEFAULT_COLLISION_TIME_MS,
    DEFAULT_HOMING_SPEED_RPM, DEFAULT_HOMING_TIMEOUT_MS, FRAME_TRAILER, WIRE_SCALE,
};
use arm_common::homing::HomingMode;
use arm_common::joint::AxisId;
use arm_common::status::{HomingStatusFlags, MotorStatusFlags};
use arm_motion::command::protocol::{
    FunctionCode, HOMING_PARAMS_FULL_LEN, HOMING_PARAMS_TRUNCATED_LEN, aux, status,
};
use tracing::{debug, trace};

use crate::config::SimAxisConfig;

/// Motor degrees per second for one RPM.
const DEG_PER_S_PER_RPM: f64 = 6.0;

/// Phase current reported while the rotor turns [mA].
const MOVING_CURRENT_MA: u16 = 500;

// ─── Frame Layouts ──────────────────────────────────────────────────

const POSITION_FRAME_LEN: usize = 12;
const TRAPEZOID_FRAME_LEN: usize = 16;
const SPEED_FRAME_LEN: usize = 9;
const TORQUE_FRAME_LEN: usize = 9;
const WRITE_PARAMS_FRAME_LEN: usize = 20;

/// Length of an envelope-capable motion frame, by function code.
pub(crate) fn motion_frame_len(func: u8) -> Option<usize> {
    match FunctionCode::from_u8(func)? {
        FunctionCode::PositionDirect => Some(POSITION_FRAME_LEN),
        FunctionCode::PositionTrapezoid => Some(TRAPEZOID_FRAME_LEN),
        FunctionCode::Speed => Some(SPEED_FRAME_LEN),
        FunctionCode::Torque => Some(TORQUE_FRAME_LEN),
        _ => None,
    }
}

#[inline]
fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

#[inline]
fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn signed(dir: u8, magnitude: f64) -> f64 {
    if dir == 0 { magnitude } else { -magnitude }
}

/// `[addr, func, data..., 0x6B]`
pub(crate) fn reply(addr: AxisId, func: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 3);
    out.push(addr);
    out.push(func);
    out.extend_from_slice(data);
    out.push(FRAME_TRAILER);
    out
}

/// `[addr, 0x00, 0xEE, 0x6B]`
pub(crate) fn rejected(addr: AxisId) -> Vec<u8> {
    reply(addr, 0x00, &[status::COMMAND_ERROR])
}

// ─── Commands ───────────────────────────────────────────────────────

/// Decoded drive command, applied immediately or on the execute broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DriveCommand {
    Move {
        target_deg: f64,
        absolute: bool,
        speed_rpm: f64,
    },
    Spin {
        rpm: f64,
    },
    Torque {
        current_ma: f64,
    },
    Stop,
    Enable(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kinematics {
    Idle,
    Move { target_deg: f64, speed_rpm: f64 },
    Spin { rpm: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HomingSim {
    Idle,
    Running { polls_left: u32 },
    Done,
    Failed,
}

/// Parse one motion frame. `None` for a malformed frame.
///
/// Returns the command and its sync (staged) flag.
fn parse_motion(frame: &[u8]) -> Option<(DriveCommand, bool)> {
    let func = FunctionCode::from_u8(*frame.get(1)?)?;
    if frame.len() != motion_frame_len(func as u8)? || frame.last() != Some(&FRAME_TRAILER) {
        return None;
    }
    let dir = frame[2];
    let cmd = match func {
        FunctionCode::PositionDirect => (
            DriveCommand::Move {
                speed_rpm: f64::from(be_u16(&frame[3..5])) / WIRE_SCALE,
                target_deg: signed(dir, f64::from(be_u32(&frame[5..9])) / WIRE_SCALE),
                absolute: frame[9] != 0,
            },
            frame[10] != 0,
        ),
        FunctionCode::PositionTrapezoid => (
            DriveCommand::Move {
                speed_rpm: f64::from(be_u16(&frame[7..9])) / WIRE_SCALE,
                target_deg: signed(dir, f64::from(be_u32(&frame[9..13])) / WIRE_SCALE),
                absolute: frame[13] != 0,
            },
            frame[14] != 0,
        ),
        FunctionCode::Speed => (
            DriveCommand::Spin {
                rpm: signed(dir, f64::from(be_u16(&frame[5..7])) / WIRE_SCALE),
            },
            frame[7] != 0,
        ),
        FunctionCode::Torque => (
            DriveCommand::Torque {
                current_ma: signed(dir, f64::from(be_u16(&frame[5..7]))),
            },
            frame[7] != 0,
        ),
        _ => return None,
    };
    Some(cmd)
}

fn default_params() -> [u8; HOMING_PARAMS_FULL_LEN] {
    let mut p = [0u8; HOMING_PARAMS_FULL_LEN];
    p[0] = HomingMode::default() as u8;
    p[2..4].copy_from_slice(&DEFAULT_HOMING_SPEED_RPM.to_be_bytes());
    p[4..8].copy_from_slice(&DEFAULT_HOMING_TIMEOUT_MS.to_be_bytes());
    p[8..10].copy_from_slice(&DEFAULT_COLLISION_SPEED_RPM.to_be_bytes());
    p[10..12].copy_from_slice(&DEFAULT_COLLISION_CURRENT_MA.to_be_bytes());
    p[12..14].copy_from_slice(&DEFAULT_COLLISION_TIME_MS.to_be_bytes());
    p
}

// ─── Drive ──────────────────────────────────────────────────────────

/// Simulated drive state.
#[derive(Debug, Clone)]
pub struct SimDrive {
    cfg: SimAxisConfig,
    enabled: bool,
    /// Motor shaft position at `updated_at` [deg].
    position_deg: f64,
    kinematics: Kinematics,
    torque_ma: f64,
    /// Commands waiting for the execute broadcast.
    pending: Vec<DriveCommand>,
    homing: HomingSim,
    /// Stored homing parameters in read layout.
    params: [u8; HOMING_PARAMS_FULL_LEN],
    updated_at: Instant,
    bus_voltage_mv: u16,
    temperature_c: i8,
}

impl SimDrive {
    /// Power-up state: disabled, idle at `cfg.initial_deg`.
    pub fn new(cfg: SimAxisConfig, bus_voltage_mv: u16, temperature_c: i8, now: Instant) -> Self {
        Self {
            position_deg: cfg.initial_deg,
            cfg,
            enabled: false,
            kinematics: Kinematics::Idle,
            torque_ma: 0.0,
            pending: Vec::new(),
            homing: HomingSim::Idle,
            params: default_params(),
            updated_at: now,
            bus_voltage_mv,
            temperature_c,
        }
    }

    /// Simulator settings of this drive.
    pub fn config(&self) -> &SimAxisConfig {
        &self.cfg
    }

    /// Bus address.
    #[inline]
    pub fn axis(&self) -> AxisId {
        self.cfg.axis_id
    }

    /// Drive output enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take the drive off or back on the bus.
    pub fn set_offline(&mut self, offline: bool) {
        self.cfg.offline = offline;
    }

    /// Drive does not answer.
    pub fn is_offline(&self) -> bool {
        self.cfg.offline
    }

    /// Number of commands waiting for the execute broadcast.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Motor position at `now` [deg].
    pub fn position_at(&mut self, now: Instant) -> f64 {
        self.advance(now);
        self.position_deg
    }

    /// Signed shaft speed [RPM].
    fn speed_rpm(&self) -> f64 {
        match self.kinematics {
            Kinematics::Idle => 0.0,
            Kinematics::Move {
                target_deg,
                speed_rpm,
            } => speed_rpm.copysign(target_deg - self.position_deg),
            Kinematics::Spin { rpm } => rpm,
        }
    }

    // ─── Kinematics ─────────────────────────────────────────────────

    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.updated_at = self.updated_at.max(now);
        if dt <= 0.0 {
            return;
        }
        match self.kinematics {
            Kinematics::Idle => {}
            Kinematics::Move {
                target_deg,
                speed_rpm,
            } => {
                let step = speed_rpm * DEG_PER_S_PER_RPM * dt;
                let remaining = target_deg - self.position_deg;
                if remaining.abs() <= step {
                    self.position_deg = target_deg;
                    self.kinematics = Kinematics::Idle;
                    trace!(axis = self.axis(), position_deg = target_deg, "move complete");
                } else {
                    self.position_deg += step.copysign(remaining);
                }
            }
            Kinematics::Spin { rpm } => {
                self.position_deg += rpm * DEG_PER_S_PER_RPM * dt;
            }
        }
    }

    fn apply(&mut self, cmd: DriveCommand, now: Instant) {
        self.advance(now);
        match cmd {
            DriveCommand::Move {
                target_deg,
                absolute,
                speed_rpm,
            } => {
                let target = if absolute {
                    target_deg
                } else {
                    self.position_deg + target_deg
                };
                self.torque_ma = 0.0;
                self.kinematics = if speed_rpm > 0.0 && target != self.position_deg {
                    Kinematics::Move {
                        target_deg: target,
                        speed_rpm,
                    }
                } else {
                    Kinematics::Idle
                };
            }
            DriveCommand::Spin { rpm } => {
                self.torque_ma = 0.0;
                self.kinematics = if rpm == 0.0 {
                    Kinematics::Idle
                } else {
                    Kinematics::Spin { rpm }
                };
            }
            DriveCommand::Torque { current_ma } => {
                self.kinematics = Kinematics::Idle;
                self.torque_ma = current_ma;
            }
            DriveCommand::Stop => {
                self.kinematics = Kinematics::Idle;
                self.torque_ma = 0.0;
            }
            DriveCommand::Enable(on) => {
                self.enabled = on;
                if !on {
                    self.kinematics = Kinematics::Idle;
                    self.torque_ma = 0.0;
                }
            }
        }
        debug!(axis = self.axis(), command = ?cmd, "applied");
    }

    /// Apply every staged command (execute broadcast).
    pub fn execute_pending(&mut self, now: Instant) {
        for cmd in std::mem::take(&mut self.pending) {
            self.apply(cmd, now);
        }
    }

    fn busy_homing(&self) -> bool {
        matches!(self.homing, HomingSim::Running { .. })
    }

    /// Run or stage one motion frame. Returns the status byte.
    pub(crate) fn handle_motion(&mut self, frame: &[u8], now: Instant) -> Option<u8> {
        let (cmd, staged) = parse_motion(frame)?;
        if !self.enabled || self.busy_homing() {
            return Some(status::CONDITION_NOT_MET);
        }
        if staged {
            self.pending.push(cmd);
        } else {
            self.apply(cmd, now);
        }
        Some(status::OK)
    }

    // ─── Homing ─────────────────────────────────────────────────────

    fn trigger_homing(&mut self, mode: u8, now: Instant) -> u8 {
        let Some(mode) = HomingMode::from_u8(mode) else {
            return status::COMMAND_ERROR;
        };
        if !self.enabled || self.busy_homing() || !self.cfg.homing_tier.supports(mode) {
            return status::CONDITION_NOT_MET;
        }
        self.advance(now);
        self.kinematics = Kinematics::Idle;
        self.homing = HomingSim::Running {
            polls_left: self.cfg.homing_polls,
        };
        debug!(axis = self.axis(), ?mode, "homing started");
        status::OK
    }

    fn homing_flags(&mut self) -> HomingStatusFlags {
        let mut flags = HomingStatusFlags::ENCODER_READY | HomingStatusFlags::CAL_TABLE_READY;
        match self.homing {
            HomingSim::Running { polls_left: 0 } => {
                if self.cfg.fail_homing {
                    self.homing = HomingSim::Failed;
                    flags |= HomingStatusFlags::HOMING_FAILED;
                    debug!(axis = self.axis(), "homing failed");
                } else {
                    self.homing = HomingSim::Done;
                    self.position_deg = 0.0;
                    debug!(axis = self.axis(), "homing done");
                }
            }
            HomingSim::Running { polls_left } => {
                self.homing = HomingSim::Running {
                    polls_left: polls_left - 1,
                };
                flags |= HomingStatusFlags::HOMING_IN_PROGRESS;
            }
            HomingSim::Failed => flags |= HomingStatusFlags::HOMING_FAILED,
            HomingSim::Idle | HomingSim::Done => {}
        }
        flags
    }

    fn write_params(&mut self, frame: &[u8]) -> u8 {
        if frame.len() != WRITE_PARAMS_FRAME_LEN || frame[2] != aux::WRITE_HOMING_PARAMS {
            return status::COMMAND_ERROR;
        }
        if self.busy_homing() {
            return status::CONDITION_NOT_MET;
        }
        self.params
            .copy_from_slice(&frame[4..4 + HOMING_PARAMS_FULL_LEN]);
        status::OK
    }

    fn read_params(&self) -> &[u8] {
        if self.cfg.truncated_params {
            &self.params[..HOMING_PARAMS_TRUNCATED_LEN]
        } else {
            &self.params
        }
    }

    // ─── Status ─────────────────────────────────────────────────────

    fn motor_flags(&self) -> MotorStatusFlags {
        let mut flags = MotorStatusFlags::empty();
        if self.enabled {
            flags |= MotorStatusFlags::ENABLED;
        }
        if self.kinematics == Kinematics::Idle && !self.busy_homing() {
            flags |= MotorStatusFlags::IN_POSITION;
        }
        flags
    }

    fn phase_current_ma(&self) -> u16 {
        if self.torque_ma != 0.0 {
            self.torque_ma.abs().round().min(f64::from(u16::MAX)) as u16
        } else if self.kinematics != Kinematics::Idle {
            MOVING_CURRENT_MA
        } else {
            0
        }
    }

    // ─── Frame Handling ─────────────────────────────────────────────

    /// Answer one direct frame addressed to this drive.
    pub fn handle(&mut self, frame: &[u8], now: Instant) -> Vec<u8> {
        let addr = self.axis();
        let Some(&func) = frame.get(1) else {
            return rejected(addr);
        };
        if frame.last() != Some(&FRAME_TRAILER) {
            return rejected(addr);
        }
        let Some(code) = FunctionCode::from_u8(func) else {
            return rejected(addr);
        };
        self.advance(now);
        trace!(axis = addr, func, "frame");

        let control = |s: u8| reply(addr, func, &[s]);
        match code {
            FunctionCode::PositionDirect
            | FunctionCode::PositionTrapezoid
            | FunctionCode::Speed
            | FunctionCode::Torque => match self.handle_motion(frame, now) {
                Some(s) => control(s),
                None => rejected(addr),
            },
            FunctionCode::Enable => {
                if frame.len() != 6 || frame[2] != aux::ENABLE {
                    return rejected(addr);
                }
                let cmd = DriveCommand::Enable(frame[3] != 0);
                if frame[4] != 0 {
                    self.pending.push(cmd);
                } else {
                    self.apply(cmd, now);
                }
                control(status::OK)
            }
            FunctionCode::ImmediateStop => {
                if frame.len() != 5 || frame[2] != aux::IMMEDIATE_STOP {
                    return rejected(addr);
                }
                if frame[3] != 0 {
                    self.pending.push(DriveCommand::Stop);
                } else {
                    self.pending.clear();
                    self.apply(DriveCommand::Stop, now);
                }
                control(status::OK)
            }
            FunctionCode::SetZero => {
                if frame.len() != 5 || frame[2] != aux::SET_ZERO {
                    return rejected(addr);
                }
                if self.kinematics != Kinematics::Idle || self.busy_homing() {
                    return control(status::CONDITION_NOT_MET);
                }
                self.position_deg = 0.0;
                control(status::OK)
            }
            FunctionCode::TriggerHoming => {
                if frame.len() != 5 {
                    return rejected(addr);
                }
                control(self.trigger_homing(frame[2], now))
            }
            FunctionCode::ForceStopHoming => {
                if frame.len() != 4 || frame[2] != aux::FORCE_STOP_HOMING {
                    return rejected(addr);
                }
                if self.busy_homing() {
                    self.homing = HomingSim::Idle;
                    debug!(axis = addr, "homing force-stopped");
                }
                control(status::OK)
            }
            FunctionCode::WriteHomingParams => control(self.write_params(frame)),
            FunctionCode::ReadHomingParams => reply(addr, func, self.read_params()),
            FunctionCode::ReadHomingStatus => reply(addr, func, &[self.homing_flags().bits()]),
            FunctionCode::ReadMotorStatus => reply(addr, func, &[self.motor_flags().bits()]),
            FunctionCode::ReadPosition => {
                let pos = self.position_deg;
                let tenths = (pos.abs() * WIRE_SCALE).round().min(f64::from(u32::MAX)) as u32;
                let mut data = [0u8; 5];
                data[0] = u8::from(pos < 0.0);
                data[1..].copy_from_slice(&tenths.to_be_bytes());
                reply(addr, func, &data)
            }
            FunctionCode::ReadSpeed => {
                let rpm = self.speed_rpm();
                let tenths = (rpm.abs() * WIRE_SCALE).round().min(f64::from(u16::MAX)) as u16;
                let [hi, lo] = tenths.to_be_bytes();
                reply(addr, func, &[u8::from(rpm < 0.0), hi, lo])
            }
            FunctionCode::ReadBusVoltage => reply(addr, func, &self.bus_voltage_mv.to_be_bytes()),
            FunctionCode::ReadPhaseCurrent => {
                reply(addr, func, &self.phase_current_ma().to_be_bytes())
            }
            FunctionCode::ReadTemperature => {
                let t = self.temperature_c;
                reply(addr, func, &[u8::from(t < 0), t.unsigned_abs()])
            }
            FunctionCode::SyncExecute | FunctionCode::Envelope => rejected(addr),
        }
    }
}
