//! Motion controller facade.
//!
//! Wires the joint registry, dispatcher, homing table, twin loop and status
//! poller behind the operations the outer layers call. All angles crossing
//! this API are logical joint degrees; speeds and accelerations are motor
//! RPM and RPM/s per physical axis.
//!
//! ## Motion gate
//!
//! | Operation                   | Busy axis (homing unresolved)            |
//! |-----------------------------|------------------------------------------|
//! | dispatch_synchronized_move  | rejected per axis, others still dispatch |
//! | start_interpolated_move     | whole move rejected with `AxisBusy`      |
//! | set_zero                    | rejected with `AxisBusy`                 |
//! | stop_all / abort_homing     | always allowed                           |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arm_common::bus::{AxisCapabilityProbe, RawBus, SimSink};
use arm_common::config::{MachineConfig, MotionSettings};
use arm_common::consts::{MIN_WIRE_ACCEL_RPM_S, MIN_WIRE_SPEED_RPM};
use arm_common::error::{MotionError, MotionResult};
use arm_common::homing::{HomingMode, HomingParameters};
use arm_common::joint::AxisId;
use arm_common::status::AxisStatus;
use tracing::{debug, info, warn};

use crate::command::dispatch::{ConnectReport, DispatchResult, Dispatcher};
use crate::command::encoder::{
    CommandEncoder, MotionCommand, MotionTarget, enable_frame, force_stop_homing_frame, read_frame,
    set_zero_frame, write_homing_params_frame,
};
use crate::command::homing::{HomingFailReason, HomingState, HomingTable, HomingTickResult};
use crate::command::protocol::{
    FunctionCode, decode_homing_flags, decode_homing_params, to_tenths_u16,
};
use crate::registry::{Conversion, JointRegistry};
use crate::status::StatusPoller;
use crate::trajectory::{JointProfile, TrajectoryPlan};
use crate::twin::{PlanHandle, TwinSync};

// ─── Request Types ──────────────────────────────────────────────────

/// One axis of a synchronized move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTarget {
    /// Logical joint angle [deg]; a delta when `absolute` is false.
    pub angle_deg: f64,
    /// Motor speed [RPM].
    pub speed_rpm: f64,
    /// Motor acceleration [RPM/s]; 0 selects a direct position move.
    pub accel_rpm_s: f64,
    /// Motor deceleration [RPM/s].
    pub decel_rpm_s: f64,
    pub absolute: bool,
}

impl JointTarget {
    pub fn absolute(angle_deg: f64, speed_rpm: f64) -> Self {
        Self {
            angle_deg,
            speed_rpm,
            accel_rpm_s: 0.0,
            decel_rpm_s: 0.0,
            absolute: true,
        }
    }

    pub fn with_ramp(mut self, accel_rpm_s: f64, decel_rpm_s: f64) -> Self {
        self.accel_rpm_s = accel_rpm_s;
        self.decel_rpm_s = decel_rpm_s;
        self
    }
}

/// Axes addressed by a homing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomingTarget {
    Axis(AxisId),
    All,
}

/// Outcome of a homing trigger.
#[derive(Debug, Clone)]
pub struct HomingHandle {
    pub mode: HomingMode,
    /// Axes now supervised in `Homing`.
    pub started: Vec<AxisId>,
    /// Axes that did not start, with the reason.
    pub failed: BTreeMap<AxisId, MotionError>,
    pub started_at: Instant,
}

impl HomingHandle {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─── Controller ─────────────────────────────────────────────────────

/// Multi-axis motion controller.
pub struct MotionController {
    settings: MotionSettings,
    registry: Arc<JointRegistry>,
    dispatcher: Arc<Dispatcher>,
    homing: HomingTable,
    twin: TwinSync,
    poller: StatusPoller,
    /// Joint order of twin pose vectors.
    twin_axes: Vec<AxisId>,
}

impl MotionController {
    /// Build from a validated machine config.
    pub fn new(
        config: &MachineConfig,
        bus: Box<dyn RawBus>,
        sink: Arc<dyn SimSink>,
    ) -> MotionResult<Self> {
        config.validate()?;
        let settings = config.motion.clone();
        let registry = Arc::new(JointRegistry::from_configs(&config.joints)?);
        let dispatcher = Arc::new(Dispatcher::new(
            bus,
            CommandEncoder::new(settings.limits),
        ));
        let poller = StatusPoller::new(Arc::clone(&dispatcher), Arc::clone(&registry));
        let twin = TwinSync::with_timing(sink, settings.twin_tick(), settings.cancel_timeout());
        let twin_axes = registry.axes();

        info!(
            joints = twin_axes.len(),
            tick_ms = settings.twin_tick_ms,
            "motion controller created"
        );

        Ok(Self {
            settings,
            registry,
            dispatcher,
            homing: HomingTable::new(),
            twin,
            poller,
            twin_axes,
        })
    }

    /// Probe the configured axes, fix the sync strategy, register homing tiers.
    pub fn connect(&self, probe: &dyn AxisCapabilityProbe) -> ConnectReport {
        let report = self.dispatcher.connect(&self.twin_axes, probe);
        for &axis in &self.twin_axes {
            let tier = report
                .capabilities
                .get(&axis)
                .map(|c| c.homing_tier)
                .unwrap_or_default();
            self.homing.register(axis, tier);
        }
        report
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JointRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn twin(&self) -> &TwinSync {
        &self.twin
    }

    /// Configured axes in twin joint order.
    pub fn axes(&self) -> &[AxisId] {
        &self.twin_axes
    }

    // ─── Conversion ─────────────────────────────────────────────────

    pub fn to_physical(&self, axis: AxisId, logical_deg: f64) -> Conversion {
        self.registry.to_physical(axis, logical_deg)
    }

    pub fn to_logical(&self, axis: AxisId, physical_deg: f64) -> Conversion {
        self.registry.to_logical(axis, physical_deg)
    }

    // ─── Motion ─────────────────────────────────────────────────────

    /// Send one synchronized batch.
    ///
    /// Local errors (limits, range) fail the whole call before any bus
    /// traffic. Busy axes are reported in `failed` and skipped; every
    /// other axis is dispatched.
    pub fn dispatch_synchronized_move(
        &self,
        targets: &BTreeMap<AxisId, JointTarget>,
    ) -> MotionResult<DispatchResult> {
        let mut rejected = BTreeMap::new();
        let mut commands = Vec::with_capacity(targets.len());

        for (&axis, target) in targets {
            if let Err(e) = self.homing.check_motion(axis) {
                debug!(axis, error = %e, "axis busy, skipped");
                rejected.insert(axis, e);
                continue;
            }
            if target.absolute {
                self.registry.check_limits(axis, target.angle_deg)?;
            }
            let physical = self.registry.to_physical(axis, target.angle_deg);
            if physical.used_default {
                warn!(axis, "no joint config, using ratio 1");
            }
            let motion = if target.accel_rpm_s > 0.0 {
                MotionTarget::Trapezoid {
                    angle_deg: physical.value,
                    speed_rpm: target.speed_rpm,
                    accel_rpm_s: target.accel_rpm_s,
                    decel_rpm_s: target.decel_rpm_s,
                    absolute: target.absolute,
                }
            } else {
                MotionTarget::Position {
                    angle_deg: physical.value,
                    speed_rpm: target.speed_rpm,
                    absolute: target.absolute,
                }
            };
            commands.push(MotionCommand::new(axis, motion));
        }

        let mut result = self.dispatcher.dispatch(&commands)?;
        for (axis, e) in rejected {
            result.reject(axis, e);
        }
        Ok(result)
    }

    /// Plan from the current twin pose to `targets`, drive the axes and
    /// stream the plan to the twin. Returns once the twin worker is running.
    ///
    /// Every moving axis gets a trapezoid command whose cruise speed and
    /// ramp match its re-timed profile, so the drives arrive together.
    pub fn start_interpolated_move(
        &self,
        targets: &BTreeMap<AxisId, f64>,
        vel_limit_rpm: &BTreeMap<AxisId, f64>,
        accel_limit_rpm_s: &BTreeMap<AxisId, f64>,
    ) -> MotionResult<PlanHandle> {
        self.start_plan(targets, vel_limit_rpm, accel_limit_rpm_s, true)
    }

    /// Like [`start_interpolated_move`](Self::start_interpolated_move) but
    /// only the twin moves.
    pub fn preview_interpolated_move(
        &self,
        targets: &BTreeMap<AxisId, f64>,
        vel_limit_rpm: &BTreeMap<AxisId, f64>,
        accel_limit_rpm_s: &BTreeMap<AxisId, f64>,
    ) -> MotionResult<PlanHandle> {
        self.start_plan(targets, vel_limit_rpm, accel_limit_rpm_s, false)
    }

    fn start_plan(
        &self,
        targets: &BTreeMap<AxisId, f64>,
        vel_limit_rpm: &BTreeMap<AxisId, f64>,
        accel_limit_rpm_s: &BTreeMap<AxisId, f64>,
        drive: bool,
    ) -> MotionResult<PlanHandle> {
        for (&axis, &deg) in targets {
            if !self.twin_axes.contains(&axis) {
                return Err(MotionError::Config(format!(
                    "axis {axis} is not a configured joint"
                )));
            }
            if drive {
                self.homing.check_motion(axis)?;
            }
            self.registry.check_limits(axis, deg)?;
        }

        // Plan and validate against a snapshot while the active move keeps
        // running; a rejected request leaves it untouched.
        let snapshot = self.twin_pose();
        let prepared =
            self.prepare_move(&snapshot, targets, vel_limit_rpm, accel_limit_rpm_s, drive)?;

        // The new plan starts where the previous one was interrupted.
        self.twin.cancel();
        let pose = self.twin_pose();
        let (plan, commands) = if pose == snapshot {
            prepared
        } else {
            match self.prepare_move(&pose, targets, vel_limit_rpm, accel_limit_rpm_s, drive) {
                Ok(replanned) => replanned,
                Err(e) => {
                    debug!(error = %e, "replan from interrupted pose failed, using snapshot plan");
                    prepared
                }
            }
        };

        info!(
            duration_s = plan.duration(),
            limiting_axis = plan.limiting_joint().map(|i| self.twin_axes[i]),
            drive,
            "interpolated move planned"
        );

        let dispatch = if drive {
            Some(self.dispatcher.dispatch(&commands)?)
        } else {
            None
        };

        let mut handle = self.twin.start(plan)?;
        handle.set_dispatch(dispatch);
        Ok(handle)
    }

    /// Last twin pose in joint order, zeros before the first write.
    fn twin_pose(&self) -> Vec<f64> {
        let n = self.twin_axes.len();
        self.twin
            .last_pose()
            .filter(|p| p.len() == n)
            .unwrap_or_else(|| vec![0.0; n])
    }

    /// Plan `start → targets` and build the range-checked drive commands.
    fn prepare_move(
        &self,
        start: &[f64],
        targets: &BTreeMap<AxisId, f64>,
        vel_limit_rpm: &BTreeMap<AxisId, f64>,
        accel_limit_rpm_s: &BTreeMap<AxisId, f64>,
        drive: bool,
    ) -> MotionResult<(TrajectoryPlan, Vec<MotionCommand>)> {
        let n = self.twin_axes.len();
        let mut end = start.to_vec();
        let mut vel = vec![0.0; n];
        let mut accel = vec![0.0; n];
        for (i, &axis) in self.twin_axes.iter().enumerate() {
            let Some(&target) = targets.get(&axis) else {
                continue;
            };
            end[i] = target;
            let (Some(&v), Some(&a)) = (vel_limit_rpm.get(&axis), accel_limit_rpm_s.get(&axis))
            else {
                if target != start[i] {
                    return Err(MotionError::PlanInfeasible(format!(
                        "axis {axis}: missing velocity or acceleration limit"
                    )));
                }
                continue;
            };
            vel[i] = self.registry.rpm_to_joint_deg_per_s(axis, v);
            accel[i] = self.registry.rpm_to_joint_deg_per_s(axis, a);
        }

        let plan = TrajectoryPlan::plan(start, &end, &vel, &accel)?;
        let commands = if drive {
            let commands = self.plan_commands(&plan);
            self.dispatcher.validate(&commands)?;
            commands
        } else {
            Vec::new()
        };
        Ok((plan, commands))
    }

    /// One absolute trapezoid per moving joint, matching its timed profile.
    fn plan_commands(&self, plan: &TrajectoryPlan) -> Vec<MotionCommand> {
        self.twin_axes
            .iter()
            .zip(plan.profiles())
            .filter(|(_, p)| p.cruise_velocity > 0.0)
            .map(|(&axis, p)| {
                let (speed_rpm, accel_rpm_s) = self.wire_ramp(axis, p);
                MotionCommand::new(
                    axis,
                    MotionTarget::Trapezoid {
                        angle_deg: self.registry.to_physical(axis, p.end).value,
                        speed_rpm,
                        accel_rpm_s,
                        decel_rpm_s: accel_rpm_s,
                        absolute: true,
                    },
                )
            })
            .collect()
    }

    /// Motor cruise speed and ramp for one timed profile.
    ///
    /// A joint stretched to a long shared duration can cruise below the
    /// smallest encodable speed, which the drive would read as zero. Its
    /// cruise is lifted to that floor and its ramp softened so it still
    /// covers `|Δ|` in `T`: `a = v² / (v·T − |Δ|)`.
    fn wire_ramp(&self, axis: AxisId, p: &JointProfile) -> (f64, f64) {
        let speed_rpm = self.registry.joint_deg_per_s_to_rpm(axis, p.cruise_velocity);
        let accel_rpm_s = self.registry.joint_deg_per_s_to_rpm(axis, p.accel);
        if to_tenths_u16(speed_rpm) > 0 {
            return (speed_rpm, accel_rpm_s.max(MIN_WIRE_ACCEL_RPM_S));
        }

        let v = self.registry.rpm_to_joint_deg_per_s(axis, MIN_WIRE_SPEED_RPM);
        let slack = v * p.duration - (p.end - p.start).abs();
        let accel_rpm_s = if slack > 0.0 {
            self.registry.joint_deg_per_s_to_rpm(axis, v * v / slack)
        } else {
            accel_rpm_s
        };
        debug!(
            axis,
            planned_rpm = speed_rpm,
            accel_rpm_s,
            "cruise raised to the minimum wire speed"
        );
        (MIN_WIRE_SPEED_RPM, accel_rpm_s.max(MIN_WIRE_ACCEL_RPM_S))
    }

    /// Stop the twin worker. Returns true if a plan was running.
    pub fn cancel_active_move(&self) -> bool {
        let cancelled = self.twin.cancel();
        if cancelled {
            info!("active move cancelled");
        }
        cancelled
    }

    /// Cancel the twin and send an immediate stop to every configured axis.
    pub fn stop_all(&self) -> DispatchResult {
        self.twin.cancel();
        let result = self.dispatcher.stop(&self.twin_axes);
        info!(
            stopped = result.succeeded.len(),
            failed = result.failed.len(),
            "stop all"
        );
        result
    }

    /// Enable or disable drive outputs.
    pub fn enable(&self, axes: &[AxisId], enable: bool) -> DispatchResult {
        let mut result = DispatchResult::new(self.dispatcher.strategy());
        for &axis in axes {
            match self.dispatcher.control(
                axis,
                FunctionCode::Enable,
                &enable_frame(axis, enable, false),
            ) {
                Ok(()) => result.succeeded.push(axis),
                Err(e) => {
                    warn!(axis, error = %e, "enable failed");
                    result.failed.insert(axis, e);
                }
            }
        }
        result
    }

    /// Declare the current motor position as zero.
    pub fn set_zero(&self, axis: AxisId, persist: bool) -> MotionResult<()> {
        self.homing.check_motion(axis)?;
        self.dispatcher
            .control(axis, FunctionCode::SetZero, &set_zero_frame(axis, persist))
    }

    // ─── Homing ─────────────────────────────────────────────────────

    fn homing_axes(&self, target: &HomingTarget) -> Vec<AxisId> {
        match target {
            HomingTarget::Axis(axis) => vec![*axis],
            HomingTarget::All => self.twin_axes.clone(),
        }
    }

    /// Modes the axis supports.
    pub fn available_homing_modes(&self, axis: AxisId) -> &'static [HomingMode] {
        self.homing.available_modes(axis)
    }

    pub fn homing_state(&self, axis: AxisId) -> HomingState {
        self.homing.state(axis)
    }

    pub fn homing_failure(&self, axis: AxisId) -> Option<HomingFailReason> {
        self.homing.last_failure(axis)
    }

    /// Start homing on one axis or all configured axes.
    ///
    /// A mode some target axis cannot run fails the whole call before any
    /// bus traffic. Busy axes and bus failures are reported per axis.
    pub fn trigger_homing(
        &self,
        target: HomingTarget,
        params: &HomingParameters,
    ) -> MotionResult<HomingHandle> {
        params.validate().map_err(MotionError::Config)?;
        let axes = self.homing_axes(&target);
        if !self.homing.common_modes(&axes).contains(&params.mode) {
            let axis = axes
                .iter()
                .copied()
                .find(|&a| !self.homing.available_modes(a).contains(&params.mode))
                .unwrap_or_default();
            return Err(MotionError::UnsupportedMode {
                axis,
                detail: format!("homing mode {:?} not available", params.mode),
            });
        }

        let timeout = Duration::from_millis(u64::from(params.timeout.upper_bound_ms()));
        let mut handle = HomingHandle {
            mode: params.mode,
            started: Vec::new(),
            failed: BTreeMap::new(),
            started_at: Instant::now(),
        };

        for axis in axes {
            match self.start_homing_axis(axis, params, timeout) {
                Ok(()) => handle.started.push(axis),
                Err(e) => {
                    warn!(axis, error = %e, "homing not started");
                    handle.failed.insert(axis, e);
                }
            }
        }
        Ok(handle)
    }

    fn start_homing_axis(
        &self,
        axis: AxisId,
        params: &HomingParameters,
        timeout: Duration,
    ) -> MotionResult<()> {
        self.homing.check_motion(axis)?;

        if params.is_complete() {
            self.dispatcher.control(
                axis,
                FunctionCode::WriteHomingParams,
                &write_homing_params_frame(axis, params)?,
            )?;
        } else {
            debug!(axis, "partial homing parameters, device settings kept");
        }

        let now = Instant::now();
        self.homing
            .with(axis, |sv| sv.begin(params.mode, timeout, now))?;

        let trigger = self.dispatcher.encoder().encode(&MotionCommand::new(
            axis,
            MotionTarget::Homing { mode: params.mode },
        ));
        let sent = trigger.and_then(|frame| {
            self.dispatcher
                .control(axis, FunctionCode::TriggerHoming, &frame)
        });
        if let Err(e) = sent {
            let reason = match &e {
                MotionError::Transport { source, .. } => HomingFailReason::Transport(source.clone()),
                other => HomingFailReason::Protocol(other.to_string()),
            };
            self.homing.with(axis, |sv| sv.fail(reason));
            return Err(e);
        }
        Ok(())
    }

    /// One supervision pass over every homing axis.
    pub fn update_homing(&self, now: Instant) -> BTreeMap<AxisId, HomingTickResult> {
        self.homing
            .active()
            .into_iter()
            .map(|axis| {
                let func = FunctionCode::ReadHomingStatus;
                let status = self
                    .dispatcher
                    .read(axis, func, &read_frame(axis, func))
                    .and_then(|data| decode_homing_flags(axis, &data));
                let result = self.homing.with(axis, |sv| sv.tick(now, status));
                (axis, result)
            })
            .collect()
    }

    /// Supervise until every axis of `handle` leaves `Homing` or `timeout`
    /// expires. Blocks the calling thread.
    pub fn wait_homing(
        &self,
        handle: &HomingHandle,
        timeout: Duration,
    ) -> BTreeMap<AxisId, HomingState> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            self.update_homing(now);
            let pending = handle
                .started
                .iter()
                .any(|&a| self.homing.state(a) == HomingState::Homing);
            if !pending || now >= deadline {
                break;
            }
            std::thread::sleep(self.settings.homing_poll());
        }
        handle
            .started
            .iter()
            .map(|&a| (a, self.homing.state(a)))
            .collect()
    }

    /// Force-stop homing. Supervisors move to `Aborted` even if the stop
    /// frame fails; the failure is reported per axis.
    pub fn abort_homing(&self, target: HomingTarget) -> DispatchResult {
        let mut result = DispatchResult::new(self.dispatcher.strategy());
        for axis in self.homing_axes(&target) {
            if self.homing.state(axis) != HomingState::Homing {
                continue;
            }
            let sent = self.dispatcher.control(
                axis,
                FunctionCode::ForceStopHoming,
                &force_stop_homing_frame(axis),
            );
            self.homing.with(axis, |sv| sv.abort());
            match sent {
                Ok(()) => result.succeeded.push(axis),
                Err(e) => {
                    warn!(axis, error = %e, "force-stop homing failed");
                    result.failed.insert(axis, e);
                }
            }
        }
        result
    }

    /// Return a `Failed` / `Aborted` / `Homed` axis to `Idle`.
    pub fn reset_homing(&self, axis: AxisId) -> MotionResult<()> {
        self.homing.with(axis, |sv| sv.reset())?;
        info!(axis, "homing reset");
        Ok(())
    }

    pub fn read_homing_parameters(&self, axis: AxisId) -> MotionResult<HomingParameters> {
        let func = FunctionCode::ReadHomingParams;
        let data = self.dispatcher.read(axis, func, &read_frame(axis, func))?;
        decode_homing_params(axis, &data)
    }

    /// Write a complete parameter set. Not allowed while the axis is homing.
    pub fn write_homing_parameters(
        &self,
        axis: AxisId,
        params: &HomingParameters,
    ) -> MotionResult<()> {
        let state = self.homing.state(axis);
        if state == HomingState::Homing {
            return Err(MotionError::AxisBusy {
                axis,
                state: state.as_str(),
            });
        }
        let frame = write_homing_params_frame(axis, params)?;
        self.dispatcher
            .control(axis, FunctionCode::WriteHomingParams, &frame)
    }

    // ─── Status ─────────────────────────────────────────────────────

    pub fn poll_status(&self, axes: &[AxisId]) -> BTreeMap<AxisId, MotionResult<AxisStatus>> {
        self.poller.poll(axes)
    }

    /// Cancel any plan and seed the twin with measured joint positions.
    /// Axes that fail to read keep their previous twin value.
    pub fn sync_twin_from_status(&self) -> Vec<f64> {
        self.twin.cancel();
        let n = self.twin_axes.len();
        let mut pose = self
            .twin
            .last_pose()
            .filter(|p| p.len() == n)
            .unwrap_or_else(|| vec![0.0; n]);
        let statuses = self.poller.poll(&self.twin_axes);
        for (i, axis) in self.twin_axes.iter().enumerate() {
            if let Some(Ok(status)) = statuses.get(axis) {
                pose[i] = status.position_deg;
            }
        }
        self.twin.fence().write_direct(&pose);
        pose
    }
}

impl Drop for MotionController {
    fn drop(&mut self) {
        self.twin.shutdown();
    }
}
