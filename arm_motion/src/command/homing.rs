//! Homing supervision per axis.
//!
//! The drive runs the reference-finding procedure itself; the core
//! **supervises** it. Each axis owns a [`HomingSupervisor`] that tracks the
//! lifecycle and gates motion commands while homing is unresolved.
//!
//! ## Lifecycle
//!
//! ```text
//!            begin()              tick(): device done
//!   Idle ─────────────► Homing ─────────────────────► Homed
//!    ▲                    │  │
//!    │       abort()      │  │ timeout / transport / device failure
//!    │   ┌────────────────┘  └──────────────────────► Failed
//!    │   ▼                                               │
//!    │ Aborted                                           │
//!    └───────────────────── reset() ◄────────────────────┘
//! ```
//!
//! While `Homing`, `Failed` or `Aborted`, [`HomingSupervisor::check_motion`]
//! returns `AxisBusy`. `Homed` may be re-triggered without a reset.
//!
//! The supervisor is pure: the controller performs the bus I/O and feeds
//! results back through `tick()` / `fail()`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use arm_common::bus::BusError;
use arm_common::error::{MotionError, MotionResult};
use arm_common::homing::{HomingMode, HomingTier};
use arm_common::joint::AxisId;
use arm_common::status::HomingStatusFlags;
use parking_lot::Mutex;
use tracing::{info, warn};

// ─── Homing State ───────────────────────────────────────────────────

/// Homing lifecycle state of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HomingState {
    #[default]
    Idle,
    Homing,
    Homed,
    Failed,
    Aborted,
}

impl HomingState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Homing => "in progress",
            Self::Homed => "homed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    /// Motion commands are rejected in this state.
    #[inline]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Homing | Self::Failed | Self::Aborted)
    }
}

/// Reason for homing failure.
#[derive(Debug, Clone, PartialEq)]
pub enum HomingFailReason {
    /// Device did not finish within the configured timeout.
    Timeout,
    /// Device reported `HOMING_FAILED`.
    DeviceReported,
    /// Bus failed while homing.
    Transport(BusError),
    /// Device answered with an undecodable or rejected response.
    Protocol(String),
}

impl HomingFailReason {
    fn from_error(err: &MotionError) -> Self {
        match err {
            MotionError::Transport { source, .. } => Self::Transport(source.clone()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Result of a single homing tick.
#[derive(Debug, Clone, PartialEq)]
pub enum HomingTickResult {
    /// Still running.
    InProgress,
    /// Transitioned to `Homed`.
    Success,
    /// Transitioned to `Failed`.
    Failed { reason: HomingFailReason },
    /// Axis is not homing; nothing to supervise.
    NotActive,
}

// ─── Homing Supervisor ──────────────────────────────────────────────

/// Per-axis homing supervisor state machine.
#[derive(Debug, Clone)]
pub struct HomingSupervisor {
    axis: AxisId,
    state: HomingState,
    tier: HomingTier,
    mode: Option<HomingMode>,
    deadline: Option<Instant>,
    last_failure: Option<HomingFailReason>,
}

impl HomingSupervisor {
    pub fn new(axis: AxisId, tier: HomingTier) -> Self {
        Self {
            axis,
            state: HomingState::Idle,
            tier,
            mode: None,
            deadline: None,
            last_failure: None,
        }
    }

    #[inline]
    pub fn state(&self) -> HomingState {
        self.state
    }

    #[inline]
    pub fn tier(&self) -> HomingTier {
        self.tier
    }

    /// Mode of the current or last procedure.
    #[inline]
    pub fn mode(&self) -> Option<HomingMode> {
        self.mode
    }

    pub fn last_failure(&self) -> Option<&HomingFailReason> {
        self.last_failure.as_ref()
    }

    pub fn available_modes(&self) -> &'static [HomingMode] {
        self.tier.modes()
    }

    /// Reject motion while homing is unresolved.
    pub fn check_motion(&self) -> MotionResult<()> {
        if self.state.is_busy() {
            return Err(MotionError::AxisBusy {
                axis: self.axis,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Validate and enter `Homing`.
    ///
    /// Call before sending the trigger frame; on a send failure call
    /// [`fail`](Self::fail).
    pub fn begin(&mut self, mode: HomingMode, timeout: Duration, now: Instant) -> MotionResult<()> {
        if !self.tier.supports(mode) {
            return Err(MotionError::UnsupportedMode {
                axis: self.axis,
                detail: format!("homing mode {mode:?} requires the full tier"),
            });
        }
        self.check_motion()?;

        self.state = HomingState::Homing;
        self.mode = Some(mode);
        self.deadline = Some(now + timeout);
        self.last_failure = None;
        info!(axis = self.axis, ?mode, "homing started");
        Ok(())
    }

    /// Force `Failed` from `Homing`.
    pub fn fail(&mut self, reason: HomingFailReason) -> HomingTickResult {
        if self.state != HomingState::Homing {
            return HomingTickResult::NotActive;
        }
        warn!(axis = self.axis, ?reason, "homing failed");
        self.state = HomingState::Failed;
        self.deadline = None;
        self.last_failure = Some(reason.clone());
        HomingTickResult::Failed { reason }
    }

    /// Advance with the latest homing status read.
    pub fn tick(
        &mut self,
        now: Instant,
        status: MotionResult<HomingStatusFlags>,
    ) -> HomingTickResult {
        if self.state != HomingState::Homing {
            return HomingTickResult::NotActive;
        }

        let flags = match status {
            Ok(flags) => flags,
            Err(e) => return self.fail(HomingFailReason::from_error(&e)),
        };

        if flags.contains(HomingStatusFlags::HOMING_FAILED) {
            return self.fail(HomingFailReason::DeviceReported);
        }
        if flags.is_homed() {
            self.state = HomingState::Homed;
            self.deadline = None;
            info!(axis = self.axis, "homing complete");
            return HomingTickResult::Success;
        }
        if self.deadline.is_some_and(|d| now >= d) {
            return self.fail(HomingFailReason::Timeout);
        }
        HomingTickResult::InProgress
    }

    /// `Homing` → `Aborted`. Returns true if a procedure was interrupted.
    pub fn abort(&mut self) -> bool {
        if self.state != HomingState::Homing {
            return false;
        }
        info!(axis = self.axis, "homing aborted");
        self.state = HomingState::Aborted;
        self.deadline = None;
        true
    }

    /// Explicit return to `Idle`. Not allowed while `Homing`.
    pub fn reset(&mut self) -> MotionResult<()> {
        if self.state == HomingState::Homing {
            return Err(MotionError::AxisBusy {
                axis: self.axis,
                state: self.state.as_str(),
            });
        }
        self.state = HomingState::Idle;
        self.deadline = None;
        self.last_failure = None;
        Ok(())
    }
}

// ─── Homing Table ───────────────────────────────────────────────────

/// Supervisors for every connected axis.
///
/// Unknown axes are treated as idle with the basic tier.
#[derive(Debug, Default)]
pub struct HomingTable {
    axes: Mutex<BTreeMap<AxisId, HomingSupervisor>>,
}

impl HomingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-register an axis. Existing state is kept.
    pub fn register(&self, axis: AxisId, tier: HomingTier) {
        let mut axes = self.axes.lock();
        axes.entry(axis)
            .and_modify(|sv| sv.tier = tier)
            .or_insert_with(|| HomingSupervisor::new(axis, tier));
    }

    pub fn state(&self, axis: AxisId) -> HomingState {
        self.axes
            .lock()
            .get(&axis)
            .map_or(HomingState::Idle, |sv| sv.state())
    }

    pub fn last_failure(&self, axis: AxisId) -> Option<HomingFailReason> {
        self.axes
            .lock()
            .get(&axis)
            .and_then(|sv| sv.last_failure().cloned())
    }

    pub fn available_modes(&self, axis: AxisId) -> &'static [HomingMode] {
        self.axes
            .lock()
            .get(&axis)
            .map_or(HomingTier::Basic.modes(), |sv| sv.available_modes())
    }

    /// Modes every listed axis supports.
    pub fn common_modes(&self, axes: &[AxisId]) -> &'static [HomingMode] {
        let guard = self.axes.lock();
        let all_full = !axes.is_empty()
            && axes
                .iter()
                .all(|a| guard.get(a).is_some_and(|sv| sv.tier() == HomingTier::Full));
        if all_full {
            HomingTier::Full.modes()
        } else {
            HomingTier::Basic.modes()
        }
    }

    pub fn check_motion(&self, axis: AxisId) -> MotionResult<()> {
        match self.axes.lock().get(&axis) {
            Some(sv) => sv.check_motion(),
            None => Ok(()),
        }
    }

    /// Run `f` against the axis supervisor, creating a basic-tier one if absent.
    pub fn with<R>(&self, axis: AxisId, f: impl FnOnce(&mut HomingSupervisor) -> R) -> R {
        let mut axes = self.axes.lock();
        let sv = axes
            .entry(axis)
            .or_insert_with(|| HomingSupervisor::new(axis, HomingTier::Basic));
        f(sv)
    }

    /// Axes currently in `Homing`.
    pub fn active(&self) -> Vec<AxisId> {
        self.axes
            .lock()
            .values()
            .filter(|sv| sv.state() == HomingState::Homing)
            .map(|sv| sv.axis)
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
