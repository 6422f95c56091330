//! JSON status reports printed by the HAL binary.
//!
//! One [`StatusReport`] per poll, one [`MoveSummary`] per move. Both
//! serialize to a single JSON line.

use std::collections::BTreeMap;

use arm_common::joint::AxisId;
use arm_common::status::AxisStatus;
use arm_motion::MotionController;
use arm_motion::twin::PlanHandle;
use serde::Serialize;

/// State of one axis at poll time.
#[derive(Debug, Clone, Serialize)]
pub struct AxisReport {
    /// Homing supervisor state.
    pub homing: &'static str,
    /// Status snapshot, absent when the read failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AxisStatus>,
    /// Read failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of the controller and every configured axis.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Seconds since the run started.
    pub elapsed_s: f64,
    /// Last twin pose [deg], joint order.
    pub twin_pose_deg: Option<Vec<f64>>,
    /// Id of the plan the twin is executing.
    pub active_plan: Option<u64>,
    /// Per-axis state.
    pub axes: BTreeMap<AxisId, AxisReport>,
}

impl StatusReport {
    /// Poll every configured axis and capture the twin state.
    pub fn collect(controller: &MotionController, elapsed_s: f64) -> Self {
        let axes = controller
            .poll_status(controller.axes())
            .into_iter()
            .map(|(axis, result)| {
                let (status, error) = match result {
                    Ok(s) => (Some(s), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                let report = AxisReport {
                    homing: controller.homing_state(axis).as_str(),
                    status,
                    error,
                };
                (axis, report)
            })
            .collect();
        Self {
            elapsed_s,
            twin_pose_deg: controller.twin().last_pose(),
            active_plan: controller.twin().active_plan(),
            axes,
        }
    }

    /// Axes whose status read failed.
    pub fn failed_axes(&self) -> Vec<AxisId> {
        self.axes
            .iter()
            .filter(|(_, r)| r.error.is_some())
            .map(|(&a, _)| a)
            .collect()
    }

    /// Compact single-line JSON.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outcome of one interpolated move.
#[derive(Debug, Clone, Serialize)]
pub struct MoveSummary {
    /// Plan id.
    pub plan: u64,
    /// Planned duration [s].
    pub duration_s: f64,
    /// Twin exit, `None` while still running.
    pub exit: Option<String>,
    /// Axes that accepted their command.
    pub dispatched: Vec<AxisId>,
    /// Axes that did not, with the reason.
    pub failed: BTreeMap<AxisId, String>,
}

impl MoveSummary {
    /// Summarize a plan handle.
    pub fn from_handle(handle: &PlanHandle) -> Self {
        let (dispatched, failed) = match handle.dispatch() {
            Some(d) => (
                d.succeeded.clone(),
                d.failed
                    .iter()
                    .map(|(&a, e)| (a, e.to_string()))
                    .collect(),
            ),
            None => (Vec::new(), BTreeMap::new()),
        };
        Self {
            plan: handle.id(),
            duration_s: handle.plan().duration(),
            exit: handle.exit().map(|e| format!("{e:?}").to_lowercase()),
            dispatched,
            failed,
        }
    }

    /// Compact single-line JSON.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
