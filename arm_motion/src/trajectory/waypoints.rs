//! Paths through several joint-space poses.
//!
//! Consecutive waypoints are joined by rest-to-rest segments, each one a
//! [`TrajectoryPlan`]. Within a segment all joints share its duration, so
//! the arm leaves and reaches every waypoint with all joints together.
//!
//! ```text
//!  wp0 ──seg 0──► wp1 ──seg 1──► wp2 ...
//!  t:  0        T0          T0+T1
//! ```

use arm_common::error::{MotionError, MotionResult};

use super::plan::{PlanSample, TrajectoryPlan};

/// Sequence of synchronized segments.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointPlan {
    segments: Vec<TrajectoryPlan>,
    /// Start time of each segment [s].
    offsets: Vec<f64>,
    duration: f64,
}

impl WaypointPlan {
    /// Plan through `waypoints` under per-joint caps.
    ///
    /// # Errors
    /// `PlanInfeasible` for fewer than two waypoints, or when any segment
    /// fails [`TrajectoryPlan::plan`].
    pub fn plan<W: AsRef<[f64]>>(
        waypoints: &[W],
        vel_limits: &[f64],
        accel_limits: &[f64],
    ) -> MotionResult<Self> {
        if waypoints.len() < 2 {
            return Err(MotionError::PlanInfeasible(format!(
                "need at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }

        let mut segments = Vec::with_capacity(waypoints.len() - 1);
        let mut offsets = Vec::with_capacity(waypoints.len() - 1);
        let mut duration = 0.0;
        for (i, pair) in waypoints.windows(2).enumerate() {
            let segment = TrajectoryPlan::plan(
                pair[0].as_ref(),
                pair[1].as_ref(),
                vel_limits,
                accel_limits,
            )
            .map_err(|e| match e {
                MotionError::PlanInfeasible(msg) => {
                    MotionError::PlanInfeasible(format!("segment {i}: {msg}"))
                }
                other => other,
            })?;
            offsets.push(duration);
            duration += segment.duration();
            segments.push(segment);
        }

        Ok(Self {
            segments,
            offsets,
            duration,
        })
    }

    /// Total duration [s].
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn segments(&self) -> &[TrajectoryPlan] {
        &self.segments
    }

    /// Segment index and local time for `t`, clamped to `[0, duration]`.
    pub fn segment_at(&self, t: f64) -> (usize, f64) {
        let t = if t.is_nan() {
            0.0
        } else {
            t.clamp(0.0, self.duration)
        };
        let i = self
            .offsets
            .partition_point(|&o| o <= t)
            .saturating_sub(1);
        (i, t - self.offsets[i])
    }

    /// Sample every joint at `t` on the whole path.
    pub fn sample(&self, t: f64) -> PlanSample {
        let (i, local) = self.segment_at(t);
        let mut out = self.segments[i].sample(local);
        out.t = self.offsets[i] + out.t;
        out
    }

    pub fn sample_positions_into(&self, t: f64, out: &mut [f64]) {
        let (i, local) = self.segment_at(t);
        self.segments[i].sample_positions_into(local, out);
    }
}
