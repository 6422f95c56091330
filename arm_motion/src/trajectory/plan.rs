//! Multi-joint trajectory plan with synchronized arrival.
//!
//! Every joint gets its minimal-time profile under its own caps; the plan
//! duration is the slowest of those, and every joint is then re-timed to
//! that common duration. All joints therefore leave together and arrive
//! together, and none exceeds its velocity or acceleration cap.

use arm_common::error::{MotionError, MotionResult};

use super::profile::{JointProfile, JointSample, min_time};

/// Sampled joint-space state at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSample {
    /// Clamped sample time [s].
    pub t: f64,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

/// Immutable multi-joint plan.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPlan {
    start: Vec<f64>,
    end: Vec<f64>,
    duration: f64,
    limiting_joint: Option<usize>,
    profiles: Vec<JointProfile>,
}

fn infeasible(msg: impl Into<String>) -> MotionError {
    MotionError::PlanInfeasible(msg.into())
}

impl TrajectoryPlan {
    /// Plan `start → end` under per-joint caps.
    ///
    /// # Errors
    /// `PlanInfeasible` for empty or mismatched vectors, non-finite input,
    /// or a non-positive cap on a joint that has to move.
    pub fn plan(
        start: &[f64],
        end: &[f64],
        vel_limits: &[f64],
        accel_limits: &[f64],
    ) -> MotionResult<Self> {
        let n = start.len();
        if n == 0 {
            return Err(infeasible("no joints"));
        }
        if end.len() != n || vel_limits.len() != n || accel_limits.len() != n {
            return Err(infeasible(format!(
                "length mismatch: start {n}, end {}, vel {}, accel {}",
                end.len(),
                vel_limits.len(),
                accel_limits.len()
            )));
        }

        let mut duration = 0.0_f64;
        let mut limiting_joint = None;
        for i in 0..n {
            let (s, e, v, a) = (start[i], end[i], vel_limits[i], accel_limits[i]);
            if !(s.is_finite() && e.is_finite()) {
                return Err(infeasible(format!("joint {i}: non-finite endpoint")));
            }
            let distance = (e - s).abs();
            if distance == 0.0 {
                continue;
            }
            if !(v.is_finite() && v > 0.0 && a.is_finite() && a > 0.0) {
                return Err(infeasible(format!(
                    "joint {i}: limits must be finite and > 0 (vel {v}, accel {a})"
                )));
            }
            let t = min_time(distance, v, a);
            if t > duration {
                duration = t;
                limiting_joint = Some(i);
            }
        }

        let profiles = (0..n)
            .map(|i| JointProfile::timed(start[i], end[i], vel_limits[i], accel_limits[i], duration))
            .collect();

        Ok(Self {
            start: start.to_vec(),
            end: end.to_vec(),
            duration,
            limiting_joint,
            profiles,
        })
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn start(&self) -> &[f64] {
        &self.start
    }

    pub fn end(&self) -> &[f64] {
        &self.end
    }

    /// Index of the joint that sets the duration. `None` if nothing moves.
    #[inline]
    pub fn limiting_joint(&self) -> Option<usize> {
        self.limiting_joint
    }

    pub fn profiles(&self) -> &[JointProfile] {
        &self.profiles
    }

    #[inline]
    fn clamp_time(&self, t: f64) -> f64 {
        if t.is_nan() { 0.0 } else { t.clamp(0.0, self.duration) }
    }

    /// Sample every joint at `t`, clamped to `[0, duration]`.
    pub fn sample(&self, t: f64) -> PlanSample {
        let t = self.clamp_time(t);
        let n = self.profiles.len();
        let mut out = PlanSample {
            t,
            positions: Vec::with_capacity(n),
            velocities: Vec::with_capacity(n),
            accelerations: Vec::with_capacity(n),
        };
        for p in &self.profiles {
            let JointSample {
                position,
                velocity,
                acceleration,
            } = p.sample(t);
            out.positions.push(position);
            out.velocities.push(velocity);
            out.accelerations.push(acceleration);
        }
        out
    }

    /// Positions only, written into `out` without allocating.
    pub fn sample_positions_into(&self, t: f64, out: &mut [f64]) {
        let t = self.clamp_time(t);
        for (slot, p) in out.iter_mut().zip(&self.profiles) {
            *slot = p.sample(t).position;
        }
    }

    /// Number of ticks of length `dt` needed to reach the end (≥ 1).
    pub fn tick_count(&self, dt: f64) -> u64 {
        if dt <= 0.0 || self.duration <= 0.0 {
            return 1;
        }
        (self.duration / dt).ceil().max(1.0) as u64
    }
}
