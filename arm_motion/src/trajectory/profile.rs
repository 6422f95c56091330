//! Single-joint velocity profile.
//!
//! Symmetric trapezoid with acceleration `a`, cruise speed `v` and total
//! time `T`:
//!
//! ```text
//!  v ┤    ┌──────────┐
//!    │   /            \
//!    │  /              \
//!  0 ┼─┴────────────────┴──► t
//!    0  ta          T-ta  T
//! ```
//!
//! When `v_max² / a > |Δ|` the cruise segment vanishes and the profile
//! is triangular. A profile stretched to a longer `T` keeps its
//! acceleration and lowers its cruise speed, found from
//! `|Δ| = v·T − v²/a`.

/// Shape of the minimal-time profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    /// No motion.
    Stationary,
    /// Accelerate, decelerate, never reaching the speed cap.
    Triangular,
    /// Accelerate, cruise at the speed cap, decelerate.
    Trapezoidal,
}

/// Classify the minimal-time profile for a move of `distance`.
pub fn shape(distance: f64, v_max: f64, a_max: f64) -> ProfileShape {
    if distance == 0.0 {
        ProfileShape::Stationary
    } else if v_max * v_max / a_max > distance {
        ProfileShape::Triangular
    } else {
        ProfileShape::Trapezoidal
    }
}

/// Minimal time to travel `distance` (≥ 0) under the given caps [s].
pub fn min_time(distance: f64, v_max: f64, a_max: f64) -> f64 {
    match shape(distance, v_max, a_max) {
        ProfileShape::Stationary => 0.0,
        ProfileShape::Triangular => 2.0 * (distance / a_max).sqrt(),
        ProfileShape::Trapezoidal => distance / v_max + v_max / a_max,
    }
}

/// Position, velocity and acceleration of one joint at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointSample {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

/// A joint profile timed to a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointProfile {
    pub start: f64,
    pub end: f64,
    /// Minimal-time shape under the caps.
    pub shape: ProfileShape,
    /// Minimal time under the caps [s].
    pub min_time: f64,
    /// Timed duration [s].
    pub duration: f64,
    /// Acceleration magnitude used [unit/s²].
    pub accel: f64,
    /// Peak speed reached [unit/s].
    pub cruise_velocity: f64,
    /// Length of the acceleration (and deceleration) phase [s].
    pub accel_time: f64,
    sign: f64,
}

impl JointProfile {
    /// Profile for `start → end` stretched to `duration`.
    ///
    /// `duration` must be at least the minimal time under the caps.
    pub fn timed(start: f64, end: f64, v_max: f64, a_max: f64, duration: f64) -> Self {
        let delta = end - start;
        let distance = delta.abs();
        let shape = shape(distance, v_max, a_max);
        let min_time = min_time(distance, v_max, a_max);

        if shape == ProfileShape::Stationary || duration <= 0.0 {
            return Self {
                start,
                end,
                shape: ProfileShape::Stationary,
                min_time,
                duration,
                accel: 0.0,
                cruise_velocity: 0.0,
                accel_time: 0.0,
                sign: 0.0,
            };
        }

        // v² − aT·v + aΔ = 0, smaller root.
        let a = a_max;
        let disc = (a * a * duration * duration - 4.0 * a * distance).max(0.0);
        let cruise = ((a * duration - disc.sqrt()) / 2.0).min(v_max);
        let accel_time = (cruise / a).min(duration / 2.0);

        Self {
            start,
            end,
            shape,
            min_time,
            duration,
            accel: a,
            cruise_velocity: cruise,
            accel_time,
            sign: delta.signum(),
        }
    }

    /// Minimal-time profile (no stretching).
    pub fn fastest(start: f64, end: f64, v_max: f64, a_max: f64) -> Self {
        let t = min_time((end - start).abs(), v_max, a_max);
        Self::timed(start, end, v_max, a_max, t)
    }

    /// Sample at `t`, clamped to `[0, duration]`.
    pub fn sample(&self, t: f64) -> JointSample {
        if self.shape == ProfileShape::Stationary || t >= self.duration {
            return JointSample {
                position: self.end,
                ..JointSample::default()
            };
        }
        if t <= 0.0 {
            return JointSample {
                position: self.start,
                ..JointSample::default()
            };
        }

        let a = self.accel;
        let ta = self.accel_time;
        let s = self.sign;

        if t < ta {
            JointSample {
                position: self.start + s * 0.5 * a * t * t,
                velocity: s * a * t,
                acceleration: s * a,
            }
        } else if t <= self.duration - ta {
            JointSample {
                position: self.start + s * (0.5 * a * ta * ta + self.cruise_velocity * (t - ta)),
                velocity: s * self.cruise_velocity,
                acceleration: 0.0,
            }
        } else {
            let remaining = self.duration - t;
            JointSample {
                position: self.end - s * 0.5 * a * remaining * remaining,
                velocity: s * a * remaining,
                acceleration: -s * a,
            }
        }
    }
}
