//! Joint-space trajectory interpolation.
//!
//! - [`profile`] - single-joint trapezoidal / triangular velocity profile
//! - [`plan`] - multi-joint plan sharing one duration, sampled over time
//! - [`waypoints`] - rest-to-rest segments through a sequence of poses

pub mod plan;
pub mod profile;
pub mod waypoints;

pub use plan::{PlanSample, TrajectoryPlan};
pub use profile::{JointProfile, JointSample, ProfileShape};
pub use waypoints::WaypointPlan;
