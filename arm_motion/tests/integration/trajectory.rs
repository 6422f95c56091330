//! Integration test: interpolator bounds and synchronized arrival.

use arm_common::joint::{JointConfig, JointDirection};
use arm_motion::registry::JointRegistry;
use arm_motion::trajectory::{TrajectoryPlan, WaypointPlan};

const VEL_RPM: f64 = 500.0;
const ACCEL_RPM_S: f64 = 1000.0;

fn check_bounds(ratio: f64, delta: f64, dt: f64) {
    let reg = JointRegistry::from_configs(&[JointConfig::new(1, ratio, JointDirection::Normal)])
        .unwrap();
    let v_cap = reg.rpm_to_joint_deg_per_s(1, VEL_RPM);
    let a_cap = reg.rpm_to_joint_deg_per_s(1, ACCEL_RPM_S);
    let plan = TrajectoryPlan::plan(&[0.0], &[delta], &[v_cap], &[a_cap]).unwrap();

    let ticks = plan.tick_count(dt);
    let mut prev_v = 0.0;
    for k in 0..=ticks {
        let s = plan.sample(k as f64 * dt);
        let v = s.velocities[0];
        assert!(
            reg.joint_deg_per_s_to_rpm(1, v.abs()) <= VEL_RPM + 1e-6,
            "speed {v} over cap at tick {k}"
        );
        assert!(
            (v - prev_v).abs() <= a_cap * dt + 1e-6,
            "velocity step {} over a·dt at tick {k}",
            (v - prev_v).abs()
        );
        prev_v = v;
    }
    assert_eq!(plan.sample(plan.duration()).positions[0], delta);
}

#[test]
fn profile_bound_ten_degrees_direct_drive() {
    check_bounds(1.0, 10.0, 0.04);
    check_bounds(1.0, 10.0, 0.001);
}

#[test]
fn profile_bound_ten_degrees_geared() {
    check_bounds(62.0, 10.0, 0.04);
    check_bounds(62.0, -10.0, 0.001);
}

#[test]
fn every_joint_shares_the_duration() {
    let plan = TrajectoryPlan::plan(
        &[0.0, 0.0, 0.0, 5.0],
        &[30.0, -15.0, 90.0, 5.0],
        &[48.0, 58.0, 250.0, 10.0],
        &[96.0, 117.0, 500.0, 10.0],
    )
    .unwrap();
    for p in plan.profiles() {
        assert_eq!(p.duration, plan.duration());
    }
    let end = plan.sample(plan.duration());
    assert_eq!(end.positions, vec![30.0, -15.0, 90.0, 5.0]);
    assert!(end.velocities.iter().all(|v| *v == 0.0));
}

#[test]
fn start_and_end_samples_are_exact() {
    let start = [12.5, -7.25, 0.0];
    let end = [-40.0, 33.0, 0.001];
    let plan = TrajectoryPlan::plan(&start, &end, &[20.0; 3], &[40.0; 3]).unwrap();
    assert_eq!(plan.sample(0.0).positions, start.to_vec());
    assert_eq!(plan.sample(plan.duration()).positions, end.to_vec());
}

#[test]
fn zero_delta_joint_never_moves() {
    let plan = TrajectoryPlan::plan(&[0.0, 42.0], &[100.0, 42.0], &[50.0; 2], &[25.0; 2]).unwrap();
    let ticks = plan.tick_count(0.01);
    for k in 0..=ticks {
        let s = plan.sample(k as f64 * 0.01);
        assert_eq!(s.positions[1], 42.0);
        assert_eq!(s.velocities[1], 0.0);
        assert_eq!(s.accelerations[1], 0.0);
    }
}

#[test]
fn waypoint_path_arrives_together_at_every_pose() {
    let path = [
        [0.0, 0.0, 0.0],
        [45.0, -10.0, 5.0],
        [45.0, 30.0, -5.0],
        [0.0, 0.0, 0.0],
    ];
    let plan = WaypointPlan::plan(&path, &[48.0, 58.0, 250.0], &[96.0, 117.0, 500.0]).unwrap();

    let mut t = 0.0;
    for (i, segment) in plan.segments().iter().enumerate() {
        for p in segment.profiles() {
            assert_eq!(p.duration, segment.duration());
        }
        t += segment.duration();
        assert_eq!(plan.sample(t).positions, path[i + 1].to_vec());
    }
    assert!((plan.duration() - t).abs() < 1e-9);

    let mut buf = [0.0; 3];
    plan.sample_positions_into(plan.duration() * 0.4, &mut buf);
    assert_eq!(buf.to_vec(), plan.sample(plan.duration() * 0.4).positions);
}
