//! Integration test: six-axis interpolated move, bus and twin together.

use std::collections::BTreeMap;
use std::time::Duration;

use arm_motion::twin::TwinExit;

use super::mock::{MockProbe, controller, uniform};

const RATIOS: [(u8, f64); 6] = [(1, 62.0), (2, 51.0), (3, 51.0), (4, 62.0), (5, 12.0), (6, 8.0)];
const TARGET: [f64; 6] = [30.0, -15.0, 0.0, 0.0, 90.0, 0.0];
const VEL_RPM: f64 = 500.0;
const ACCEL_RPM_S: f64 = 1000.0;

fn targets() -> BTreeMap<u8, f64> {
    RATIOS.iter().map(|&(a, _)| a).zip(TARGET).collect()
}

#[test]
fn six_axis_move_arrives_together() {
    let (ctl, bus, sink) = controller(&RATIOS, 40);
    ctl.connect(&MockProbe::basic());
    let axes: Vec<u8> = RATIOS.iter().map(|&(a, _)| a).collect();

    let handle = ctl
        .start_interpolated_move(
            &targets(),
            &uniform(&axes, VEL_RPM),
            &uniform(&axes, ACCEL_RPM_S),
        )
        .unwrap();

    // Axis 1 needs 30° at 3000/62 deg/s: the longest move.
    let plan = handle.plan();
    assert_eq!(plan.limiting_joint(), Some(0));
    let expected = 30.0 / (3000.0 / 62.0) + (3000.0 / 62.0) / (6000.0 / 62.0);
    assert!((plan.duration() - expected).abs() < 1e-9);

    // Moving axes are staged with trapezoids, then released together.
    let dispatch = handle.dispatch().unwrap();
    assert_eq!(dispatch.succeeded, vec![1, 2, 5]);
    assert!(dispatch.execute_issued);
    let staged = bus.frames_with(0xFD);
    assert_eq!(staged.len(), 3);
    let axis1 = &staged[0];
    assert_eq!(axis1[0], 1);
    assert_eq!(u16::from_be_bytes([axis1[3], axis1[4]]), 1000);
    assert_eq!(u16::from_be_bytes([axis1[7], axis1[8]]), 5000);
    assert_eq!(
        u32::from_be_bytes([axis1[9], axis1[10], axis1[11], axis1[12]]),
        18_600
    );
    // Axis 2 runs slower than its cap so it lands with axis 1.
    let axis2 = &staged[1];
    assert_eq!(axis2[2], 1);
    assert!(u16::from_be_bytes([axis2[7], axis2[8]]) < 5000);
    assert_eq!(bus.frames().last().unwrap(), &vec![0x00, 0xFF, 0x66, 0x6B]);

    assert_eq!(handle.wait(Duration::from_secs(5)), Some(TwinExit::Completed));

    // Every moving joint reaches its target on the final write.
    let poses = sink.poses();
    let last = poses.len() - 1;
    assert_eq!(poses[last], TARGET.to_vec());
    let arrival = |i: usize| poses.iter().position(|p| p[i] == TARGET[i]).unwrap();
    let first = arrival(0);
    assert_eq!(first, last);
    for i in [1, 4] {
        assert_eq!(arrival(i), first, "joint {i} arrived on a different tick");
    }
    for i in [2, 3, 5] {
        assert!(poses.iter().all(|p| p[i] == 0.0));
    }
}

#[test]
fn move_without_limits_for_a_moving_axis_is_rejected() {
    let (ctl, bus, _) = controller(&RATIOS, 40);
    let mut vel = uniform(&[1, 2], VEL_RPM);
    vel.remove(&2);
    let err = ctl
        .start_interpolated_move(&targets(), &vel, &uniform(&[1, 2], ACCEL_RPM_S))
        .unwrap_err();
    assert!(matches!(err, arm_common::error::MotionError::PlanInfeasible(_)));
    assert!(bus.frames().is_empty());
}

#[test]
fn stretched_small_move_still_reaches_the_wire() {
    let (ctl, bus, _) = controller(&[(1, 10.0), (2, 20.0), (3, 5.0)], 10);
    ctl.connect(&MockProbe::basic());
    let axes = [1, 2, 3];
    // Axis 3 stretched to the 0.7 s of axis 1 would cruise at ~0.024 RPM.
    let targets = BTreeMap::from([(1, 30.0), (2, 0.0), (3, 0.02)]);

    let handle = ctl
        .start_interpolated_move(&targets, &uniform(&axes, 100.0), &uniform(&axes, 500.0))
        .unwrap();
    assert!((handle.plan().duration() - 0.7).abs() < 1e-9);
    assert_eq!(handle.dispatch().unwrap().succeeded, vec![1, 3]);

    let staged = bus.frames_with(0xFD);
    assert_eq!(staged.len(), 2);
    for frame in &staged {
        let accel = u16::from_be_bytes([frame[3], frame[4]]);
        let speed = u16::from_be_bytes([frame[7], frame[8]]);
        assert!(accel >= 1, "axis {} accel field is zero", frame[0]);
        assert!(speed >= 1, "axis {} speed field is zero", frame[0]);
    }
    let axis3 = &staged[1];
    assert_eq!(axis3[0], 3);
    // 0.1 RPM and 0.1° motor-side, both one tenth on the wire.
    assert_eq!(u16::from_be_bytes([axis3[7], axis3[8]]), 1);
    assert_eq!(
        u32::from_be_bytes([axis3[9], axis3[10], axis3[11], axis3[12]]),
        1
    );
    handle.wait(Duration::from_secs(2));
}
