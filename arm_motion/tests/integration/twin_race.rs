//! Integration test: twin sink has a single writer across plan restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use arm_common::error::MotionError;
use arm_motion::twin::TwinExit;

use super::mock::{controller, uniform};

const AXES: [u8; 2] = [1, 2];

fn target(deg: f64) -> BTreeMap<u8, f64> {
    AXES.iter().map(|&a| (a, deg)).collect()
}

/// Writers must appear as contiguous runs: once a new worker has written,
/// no earlier worker writes again.
fn assert_contiguous_writers(writes: &[(std::thread::ThreadId, Vec<f64>)]) {
    let mut finished = BTreeSet::new();
    let mut current = None;
    for (id, _) in writes {
        let key = format!("{id:?}");
        if current.as_ref() != Some(&key) {
            assert!(!finished.contains(&key), "writer {key} resumed after handover");
            if let Some(prev) = current.replace(key) {
                finished.insert(prev);
            }
        }
    }
}

#[test]
fn cancel_then_start_never_overlaps() {
    let (ctl, _, sink) = controller(&[(1, 1.0), (2, 1.0)], 1);
    let vel = uniform(&AXES, 10.0);
    let acc = uniform(&AXES, 10.0);

    for round in 0..20 {
        let deg = if round % 2 == 0 { 500.0 } else { -500.0 };
        let handle = ctl.preview_interpolated_move(&target(deg), &vel, &acc).unwrap();
        std::thread::sleep(Duration::from_millis(3));
        if round % 3 == 0 {
            // Restart without an explicit cancel.
            continue;
        }
        assert!(ctl.cancel_active_move());
        assert_eq!(handle.exit(), Some(TwinExit::Cancelled));
    }
    ctl.cancel_active_move();

    assert_eq!(sink.max_in_flight(), 1);
    assert_contiguous_writers(&sink.writes());
}

#[test]
fn cancelled_plan_writes_nothing_more() {
    let (ctl, _, sink) = controller(&[(1, 1.0), (2, 1.0)], 2);
    ctl.preview_interpolated_move(&target(1000.0), &uniform(&AXES, 1.0), &uniform(&AXES, 1.0))
        .unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert!(ctl.cancel_active_move());

    let count = sink.writes().len();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sink.writes().len(), count);
    assert!(!ctl.cancel_active_move());
}

#[test]
fn next_plan_starts_from_last_written_pose() {
    let (ctl, _, sink) = controller(&[(1, 1.0), (2, 1.0)], 2);
    let first = ctl
        .preview_interpolated_move(&target(1000.0), &uniform(&AXES, 1.0), &uniform(&AXES, 1.0))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    ctl.cancel_active_move();
    assert_eq!(first.exit(), Some(TwinExit::Cancelled));

    let last = ctl.twin().last_pose().unwrap();
    assert_eq!(sink.poses().last().unwrap(), &last);

    let second = ctl
        .preview_interpolated_move(&target(0.0), &uniform(&AXES, 50.0), &uniform(&AXES, 500.0))
        .unwrap();
    assert_eq!(second.plan().start(), last.as_slice());
    assert_eq!(second.wait(Duration::from_secs(2)), Some(TwinExit::Completed));
    assert_eq!(ctl.twin().last_pose().unwrap(), vec![0.0, 0.0]);
}

#[test]
fn rejected_move_leaves_running_plan_alone() {
    let (ctl, bus, sink) = controller(&[(1, 1.0), (2, 1.0)], 2);
    let first = ctl
        .start_interpolated_move(&target(1000.0), &uniform(&AXES, 1.0), &uniform(&AXES, 1.0))
        .unwrap();
    std::thread::sleep(Duration::from_millis(10));
    let frames = bus.frames().len();
    let back = BTreeMap::from([(1, -50.0)]);

    let missing = ctl
        .start_interpolated_move(&back, &BTreeMap::new(), &BTreeMap::new())
        .unwrap_err();
    assert!(matches!(missing, MotionError::PlanInfeasible(_)));

    // 70 000 RPM/s does not fit the acceleration field.
    let over = ctl
        .start_interpolated_move(&back, &uniform(&[1], 100.0), &uniform(&[1], 70_000.0))
        .unwrap_err();
    assert!(matches!(
        over,
        MotionError::Range {
            axis: 1,
            field: "accel_rpm_s",
            ..
        }
    ));

    assert_eq!(first.exit(), None);
    assert_eq!(ctl.twin().active_plan(), Some(first.id()));
    assert_eq!(bus.frames().len(), frames);
    let count = sink.writes().len();
    std::thread::sleep(Duration::from_millis(20));
    assert!(sink.writes().len() > count);

    assert!(ctl.cancel_active_move());
}
