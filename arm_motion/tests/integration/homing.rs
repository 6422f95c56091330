//! Integration test: homing lifecycle and the motion busy gate.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use arm_common::prelude::*;
use arm_motion::command::homing::{HomingFailReason, HomingState, HomingTickResult};
use arm_motion::controller::{HomingTarget, JointTarget};

use super::mock::{MockProbe, controller, uniform};

fn move_to(axis: AxisId, deg: f64) -> BTreeMap<AxisId, JointTarget> {
    BTreeMap::from([(axis, JointTarget::absolute(deg, 100.0))])
}

#[test]
fn transport_error_mid_homing_gates_motion_until_reset() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0)], 5);
    ctl.connect(&MockProbe::basic());

    let params = HomingParameters::new(HomingMode::CollisionZero);
    let handle = ctl.trigger_homing(HomingTarget::Axis(2), &params).unwrap();
    assert_eq!(handle.started, vec![2]);
    assert_eq!(ctl.homing_state(2), HomingState::Homing);
    // Parameters are written before the trigger.
    let frames = bus.frames();
    assert_eq!(frames[0][1], 0x4C);
    assert_eq!(frames[1][..3], [2, 0x9A, HomingMode::CollisionZero as u8]);

    bus.fail_homing_status(2);
    let ticks = ctl.update_homing(Instant::now());
    assert!(matches!(
        ticks[&2],
        HomingTickResult::Failed {
            reason: HomingFailReason::Transport(BusError::Timeout)
        }
    ));
    assert_eq!(ctl.homing_state(2), HomingState::Failed);

    bus.clear();
    let r = ctl.dispatch_synchronized_move(&move_to(2, 10.0)).unwrap();
    assert!(matches!(
        r.failed[&2],
        MotionError::AxisBusy { axis: 2, state: "failed" }
    ));
    assert!(bus.frames().is_empty());
    assert!(matches!(
        ctl.start_interpolated_move(
            &BTreeMap::from([(2, 10.0)]),
            &uniform(&[2], 100.0),
            &uniform(&[2], 100.0)
        ),
        Err(MotionError::AxisBusy { axis: 2, .. })
    ));
    // The sibling axis is unaffected.
    let r = ctl.dispatch_synchronized_move(&move_to(1, 10.0)).unwrap();
    assert_eq!(r.succeeded, vec![1]);

    ctl.reset_homing(2).unwrap();
    assert_eq!(ctl.homing_state(2), HomingState::Idle);
    let r = ctl.dispatch_synchronized_move(&move_to(2, 10.0)).unwrap();
    assert_eq!(r.succeeded, vec![2]);
}

#[test]
fn homing_all_completes_per_axis() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0), (3, 1.0)], 5);
    ctl.connect(&MockProbe::basic());

    let handle = ctl
        .trigger_homing(HomingTarget::All, &HomingParameters::new(HomingMode::NearestZero))
        .unwrap();
    assert_eq!(handle.started, vec![1, 2, 3]);
    assert!(handle.is_complete());

    let busy = HomingStatusFlags::ENCODER_READY | HomingStatusFlags::HOMING_IN_PROGRESS;
    bus.set_homing_flags(1, HomingStatusFlags::ENCODER_READY);
    bus.set_homing_flags(2, busy);
    bus.set_homing_flags(3, HomingStatusFlags::HOMING_FAILED);

    let ticks = ctl.update_homing(Instant::now());
    assert_eq!(ticks[&1], HomingTickResult::Success);
    assert_eq!(ticks[&2], HomingTickResult::InProgress);
    assert_eq!(
        ticks[&3],
        HomingTickResult::Failed {
            reason: HomingFailReason::DeviceReported
        }
    );
    assert_eq!(ctl.homing_state(1), HomingState::Homed);
    assert_eq!(ctl.homing_failure(3), Some(HomingFailReason::DeviceReported));

    bus.set_homing_flags(2, HomingStatusFlags::ENCODER_READY);
    let states = ctl.wait_homing(&handle, Duration::from_secs(1));
    assert_eq!(states[&2], HomingState::Homed);
}

#[test]
fn trigger_failure_marks_only_that_axis() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0)], 5);
    ctl.connect(&MockProbe::basic());
    bus.fail_axis(1);

    let handle = ctl
        .trigger_homing(HomingTarget::All, &HomingParameters::new(HomingMode::NearestZero))
        .unwrap();
    assert_eq!(handle.started, vec![2]);
    assert!(matches!(
        handle.failed[&1],
        MotionError::Transport { axis: 1, .. }
    ));
    // Parameter write failed, so the supervisor never left Idle.
    assert_eq!(ctl.homing_state(1), HomingState::Idle);
    assert_eq!(ctl.homing_state(2), HomingState::Homing);
}

#[test]
fn abort_sends_force_stop_and_requires_reset() {
    let (ctl, bus, _) = controller(&[(1, 1.0)], 5);
    ctl.connect(&MockProbe::basic());
    ctl.trigger_homing(HomingTarget::Axis(1), &HomingParameters::new(HomingMode::NearestZero))
        .unwrap();
    assert!(ctl.reset_homing(1).is_err());

    let r = ctl.abort_homing(HomingTarget::Axis(1));
    assert_eq!(r.succeeded, vec![1]);
    assert_eq!(bus.frames_with(0x9C), vec![vec![1, 0x9C, 0x48, 0x6B]]);
    assert_eq!(ctl.homing_state(1), HomingState::Aborted);
    assert!(matches!(
        ctl.set_zero(1, false),
        Err(MotionError::AxisBusy { axis: 1, state: "aborted" })
    ));

    ctl.reset_homing(1).unwrap();
    assert!(ctl.set_zero(1, false).is_ok());
}

#[test]
fn full_tier_modes_need_every_axis() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0)], 5);
    ctl.connect(&MockProbe::basic());
    assert_eq!(ctl.available_homing_modes(1).len(), 4);

    let params = HomingParameters::new(HomingMode::AbsoluteOriginZero);
    assert!(matches!(
        ctl.trigger_homing(HomingTarget::All, &params),
        Err(MotionError::UnsupportedMode { axis: 1, .. })
    ));
    assert!(bus.frames().is_empty());

    let (ctl, _, _) = controller(&[(1, 1.0)], 5);
    ctl.connect(&MockProbe {
        single_packet: false,
        tier: HomingTier::Full,
    });
    assert_eq!(ctl.available_homing_modes(1).len(), 6);
    assert!(ctl.trigger_homing(HomingTarget::Axis(1), &params).is_ok());
}

#[test]
fn homing_parameters_read_and_write() {
    let (ctl, bus, _) = controller(&[(1, 1.0)], 5);
    let params = ctl.read_homing_parameters(1).unwrap();
    assert_eq!(params.mode, HomingMode::CollisionZero);
    assert_eq!(params.direction, HomingDirection::CounterClockwise);
    assert_eq!(params.speed_rpm, 30);
    assert_eq!(params.timeout, HomingTimeout::Exact(10_000));
    assert_eq!(params.collision_current_ma, Reported::Available(800));
    assert!(params.is_complete());

    ctl.write_homing_parameters(1, &params).unwrap();
    let written = bus.frames_with(0x4C);
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].len(), 20);

    let partial = HomingParameters {
        collision_time_ms: Reported::Unavailable,
        ..params
    };
    assert!(matches!(
        ctl.write_homing_parameters(1, &partial),
        Err(MotionError::Config(_))
    ));
    assert_eq!(bus.frames_with(0x4C).len(), 1);
}
