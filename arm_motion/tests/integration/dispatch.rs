//! Integration test: synchronized dispatch through the controller.

use std::collections::BTreeMap;

use arm_common::prelude::*;
use arm_motion::command::dispatch::SyncStrategy;
use arm_motion::controller::JointTarget;

use super::mock::{MockProbe, controller};

fn targets(entries: &[(AxisId, f64)]) -> BTreeMap<AxisId, JointTarget> {
    entries
        .iter()
        .map(|&(axis, deg)| (axis, JointTarget::absolute(deg, 300.0)))
        .collect()
}

#[test]
fn stage_failure_still_broadcasts_for_the_rest() {
    let (ctl, bus, _) = controller(&[(1, 10.0), (2, 10.0)], 5);
    ctl.connect(&MockProbe::basic());
    bus.fail_axis(2);

    let r = ctl
        .dispatch_synchronized_move(&targets(&[(1, 5.0), (2, 5.0)]))
        .unwrap();
    assert_eq!(r.strategy, SyncStrategy::FlaggedBroadcast);
    assert_eq!(r.succeeded, vec![1]);
    assert_eq!(r.failed.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert!(r.execute_issued);

    let frames = bus.frames();
    assert_eq!(frames.len(), 3);
    // Stage for axis 1 carries the sync flag and the physical target 50°.
    assert_eq!(frames[0][0], 1);
    assert_eq!(frames[0][1], 0xFB);
    assert_eq!(&frames[0][5..9], &500u32.to_be_bytes());
    assert_eq!(frames[0][10], 1);
    // Broadcast goes out last.
    assert_eq!(frames[2], vec![0x00, 0xFF, 0x66, 0x6B]);

    assert!(matches!(
        r.ensure_complete(),
        Err(MotionError::PartialDispatchFailure { succeeded, failed })
            if succeeded == vec![1] && failed.contains_key(&2)
    ));
}

#[test]
fn range_error_fails_before_any_traffic() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0)], 5);
    ctl.connect(&MockProbe::basic());
    let mut t = targets(&[(1, 5.0)]);
    t.insert(2, JointTarget::absolute(5.0, 1.0e6));

    assert!(matches!(
        ctl.dispatch_synchronized_move(&t),
        Err(MotionError::Range { axis: 2, field: "speed_rpm", .. })
    ));
    assert!(bus.frames().is_empty());
}

#[test]
fn joint_limit_is_checked_locally() {
    let mut config = super::mock::machine(&[(1, 1.0)], 5);
    config.joints[0] = JointConfig::new(1, 1.0, JointDirection::Normal).with_limits(-90.0, 90.0);
    let bus = super::mock::MockBus::new();
    let ctl = arm_motion::MotionController::new(
        &config,
        Box::new(bus.clone()),
        std::sync::Arc::new(super::mock::InstrumentedSink::default()),
    )
    .unwrap();

    assert!(matches!(
        ctl.dispatch_synchronized_move(&targets(&[(1, 120.0)])),
        Err(MotionError::Range { axis: 1, field: "joint_angle_deg", .. })
    ));
    assert!(bus.frames().is_empty());
}

#[test]
fn single_packet_when_every_axis_supports_it() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0), (3, 1.0)], 5);
    let report = ctl.connect(&MockProbe {
        single_packet: true,
        tier: HomingTier::Full,
    });
    assert_eq!(report.strategy, SyncStrategy::SinglePacket);

    let t: BTreeMap<_, _> = [1, 2, 3]
        .into_iter()
        .map(|a| (a, JointTarget::absolute(10.0, 200.0).with_ramp(500.0, 500.0)))
        .collect();
    let r = ctl.dispatch_synchronized_move(&t).unwrap();
    assert!(r.is_complete());
    assert!(!r.execute_issued);

    let frames = bus.frames();
    assert_eq!(frames.len(), 1);
    let env = &frames[0];
    assert_eq!(&env[..2], &[0x00, 0xAA]);
    // Three 16-byte trapezoid sub-frames, sync flags cleared.
    let len = u16::from_be_bytes([env[2], env[3]]) as usize;
    assert_eq!(len, 3 * 16 + 1);
    for i in 0..3 {
        let sub = &env[4 + i * 16..4 + (i + 1) * 16];
        assert_eq!(sub[0], i as u8 + 1);
        assert_eq!(sub[1], 0xFD);
        assert_eq!(sub[14], 0);
        assert_eq!(sub[15], 0x6B);
    }
    assert_eq!(*env.last().unwrap(), 0x6B);
}

#[test]
fn stop_all_reaches_every_axis() {
    let (ctl, bus, _) = controller(&[(1, 1.0), (2, 1.0), (3, 1.0)], 5);
    bus.fail_axis(3);
    let r = ctl.stop_all();
    assert_eq!(r.succeeded, vec![1, 2]);
    assert!(r.failed.contains_key(&3));
    assert_eq!(bus.frames_with(0xFE).len(), 3);
}

#[test]
fn status_poll_isolates_failures() {
    let (ctl, bus, _) = controller(&[(1, 62.0), (2, 51.0)], 5);
    bus.set_motor_deg(1, 1860.0);
    bus.fail_axis(2);

    let statuses = ctl.poll_status(&[1, 2, 7]);
    let s1 = statuses[&1].as_ref().unwrap();
    assert!((s1.position_deg - 30.0).abs() < 1e-9);
    assert_eq!(s1.motor_position_deg, 1860.0);
    assert!(s1.enabled && s1.in_position);
    assert!((s1.bus_voltage_v - 24.0).abs() < 1e-9);
    assert!(!s1.used_default_config);

    assert!(matches!(
        statuses[&2],
        Err(MotionError::Transport { axis: 2, .. })
    ));
    assert!(statuses[&7].as_ref().unwrap().used_default_config);
}
