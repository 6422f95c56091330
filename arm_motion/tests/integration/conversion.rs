//! Integration test: logical ↔ physical conversion.

use arm_common::joint::{JointConfig, JointDirection};
use arm_motion::registry::JointRegistry;
use proptest::prelude::*;

fn registry() -> JointRegistry {
    JointRegistry::from_configs(&[
        JointConfig::new(1, 62.0, JointDirection::Normal),
        JointConfig::new(2, 51.0, JointDirection::Inverted),
        JointConfig::new(3, 0.5, JointDirection::Normal),
    ])
    .unwrap()
}

proptest! {
    #[test]
    fn round_trip_any_axis(axis in 0u8..=20, angle in -3600.0f64..3600.0) {
        let reg = registry();
        let physical = reg.to_physical(axis, angle);
        let back = reg.to_logical(axis, physical.value);
        prop_assert!((back.value - angle).abs() <= 1e-9 * angle.abs().max(1.0));
        prop_assert_eq!(physical.used_default, back.used_default);
        prop_assert_eq!(physical.used_default, !(1..=3).contains(&axis));
    }

    #[test]
    fn rpm_rate_round_trip(axis in 1u8..=3, rpm in 0.0f64..3000.0) {
        let reg = registry();
        let rate = reg.rpm_to_joint_deg_per_s(axis, rpm);
        prop_assert!((reg.joint_deg_per_s_to_rpm(axis, rate) - rpm).abs() < 1e-9);
    }
}

#[test]
fn inverted_joint_flips_sign() {
    let reg = registry();
    assert_eq!(reg.to_physical(2, 10.0).value, -510.0);
    assert_eq!(reg.to_logical(2, -510.0).value, 10.0);
}

#[test]
fn reload_is_all_or_nothing() {
    let reg = registry();
    let bad = [
        JointConfig::new(4, 10.0, JointDirection::Normal),
        JointConfig::new(5, -1.0, JointDirection::Normal),
    ];
    assert!(reg.reload(&bad).is_err());
    assert_eq!(reg.axes(), vec![1, 2, 3]);
    assert!(reg.set_joint(1, 62.0, 2).is_err());
}
