//! Joint Registry: per-axis reducer ratio and rotation sign.
//!
//! Single owner of joint configuration. Reads are concurrent, writes are
//! serialized behind a reader-writer lock, and a whole table can be swapped
//! atomically with [`JointRegistry::reload`].
//!
//! Unknown axes never fail conversion: they fall back to ratio 1 and
//! direction +1, and the result carries `used_default = true`.

use std::collections::BTreeMap;

use arm_common::error::{MotionError, MotionResult};
use arm_common::joint::{AxisId, JointConfig, JointDirection};
use parking_lot::RwLock;
use tracing::{debug, info};

/// Converted angle plus whether the fallback configuration was used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub value: f64,
    pub used_default: bool,
}

/// Registry of joint configurations keyed by axis id.
#[derive(Debug, Default)]
pub struct JointRegistry {
    joints: RwLock<BTreeMap<AxisId, JointConfig>>,
}

impl JointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a validated joint table.
    pub fn from_configs(configs: &[JointConfig]) -> MotionResult<Self> {
        let registry = Self::new();
        registry.reload(configs)?;
        Ok(registry)
    }

    /// Insert or replace one joint.
    pub fn set_config(&self, config: JointConfig) -> MotionResult<()> {
        config.validate().map_err(MotionError::Config)?;
        debug!(
            axis = config.axis_id,
            ratio = config.reducer_ratio,
            "joint config set"
        );
        self.joints.write().insert(config.axis_id, config);
        Ok(())
    }

    /// Insert or replace one joint from a ratio and an integer sign (±1).
    pub fn set_joint(&self, axis: AxisId, reducer_ratio: f64, sign: i8) -> MotionResult<()> {
        let direction = JointDirection::from_sign(sign).ok_or_else(|| {
            MotionError::Config(format!("axis {axis}: direction must be ±1, got {sign}"))
        })?;
        self.set_config(JointConfig::new(axis, reducer_ratio, direction))
    }

    /// Registered configuration, if any.
    pub fn get_config(&self, axis: AxisId) -> Option<JointConfig> {
        self.joints.read().get(&axis).cloned()
    }

    /// Effective configuration (registered or fallback).
    pub fn effective(&self, axis: AxisId) -> (JointConfig, bool) {
        match self.joints.read().get(&axis) {
            Some(cfg) => (cfg.clone(), false),
            None => (JointConfig::fallback(axis), true),
        }
    }

    /// Replace the whole table. Nothing changes if any entry is invalid.
    pub fn reload(&self, configs: &[JointConfig]) -> MotionResult<()> {
        let mut table = BTreeMap::new();
        for cfg in configs {
            cfg.validate().map_err(MotionError::Config)?;
            if table.insert(cfg.axis_id, cfg.clone()).is_some() {
                return Err(MotionError::Config(format!(
                    "duplicate axis_id {}",
                    cfg.axis_id
                )));
            }
        }
        *self.joints.write() = table;
        info!(joints = configs.len(), "joint registry reloaded");
        Ok(())
    }

    /// Registered axis ids in ascending order.
    pub fn axes(&self) -> Vec<AxisId> {
        self.joints.read().keys().copied().collect()
    }

    /// Logical [deg] → physical motor [deg].
    pub fn to_physical(&self, axis: AxisId, logical_deg: f64) -> Conversion {
        let (cfg, used_default) = self.effective(axis);
        Conversion {
            value: logical_deg * cfg.reducer_ratio * cfg.direction.sign(),
            used_default,
        }
    }

    /// Physical motor [deg] → logical [deg].
    pub fn to_logical(&self, axis: AxisId, physical_deg: f64) -> Conversion {
        let (cfg, used_default) = self.effective(axis);
        Conversion {
            value: physical_deg * cfg.direction.sign() / cfg.reducer_ratio,
            used_default,
        }
    }

    /// Motor speed [RPM] → joint output rate [deg/s].
    pub fn rpm_to_joint_deg_per_s(&self, axis: AxisId, rpm: f64) -> f64 {
        let (cfg, _) = self.effective(axis);
        rpm * 6.0 / cfg.reducer_ratio
    }

    /// Joint output rate [deg/s] → motor speed [RPM].
    pub fn joint_deg_per_s_to_rpm(&self, axis: AxisId, deg_per_s: f64) -> f64 {
        let (cfg, _) = self.effective(axis);
        deg_per_s * cfg.reducer_ratio / 6.0
    }

    /// Reject a logical target outside the joint's configured limits.
    pub fn check_limits(&self, axis: AxisId, logical_deg: f64) -> MotionResult<()> {
        let (cfg, _) = self.effective(axis);
        let min = cfg.min_deg.unwrap_or(f64::NEG_INFINITY);
        let max = cfg.max_deg.unwrap_or(f64::INFINITY);
        if !logical_deg.is_finite() || logical_deg < min || logical_deg > max {
            return Err(MotionError::Range {
                axis,
                field: "joint_angle_deg",
                value: logical_deg,
                min,
                max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn six_axis() -> JointRegistry {
        let ratios = [62.0, 51.0, 51.0, 62.0, 12.0, 8.0];
        let configs: Vec<_> = ratios
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let dir = if i % 2 == 0 {
                    JointDirection::Normal
                } else {
                    JointDirection::Inverted
                };
                JointConfig::new(i as u8 + 1, *r, dir)
            })
            .collect();
        JointRegistry::from_configs(&configs).unwrap()
    }

    #[test]
    fn physical_applies_ratio_and_sign() {
        let reg = six_axis();
        let c = reg.to_physical(1, 10.0);
        assert_eq!(c.value, 620.0);
        assert!(!c.used_default);
        assert_eq!(reg.to_physical(2, 10.0).value, -510.0);
    }

    #[test]
    fn logical_inverts_physical() {
        let reg = six_axis();
        let phys = reg.to_physical(5, 33.3).value;
        let back = reg.to_logical(5, phys).value;
        assert!((back - 33.3).abs() < 1e-9);
    }

    #[test]
    fn unknown_axis_uses_default() {
        let reg = six_axis();
        let c = reg.to_physical(42, 15.0);
        assert_eq!(c.value, 15.0);
        assert!(c.used_default);
        assert!(reg.to_logical(42, 15.0).used_default);
    }

    #[test]
    fn set_joint_rejects_invalid() {
        let reg = JointRegistry::new();
        assert!(matches!(
            reg.set_joint(1, 0.0, 1),
            Err(MotionError::Config(_))
        ));
        assert!(matches!(
            reg.set_joint(1, 10.0, 0),
            Err(MotionError::Config(_))
        ));
        assert!(reg.set_joint(1, 10.0, -1).is_ok());
        assert_eq!(
            reg.get_config(1).unwrap().direction,
            JointDirection::Inverted
        );
    }

    #[test]
    fn reload_is_all_or_nothing() {
        let reg = six_axis();
        let bad = vec![
            JointConfig::new(1, 2.0, JointDirection::Normal),
            JointConfig::new(2, -1.0, JointDirection::Normal),
        ];
        assert!(reg.reload(&bad).is_err());
        assert_eq!(reg.get_config(1).unwrap().reducer_ratio, 62.0);
        assert_eq!(reg.axes().len(), 6);
    }

    #[test]
    fn rpm_conversion() {
        let reg = six_axis();
        // 500 RPM through a 12:1 reducer = 250 deg/s at the output.
        assert!((reg.rpm_to_joint_deg_per_s(5, 500.0) - 250.0).abs() < 1e-9);
        assert!((reg.joint_deg_per_s_to_rpm(5, 250.0) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn limits_checked() {
        let reg = JointRegistry::new();
        reg.set_config(JointConfig::new(3, 51.0, JointDirection::Normal).with_limits(-90.0, 90.0))
            .unwrap();
        assert!(reg.check_limits(3, 45.0).is_ok());
        assert!(matches!(
            reg.check_limits(3, 120.0),
            Err(MotionError::Range { axis: 3, .. })
        ));
        assert!(reg.check_limits(9, 1e6).is_ok());
    }
}
