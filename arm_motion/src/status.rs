//! Status Poller: per-axis, fault-isolated state reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use arm_common::error::MotionResult;
use arm_common::joint::AxisId;
use arm_common::status::AxisStatus;
use tracing::{debug, warn};

use crate::command::dispatch::Dispatcher;
use crate::command::encoder::read_frame;
use crate::command::protocol::{
    FunctionCode, decode_bus_voltage, decode_motor_flags, decode_phase_current, decode_position,
    decode_speed, decode_temperature,
};
use crate::registry::JointRegistry;

/// Reads a status snapshot for each requested axis.
pub struct StatusPoller {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<JointRegistry>,
}

impl StatusPoller {
    pub fn new(dispatcher: Arc<Dispatcher>, registry: Arc<JointRegistry>) -> Self {
        Self {
            dispatcher,
            registry,
        }
    }

    /// Poll every axis. A failure on one axis never affects another.
    pub fn poll(&self, axes: &[AxisId]) -> BTreeMap<AxisId, MotionResult<AxisStatus>> {
        axes.iter()
            .map(|&axis| {
                let result = self.poll_axis(axis);
                if let Err(e) = &result {
                    warn!(axis, error = %e, "status read failed");
                }
                (axis, result)
            })
            .collect()
    }

    /// Read one axis.
    pub fn poll_axis(&self, axis: AxisId) -> MotionResult<AxisStatus> {
        let mut status = AxisStatus::default();

        let flags = decode_motor_flags(axis, &self.read(axis, FunctionCode::ReadMotorStatus)?)?;
        status.apply_flags(flags);

        let motor_deg = decode_position(axis, &self.read(axis, FunctionCode::ReadPosition)?)?;
        let logical = self.registry.to_logical(axis, motor_deg);
        status.motor_position_deg = motor_deg;
        status.position_deg = logical.value;
        status.used_default_config = logical.used_default;

        status.speed_rpm = decode_speed(axis, &self.read(axis, FunctionCode::ReadSpeed)?)?;
        status.bus_voltage_v =
            decode_bus_voltage(axis, &self.read(axis, FunctionCode::ReadBusVoltage)?)?;
        status.phase_current_a =
            decode_phase_current(axis, &self.read(axis, FunctionCode::ReadPhaseCurrent)?)?;
        status.temperature_c =
            decode_temperature(axis, &self.read(axis, FunctionCode::ReadTemperature)?)?;

        debug!(axis, position_deg = status.position_deg, "status read");
        Ok(status)
    }

    fn read(&self, axis: AxisId, func: FunctionCode) -> MotionResult<Vec<u8>> {
        self.dispatcher.read(axis, func, &read_frame(axis, func))
    }
}
