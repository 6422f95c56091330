//! Synchronization Dispatcher.
//!
//! Executes one multi-axis motion batch over the bus using one of two
//! wire-level synchronization strategies, resolved once per connected axis
//! set through the capability probe.
//!
//! ## Strategies
//!
//! | Strategy          | Wire traffic                                          |
//! |-------------------|-------------------------------------------------------|
//! | FlaggedBroadcast  | N staged direct frames, then one execute broadcast     |
//! | SinglePacket      | One envelope carrying every axis                       |
//!
//! SinglePacket is chosen only when **every** axis reports support; a failed
//! probe counts as "unsupported".
//!
//! ## Failure semantics
//!
//! Every command is validated and encoded before the first byte is sent, so
//! range and configuration errors fail the call with no bus traffic. Once
//! sending starts, a failing axis is recorded and the batch continues; with
//! FlaggedBroadcast the execute broadcast is still issued for the staged
//! subset. No rollback is attempted.

use std::collections::BTreeMap;

use arm_common::bus::{Ack, AxisCapabilities, AxisCapabilityProbe, BusError, RawBus};
use arm_common::consts::BROADCAST_ADDRESS;
use arm_common::error::{MotionError, MotionResult, transport_error};
use arm_common::joint::AxisId;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::encoder::{
    CommandEncoder, Frame, MotionCommand, immediate_stop_frame, sync_execute_frame, validate,
};
use super::protocol::{FunctionCode, check_control_ack, read_data};

// ─── Strategy ───────────────────────────────────────────────────────

/// Wire-level synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncStrategy {
    /// Stage per-axis frames with the sync flag, then broadcast execute.
    #[default]
    FlaggedBroadcast,
    /// One envelope packet for all axes.
    SinglePacket,
}

/// Pick the strategy for a probed axis set.
pub fn resolve_strategy<'a>(
    probes: impl IntoIterator<Item = &'a Result<AxisCapabilities, BusError>>,
) -> SyncStrategy {
    let mut any = false;
    for probe in probes {
        any = true;
        match probe {
            Ok(caps) if caps.single_packet_dispatch => {}
            _ => return SyncStrategy::FlaggedBroadcast,
        }
    }
    if any {
        SyncStrategy::SinglePacket
    } else {
        SyncStrategy::FlaggedBroadcast
    }
}

// ─── Dispatch Result ────────────────────────────────────────────────

/// Per-axis partition of one dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub strategy: SyncStrategy,
    /// Axes whose command was accepted, in dispatch order.
    pub succeeded: Vec<AxisId>,
    pub failed: BTreeMap<AxisId, MotionError>,
    /// Execute broadcast sent (FlaggedBroadcast only).
    pub execute_issued: bool,
}

impl DispatchResult {
    pub fn new(strategy: SyncStrategy) -> Self {
        Self {
            strategy,
            succeeded: Vec::new(),
            failed: BTreeMap::new(),
            execute_issued: false,
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Record an axis rejected before dispatch (e.g. busy).
    pub fn reject(&mut self, axis: AxisId, err: MotionError) {
        self.failed.insert(axis, err);
    }

    /// Convert any failure into `PartialDispatchFailure`.
    pub fn ensure_complete(self) -> MotionResult<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(MotionError::PartialDispatchFailure {
            succeeded: self.succeeded,
            failed: self
                .failed
                .into_iter()
                .map(|(axis, e)| (axis, e.to_string()))
                .collect(),
        })
    }
}

// ─── Bus Channel ────────────────────────────────────────────────────

/// Exclusive owner of the physical bus.
pub struct BusChannel {
    bus: Mutex<Box<dyn RawBus>>,
}

impl BusChannel {
    pub fn new(bus: Box<dyn RawBus>) -> Self {
        Self {
            bus: Mutex::new(bus),
        }
    }

    /// Hold the bus for a whole batch.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn RawBus>> {
        self.bus.lock()
    }

    /// One request/response exchange.
    pub fn transact(&self, axis: AxisId, frame: &[u8]) -> MotionResult<Ack> {
        send(&mut **self.bus.lock(), axis, frame)
    }
}

fn send(bus: &mut dyn RawBus, axis: AxisId, frame: &[u8]) -> MotionResult<Ack> {
    bus.send(frame).map_err(|e| transport_error(axis, e))
}

// ─── Dispatcher ─────────────────────────────────────────────────────

/// Capabilities discovered by [`Dispatcher::connect`].
#[derive(Debug, Clone, Default)]
pub struct ConnectReport {
    pub strategy: SyncStrategy,
    pub capabilities: BTreeMap<AxisId, AxisCapabilities>,
    pub probe_failures: BTreeMap<AxisId, BusError>,
}

/// Multi-axis command dispatcher.
pub struct Dispatcher {
    bus: BusChannel,
    encoder: RwLock<CommandEncoder>,
    strategy: RwLock<SyncStrategy>,
}

impl Dispatcher {
    pub fn new(bus: Box<dyn RawBus>, encoder: CommandEncoder) -> Self {
        Self {
            bus: BusChannel::new(bus),
            encoder: RwLock::new(encoder),
            strategy: RwLock::new(SyncStrategy::default()),
        }
    }

    /// Probe the axis set and fix the strategy for subsequent dispatches.
    pub fn connect(&self, axes: &[AxisId], probe: &dyn AxisCapabilityProbe) -> ConnectReport {
        let results: Vec<_> = axes.iter().map(|&a| (a, probe.probe(a))).collect();
        let strategy = resolve_strategy(results.iter().map(|(_, r)| r));

        let mut report = ConnectReport {
            strategy,
            ..ConnectReport::default()
        };
        let mut encoder = self.encoder.write();
        for (axis, result) in results {
            match result {
                Ok(caps) => {
                    encoder.set_axis_limits(axis, caps.limits);
                    report.capabilities.insert(axis, caps);
                }
                Err(e) => {
                    warn!(axis, error = %e, "capability probe failed");
                    report.probe_failures.insert(axis, e);
                }
            }
        }
        *self.strategy.write() = strategy;
        info!(?strategy, axes = axes.len(), "dispatcher connected");
        report
    }

    #[inline]
    pub fn strategy(&self) -> SyncStrategy {
        *self.strategy.read()
    }

    pub fn encoder(&self) -> CommandEncoder {
        self.encoder.read().clone()
    }

    pub fn bus(&self) -> &BusChannel {
        &self.bus
    }

    /// Range-check a batch against the connected bounds. No bus traffic.
    pub fn validate(&self, commands: &[MotionCommand]) -> MotionResult<()> {
        let encoder = self.encoder.read();
        commands
            .iter()
            .try_for_each(|cmd| validate(cmd, &encoder.limits(cmd.axis)))
    }

    /// Dispatch a synchronized batch.
    ///
    /// Returns `Err` only for local validation failures. Bus failures are
    /// reported per axis in the result.
    pub fn dispatch(&self, commands: &[MotionCommand]) -> MotionResult<DispatchResult> {
        let strategy = self.strategy();
        if commands.is_empty() {
            return Ok(DispatchResult::new(strategy));
        }
        match strategy {
            SyncStrategy::FlaggedBroadcast => self.dispatch_flagged(commands),
            SyncStrategy::SinglePacket => self.dispatch_single_packet(commands),
        }
    }

    fn dispatch_flagged(&self, commands: &[MotionCommand]) -> MotionResult<DispatchResult> {
        let frames: Vec<(MotionCommand, Frame)> = {
            let encoder = self.encoder.read();
            commands
                .iter()
                .map(|cmd| {
                    let staged = cmd.staged(true);
                    encoder.encode(&staged).map(|f| (staged, f))
                })
                .collect::<MotionResult<_>>()?
        };

        let mut result = DispatchResult::new(SyncStrategy::FlaggedBroadcast);
        let mut bus = self.bus.lock();

        for (cmd, frame) in &frames {
            let outcome = send(&mut **bus, cmd.axis, frame)
                .and_then(|ack| check_control_ack(cmd.axis, cmd.function_code(), ack.bytes()));
            match outcome {
                Ok(()) => {
                    debug!(axis = cmd.axis, mode = ?cmd.mode(), "staged");
                    result.succeeded.push(cmd.axis);
                }
                Err(e) => {
                    warn!(axis = cmd.axis, error = %e, "stage failed");
                    result.failed.insert(cmd.axis, e);
                }
            }
        }

        if result.succeeded.is_empty() {
            warn!("no axis staged; execute broadcast skipped");
            return Ok(result);
        }

        match send(&mut **bus, BROADCAST_ADDRESS, &sync_execute_frame()) {
            Ok(_) => {
                result.execute_issued = true;
                info!(
                    staged = result.succeeded.len(),
                    failed = result.failed.len(),
                    "execute broadcast sent"
                );
            }
            Err(e) => {
                warn!(error = %e, "execute broadcast failed");
                for axis in result.succeeded.drain(..) {
                    result.failed.insert(axis, e.clone());
                }
            }
        }
        Ok(result)
    }

    fn dispatch_single_packet(&self, commands: &[MotionCommand]) -> MotionResult<DispatchResult> {
        let frame = self.encoder.read().encode_envelope(commands)?;
        let ack_axis = commands[0].axis;

        let mut result = DispatchResult::new(SyncStrategy::SinglePacket);
        let outcome = self
            .bus
            .transact(ack_axis, &frame)
            .and_then(|ack| check_control_ack(ack_axis, FunctionCode::Envelope, ack.bytes()));
        match outcome {
            Ok(()) => {
                result.succeeded = commands.iter().map(|c| c.axis).collect();
                info!(axes = commands.len(), bytes = frame.len(), "envelope sent");
            }
            Err(e) => {
                warn!(error = %e, "envelope failed");
                for cmd in commands {
                    result.failed.insert(cmd.axis, e.clone());
                }
            }
        }
        Ok(result)
    }

    /// Send one control frame and validate its acknowledgement.
    pub fn control(&self, axis: AxisId, func: FunctionCode, frame: &[u8]) -> MotionResult<()> {
        let ack = self.bus.transact(axis, frame)?;
        check_control_ack(axis, func, ack.bytes())
    }

    /// Send a read request and return the response data bytes.
    pub fn read(&self, axis: AxisId, func: FunctionCode, frame: &[u8]) -> MotionResult<Vec<u8>> {
        let ack = self.bus.transact(axis, frame)?;
        read_data(axis, func, ack.bytes()).map(<[u8]>::to_vec)
    }

    /// Immediate stop on every listed axis. Best effort, per-axis outcome.
    pub fn stop(&self, axes: &[AxisId]) -> DispatchResult {
        let mut result = DispatchResult::new(self.strategy());
        for &axis in axes {
            match self.control(axis, FunctionCode::ImmediateStop, &immediate_stop_frame(axis, false)) {
                Ok(()) => result.succeeded.push(axis),
                Err(e) => {
                    warn!(axis, error = %e, "stop failed");
                    result.failed.insert(axis, e);
                }
            }
        }
        result
    }
}
