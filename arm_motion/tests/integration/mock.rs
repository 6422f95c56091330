//! Scripted drive bus, capability probe and instrumented twin sink.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

use arm_common::prelude::*;
use arm_motion::MotionController;
use parking_lot::Mutex;

// ── Drive Bus ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DriveState {
    pub frames: Vec<Vec<u8>>,
    /// Every frame addressed to these axes times out.
    pub fail_axes: BTreeSet<AxisId>,
    /// Homing status reads on these axes time out.
    pub fail_homing_status: BTreeSet<AxisId>,
    pub homing_flags: BTreeMap<AxisId, u8>,
    pub motor_deg: BTreeMap<AxisId, f64>,
}

/// Bus that answers like a chain of drives.
#[derive(Clone, Default)]
pub struct MockBus {
    pub state: Arc<Mutex<DriveState>>,
}

const IDLE_HOMING: u8 = 0x03;
const BUSY_HOMING: u8 = 0x07;

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().frames.clone()
    }

    /// Frames carrying function code `func`.
    pub fn frames_with(&self, func: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .frames
            .iter()
            .filter(|f| f[1] == func)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().frames.clear();
    }

    pub fn fail_axis(&self, axis: AxisId) {
        self.state.lock().fail_axes.insert(axis);
    }

    pub fn fail_homing_status(&self, axis: AxisId) {
        self.state.lock().fail_homing_status.insert(axis);
    }

    pub fn set_homing_flags(&self, axis: AxisId, flags: HomingStatusFlags) {
        self.state.lock().homing_flags.insert(axis, flags.bits());
    }

    pub fn set_motor_deg(&self, axis: AxisId, deg: f64) {
        self.state.lock().motor_deg.insert(axis, deg);
    }
}

fn reply(addr: u8, func: u8, data: &[u8]) -> Ack {
    let mut bytes = vec![addr, func];
    bytes.extend_from_slice(data);
    bytes.push(0x6B);
    Ack::from_slice(&bytes)
}

impl RawBus for MockBus {
    fn send(&mut self, frame: &[u8]) -> Result<Ack, BusError> {
        let mut st = self.state.lock();
        st.frames.push(frame.to_vec());

        let (addr, func) = (frame[0], frame[1]);
        if addr == BROADCAST_ADDRESS && func == 0xFF {
            return Ok(Ack::empty());
        }
        let target = if addr == BROADCAST_ADDRESS && func == 0xAA {
            frame[4]
        } else {
            addr
        };
        if st.fail_axes.contains(&target) {
            return Err(BusError::Timeout);
        }

        let ack = match func {
            0x9A => {
                st.homing_flags.insert(addr, BUSY_HOMING);
                reply(addr, func, &[0x02])
            }
            0x3B => {
                if st.fail_homing_status.contains(&addr) {
                    return Err(BusError::Timeout);
                }
                let flags = st.homing_flags.get(&addr).copied().unwrap_or(IDLE_HOMING);
                reply(addr, func, &[flags])
            }
            0x3A => reply(addr, func, &[0x03]),
            0x36 => {
                let deg = st.motor_deg.get(&addr).copied().unwrap_or(0.0);
                let tenths = ((deg.abs() * 10.0).round() as u32).to_be_bytes();
                let sign = u8::from(deg < 0.0);
                reply(
                    addr,
                    func,
                    &[sign, tenths[0], tenths[1], tenths[2], tenths[3]],
                )
            }
            0x35 => reply(addr, func, &[0x00, 0x00, 0x00]),
            // 24.000 V
            0x24 => reply(addr, func, &[0x5D, 0xC0]),
            // 0.500 A
            0x27 => reply(addr, func, &[0x01, 0xF4]),
            0x39 => reply(addr, func, &[0x00, 35]),
            0x22 => reply(
                addr,
                func,
                &[
                    0x02, 0x01, 0x00, 0x1E, 0x00, 0x00, 0x27, 0x10, 0x0F, 0xA0, 0x03, 0x20, 0x00,
                    0x3C, 0x00,
                ],
            ),
            _ => reply(target, func, &[0x02]),
        };
        Ok(ack)
    }
}

// ── Probe ───────────────────────────────────────────────────────────

pub struct MockProbe {
    pub single_packet: bool,
    pub tier: HomingTier,
}

impl MockProbe {
    pub fn basic() -> Self {
        Self {
            single_packet: false,
            tier: HomingTier::Basic,
        }
    }
}

impl AxisCapabilityProbe for MockProbe {
    fn probe(&self, _axis: AxisId) -> Result<AxisCapabilities, BusError> {
        Ok(AxisCapabilities {
            single_packet_dispatch: self.single_packet,
            homing_tier: self.tier,
            limits: DeviceLimits::default(),
        })
    }
}

// ── Twin Sink ───────────────────────────────────────────────────────

/// Records writer identity per call and the peak number of concurrent writers.
#[derive(Default)]
pub struct InstrumentedSink {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    writes: Mutex<Vec<(ThreadId, Vec<f64>)>>,
}

impl InstrumentedSink {
    pub fn writes(&self) -> Vec<(ThreadId, Vec<f64>)> {
        self.writes.lock().clone()
    }

    pub fn poses(&self) -> Vec<Vec<f64>> {
        self.writes.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SimSink for InstrumentedSink {
    fn set_pose(&self, joints_deg: &[f64]) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::yield_now();
        self.writes
            .lock()
            .push((std::thread::current().id(), joints_deg.to_vec()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn machine(joints: &[(AxisId, f64)], tick_ms: u64) -> MachineConfig {
    MachineConfig {
        shared: SharedConfig {
            log_level: LogLevel::default(),
            service_name: "arm-test".to_string(),
        },
        motion: MotionSettings {
            twin_tick_ms: tick_ms,
            ..MotionSettings::default()
        },
        joints: joints
            .iter()
            .map(|&(axis, ratio)| JointConfig::new(axis, ratio, JointDirection::Normal))
            .collect(),
    }
}

pub fn controller(
    joints: &[(AxisId, f64)],
    tick_ms: u64,
) -> (MotionController, MockBus, Arc<InstrumentedSink>) {
    let bus = MockBus::new();
    let sink = Arc::new(InstrumentedSink::default());
    let ctl = MotionController::new(
        &machine(joints, tick_ms),
        Box::new(bus.clone()),
        sink.clone(),
    )
    .unwrap();
    (ctl, bus, sink)
}

/// Same value for every listed axis.
pub fn uniform(axes: &[AxisId], value: f64) -> BTreeMap<AxisId, f64> {
    axes.iter().map(|&a| (a, value)).collect()
}
