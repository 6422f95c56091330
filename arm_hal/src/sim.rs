//! Simulated drive chain.
//!
//! A `SimChain` owns one [`SimDrive`] per configured joint behind a shared
//! lock. [`SimBus`] routes frames to the drives the way a physical chain
//! does, and [`SimProbe`] reports what each drive advertises.
//!
//! ## Routing
//!
//! | Frame                    | Handling                                    |
//! |--------------------------|---------------------------------------------|
//! | `[00, FF, 66, 6B]`       | every drive runs its staged commands, no reply |
//! | `[00, AA, len, ..., 6B]` | sub-frames applied at once, first axis replies |
//! | `[addr, ...]`            | addressed drive replies                     |
//! | offline / unknown addr   | `BusError::Timeout`                         |

pub mod drive;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use arm_common::bus::{
    Ack, AxisCapabilities, AxisCapabilityProbe, BusError, DeviceLimits, RawBus,
};
use arm_common::consts::{BROADCAST_ADDRESS, FRAME_TRAILER};
use arm_common::joint::AxisId;
use arm_motion::command::protocol::{FunctionCode, aux, status};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::HalConfig;

pub use drive::SimDrive;
use drive::{motion_frame_len, reply};

/// Bytes before the first envelope sub-frame: coordinator, code, length.
const ENVELOPE_HEADER_LEN: usize = 4;

struct ChainState {
    drives: BTreeMap<AxisId, SimDrive>,
    frames_handled: u64,
}

/// Shared simulated drive chain.
#[derive(Clone)]
pub struct SimChain {
    state: Arc<Mutex<ChainState>>,
}

impl SimChain {
    /// One drive per configured joint, in power-up state.
    pub fn new(config: &HalConfig) -> Self {
        let now = Instant::now();
        let drives = config
            .machine
            .axis_ids()
            .into_iter()
            .map(|axis| {
                let drive = SimDrive::new(
                    config.sim_axis(axis),
                    config.sim.bus_voltage_mv,
                    config.sim.temperature_c,
                    now,
                );
                (axis, drive)
            })
            .collect::<BTreeMap<_, _>>();
        info!(drives = drives.len(), "simulated drive chain created");
        Self {
            state: Arc::new(Mutex::new(ChainState {
                drives,
                frames_handled: 0,
            })),
        }
    }

    /// Bus endpoint for the motion controller.
    pub fn bus(&self) -> SimBus {
        SimBus {
            state: Arc::clone(&self.state),
        }
    }

    /// Capability probe for the motion controller.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// Take a drive off or back on the bus. Returns false for an unknown axis.
    pub fn set_offline(&self, axis: AxisId, offline: bool) -> bool {
        match self.state.lock().drives.get_mut(&axis) {
            Some(drive) => {
                drive.set_offline(offline);
                info!(axis, offline, "drive availability changed");
                true
            }
            None => false,
        }
    }

    /// Current motor position [deg].
    pub fn motor_position(&self, axis: AxisId) -> Option<f64> {
        let now = Instant::now();
        self.state
            .lock()
            .drives
            .get_mut(&axis)
            .map(|d| d.position_at(now))
    }

    /// Drive output state.
    pub fn is_enabled(&self, axis: AxisId) -> Option<bool> {
        self.state.lock().drives.get(&axis).map(SimDrive::is_enabled)
    }

    /// Frames received since creation.
    pub fn frames_handled(&self) -> u64 {
        self.state.lock().frames_handled
    }
}

// ─── Bus ────────────────────────────────────────────────────────────

/// [`RawBus`] over a [`SimChain`].
pub struct SimBus {
    state: Arc<Mutex<ChainState>>,
}

impl SimBus {
    fn execute_all(st: &mut ChainState, now: Instant) {
        let mut released = 0usize;
        for drive in st.drives.values_mut().filter(|d| !d.is_offline()) {
            released += drive.pending_len();
            drive.execute_pending(now);
        }
        debug!(released, "execute broadcast");
    }

    fn envelope(st: &mut ChainState, frame: &[u8], now: Instant) -> Result<Ack, BusError> {
        let malformed = |detail: &str| BusError::Io(format!("malformed envelope: {detail}"));

        if frame.len() < ENVELOPE_HEADER_LEN + 1 {
            return Err(malformed("too short"));
        }
        let len = usize::from(u16::from_be_bytes([frame[2], frame[3]]));
        if frame.len() != ENVELOPE_HEADER_LEN + len || len == 0 {
            return Err(malformed("length mismatch"));
        }
        let body = &frame[ENVELOPE_HEADER_LEN..frame.len() - 1];

        let mut subframes = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let sub_len = body
                .get(i + 1)
                .and_then(|&func| motion_frame_len(func))
                .ok_or_else(|| malformed("unknown sub-frame"))?;
            let sub = body
                .get(i..i + sub_len)
                .filter(|s| s.last() == Some(&FRAME_TRAILER))
                .ok_or_else(|| malformed("truncated sub-frame"))?;
            subframes.push(sub);
            i += sub_len;
        }

        let Some(first) = subframes.first().map(|s| s[0]) else {
            return Err(malformed("empty"));
        };
        match st.drives.get(&first) {
            Some(d) if !d.is_offline() => {}
            _ => return Err(BusError::Timeout),
        }

        let mut ack_status = status::OK;
        for sub in subframes {
            let axis = sub[0];
            let outcome = match st.drives.get_mut(&axis) {
                Some(drive) if !drive.is_offline() => drive.handle_motion(sub, now),
                _ => None,
            };
            match outcome {
                Some(status::OK) => {}
                other => {
                    warn!(axis, status = ?other, "envelope sub-frame not applied");
                    if axis == first {
                        ack_status = other.unwrap_or(status::COMMAND_ERROR);
                    }
                }
            }
        }
        Ok(Ack::from_slice(&reply(
            first,
            FunctionCode::Envelope as u8,
            &[ack_status],
        )))
    }
}

impl RawBus for SimBus {
    fn send(&mut self, frame: &[u8]) -> Result<Ack, BusError> {
        let now = Instant::now();
        let mut st = self.state.lock();
        st.frames_handled += 1;

        if frame.len() < 3 {
            return Err(BusError::Io(format!("frame too short ({} bytes)", frame.len())));
        }
        let (addr, func) = (frame[0], frame[1]);

        if addr == BROADCAST_ADDRESS {
            return match FunctionCode::from_u8(func) {
                Some(FunctionCode::SyncExecute) if frame.get(2) == Some(&aux::SYNC_EXECUTE) => {
                    Self::execute_all(&mut st, now);
                    Ok(Ack::empty())
                }
                Some(FunctionCode::Envelope) => Self::envelope(&mut st, frame, now),
                _ => Err(BusError::Io(format!("unsupported broadcast 0x{func:02X}"))),
            };
        }

        match st.drives.get_mut(&addr) {
            Some(drive) if !drive.is_offline() => Ok(Ack::from_slice(&drive.handle(frame, now))),
            _ => Err(BusError::Timeout),
        }
    }
}

// ─── Probe ──────────────────────────────────────────────────────────

/// [`AxisCapabilityProbe`] over a [`SimChain`].
pub struct SimProbe {
    state: Arc<Mutex<ChainState>>,
}

impl AxisCapabilityProbe for SimProbe {
    fn probe(&self, axis: AxisId) -> Result<AxisCapabilities, BusError> {
        let st = self.state.lock();
        match st.drives.get(&axis) {
            Some(drive) if !drive.is_offline() => {
                let cfg = drive.config();
                Ok(AxisCapabilities {
                    single_packet_dispatch: cfg.single_packet,
                    homing_tier: cfg.homing_tier,
                    limits: DeviceLimits::default(),
                })
            }
            _ => Err(BusError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimAxisConfig;
    use arm_common::config::{LogLevel, MachineConfig, MotionSettings, SharedConfig};
    use arm_common::homing::HomingTier;
    use arm_common::joint::{JointConfig, JointDirection};

    fn config(sim_axes: Vec<SimAxisConfig>) -> HalConfig {
        HalConfig {
            machine: MachineConfig {
                shared: SharedConfig {
                    log_level: LogLevel::default(),
                    service_name: "sim-test".to_string(),
                },
                motion: MotionSettings::default(),
                joints: (1..=3)
                    .map(|a| JointConfig::new(a, 10.0, JointDirection::Normal))
                    .collect(),
            },
            sim: crate::config::SimConfig {
                axes: sim_axes,
                ..Default::default()
            },
        }
    }

    fn enable_all(bus: &mut SimBus) {
        for axis in 1..=3u8 {
            bus.send(&[axis, 0xF3, 0xAB, 0x01, 0x00, 0x6B]).unwrap();
        }
    }

    /// FB to `deg` absolute at 100 RPM.
    fn position(axis: u8, deg: u32, sync: u8) -> Vec<u8> {
        let mut f = vec![axis, 0xFB, 0x00, 0x03, 0xE8];
        f.extend_from_slice(&(deg * 10).to_be_bytes());
        f.extend_from_slice(&[0x01, sync, 0x6B]);
        f
    }

    #[test]
    fn flagged_broadcast_releases_staged_moves() {
        let chain = SimChain::new(&config(vec![]));
        let mut bus = chain.bus();
        enable_all(&mut bus);

        for axis in 1..=3u8 {
            let ack = bus.send(&position(axis, 1, 1)).unwrap();
            assert_eq!(ack.bytes(), &[axis, 0xFB, 0x02, 0x6B]);
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(chain.motor_position(1), Some(0.0));

        let ack = bus.send(&[0x00, 0xFF, 0x66, 0x6B]).unwrap();
        assert!(ack.bytes().is_empty());
        std::thread::sleep(std::time::Duration::from_millis(50));
        // 100 RPM = 600 deg/s, 1 deg takes < 2 ms
        for axis in 1..=3u8 {
            assert_eq!(chain.motor_position(axis), Some(1.0));
        }
        assert_eq!(chain.frames_handled(), 7);
    }

    #[test]
    fn envelope_applies_every_subframe() {
        let chain = SimChain::new(&config(vec![]));
        let mut bus = chain.bus();
        enable_all(&mut bus);

        let mut body = Vec::new();
        for axis in [2u8, 3] {
            body.extend_from_slice(&position(axis, 2, 0));
        }
        let len = (body.len() + 1) as u16;
        let mut frame = vec![0x00, 0xAA];
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&body);
        frame.push(0x6B);

        let ack = bus.send(&frame).unwrap();
        assert_eq!(ack.bytes(), &[2, 0xAA, 0x02, 0x6B]);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(chain.motor_position(2), Some(2.0));
        assert_eq!(chain.motor_position(3), Some(2.0));
        assert_eq!(chain.motor_position(1), Some(0.0));
    }

    #[test]
    fn malformed_envelope_is_an_io_error() {
        let chain = SimChain::new(&config(vec![]));
        let mut bus = chain.bus();
        let frame = [0x00, 0xAA, 0x00, 0x05, 0x01, 0xFB, 0x6B];
        assert!(matches!(bus.send(&frame), Err(BusError::Io(_))));
    }

    #[test]
    fn offline_drive_times_out_and_probes_fail() {
        let mut offline = SimAxisConfig::new(2);
        offline.offline = true;
        let chain = SimChain::new(&config(vec![offline]));
        let mut bus = chain.bus();
        let probe = chain.probe();

        assert_eq!(bus.send(&[2, 0x3A, 0x6B]), Err(BusError::Timeout));
        assert_eq!(bus.send(&[9, 0x3A, 0x6B]), Err(BusError::Timeout));
        assert_eq!(probe.probe(2), Err(BusError::Timeout));
        assert!(probe.probe(1).is_ok());

        assert!(chain.set_offline(2, false));
        assert!(bus.send(&[2, 0x3A, 0x6B]).is_ok());
        assert!(!chain.set_offline(9, true));
    }

    #[test]
    fn probe_reports_configured_capabilities() {
        let mut full = SimAxisConfig::new(3);
        full.homing_tier = HomingTier::Full;
        full.single_packet = false;
        let chain = SimChain::new(&config(vec![full]));
        let probe = chain.probe();

        let caps = probe.probe(3).unwrap();
        assert_eq!(caps.homing_tier, HomingTier::Full);
        assert!(!caps.single_packet_dispatch);
        assert!(probe.probe(1).unwrap().single_packet_dispatch);
    }
}
