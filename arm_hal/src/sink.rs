//! Twin pose recorder.
//!
//! Stands in for the 3-D viewer: keeps the last pose, counts writes and
//! optionally retains the whole trace for inspection.

use arm_common::bus::SimSink;
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct Recorded {
    last: Option<Vec<f64>>,
    writes: u64,
    trace: Vec<Vec<f64>>,
}

/// [`SimSink`] that records what the twin loop writes.
#[derive(Debug, Default)]
pub struct PoseRecorder {
    keep_trace: bool,
    inner: Mutex<Recorded>,
}

impl PoseRecorder {
    /// Recorder keeping only the last pose.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder keeping every pose written.
    pub fn with_trace() -> Self {
        Self {
            keep_trace: true,
            ..Self::default()
        }
    }

    /// Last pose written [deg].
    pub fn last_pose(&self) -> Option<Vec<f64>> {
        self.inner.lock().last.clone()
    }

    /// Number of poses written.
    pub fn writes(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Every pose written, oldest first. Empty unless built `with_trace`.
    pub fn trace(&self) -> Vec<Vec<f64>> {
        self.inner.lock().trace.clone()
    }
}

impl SimSink for PoseRecorder {
    fn set_pose(&self, joints_deg: &[f64]) {
        let mut rec = self.inner.lock();
        rec.writes += 1;
        rec.last = Some(joints_deg.to_vec());
        if self.keep_trace {
            rec.trace.push(joints_deg.to_vec());
        }
        trace!(writes = rec.writes, "twin pose");
    }
}
