//! Digital Twin Sync Loop.
//!
//! A single background worker samples the active [`TrajectoryPlan`] every
//! tick and writes the pose to the simulator sink.
//!
//! ## Architecture
//!
//! ```text
//!  control thread                        twin worker
//!  ──────────────                        ───────────
//!  start(plan B)
//!    ├─ fence.deactivate()  ──────────►  next write(A) rejected
//!    ├─ cancel_tx.send(())  ──────────►  recv_timeout wakes → exit
//!    ├─ wait (bounded) for exit
//!    ├─ fence.activate(B)
//!    └─ spawn worker B                   write(B), sleep via recv_timeout, ...
//! ```
//!
//! The cancellation channel's `recv_timeout` doubles as the tick sleep, so a
//! cancel interrupts the wait immediately. Every sink write goes through the
//! [`PoseFence`], which holds the sink lock for the duration of the write
//! and rejects writes from any plan other than the active one. A worker that
//! outlives the bounded wait can therefore never reach the sink again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arm_common::bus::SimSink;
use arm_common::consts::{CANCEL_JOIN_TIMEOUT, SHUTDOWN_JOIN_TIMEOUT, TWIN_TICK};
use arm_common::error::{MotionError, MotionResult};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::command::dispatch::DispatchResult;
use crate::trajectory::TrajectoryPlan;

// ─── Pose Fence ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FenceState {
    /// Plan id allowed to write; 0 = none.
    active: u64,
    last: Option<Vec<f64>>,
}

/// Single-writer gate in front of the sink.
pub struct PoseFence {
    sink: Arc<dyn SimSink>,
    state: Mutex<FenceState>,
}

impl PoseFence {
    pub fn new(sink: Arc<dyn SimSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(FenceState::default()),
        }
    }

    /// Write on behalf of plan `id`. Returns false if `id` is not active.
    pub fn write(&self, id: u64, pose: &[f64]) -> bool {
        let mut st = self.state.lock();
        if st.active == 0 || st.active != id {
            return false;
        }
        self.sink.set_pose(pose);
        st.last = Some(pose.to_vec());
        true
    }

    /// Write outside any plan (e.g. seeding the initial pose).
    pub fn write_direct(&self, pose: &[f64]) {
        let mut st = self.state.lock();
        self.sink.set_pose(pose);
        st.last = Some(pose.to_vec());
    }

    fn activate(&self, id: u64) {
        self.state.lock().active = id;
    }

    /// Block until any in-flight write finishes, then reject all plans.
    fn deactivate(&self) {
        self.state.lock().active = 0;
    }

    /// Last pose written to the sink.
    pub fn last_pose(&self) -> Option<Vec<f64>> {
        self.state.lock().last.clone()
    }
}

// ─── Completion ─────────────────────────────────────────────────────

/// How a twin worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwinExit {
    /// Final sample written.
    Completed,
    /// Stopped by cancellation.
    Cancelled,
}

#[derive(Debug, Default)]
struct Completion {
    exit: Mutex<Option<TwinExit>>,
    cond: Condvar,
}

impl Completion {
    fn finish(&self, exit: TwinExit) {
        *self.exit.lock() = Some(exit);
        self.cond.notify_all();
    }

    fn get(&self) -> Option<TwinExit> {
        *self.exit.lock()
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<TwinExit> {
        let deadline = Instant::now() + timeout;
        let mut exit = self.exit.lock();
        while exit.is_none() {
            if self.cond.wait_until(&mut exit, deadline).timed_out() {
                break;
            }
        }
        *exit
    }
}

// ─── Plan Handle ────────────────────────────────────────────────────

/// Non-blocking handle to a started interpolated move.
#[derive(Debug, Clone)]
pub struct PlanHandle {
    id: u64,
    plan: Arc<TrajectoryPlan>,
    completion: Arc<Completion>,
    dispatch: Option<DispatchResult>,
}

impl PlanHandle {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn plan(&self) -> &TrajectoryPlan {
        &self.plan
    }

    /// Bus dispatch that accompanied the move, if any.
    pub fn dispatch(&self) -> Option<&DispatchResult> {
        self.dispatch.as_ref()
    }

    pub(crate) fn set_dispatch(&mut self, result: Option<DispatchResult>) {
        self.dispatch = result;
    }

    pub fn is_finished(&self) -> bool {
        self.completion.get().is_some()
    }

    pub fn exit(&self) -> Option<TwinExit> {
        self.completion.get()
    }

    /// Wait for the worker to exit.
    pub fn wait(&self, timeout: Duration) -> Option<TwinExit> {
        self.completion.wait_timeout(timeout)
    }
}

// ─── Twin Sync ──────────────────────────────────────────────────────

struct ActiveWorker {
    id: u64,
    cancel_tx: Sender<()>,
    completion: Arc<Completion>,
    thread: JoinHandle<()>,
}

/// Owner of the twin worker and the pose fence.
pub struct TwinSync {
    fence: Arc<PoseFence>,
    tick: Duration,
    cancel_timeout: Duration,
    next_id: AtomicU64,
    active: Mutex<Option<ActiveWorker>>,
}

impl TwinSync {
    pub fn new(sink: Arc<dyn SimSink>) -> Self {
        Self::with_timing(sink, TWIN_TICK, CANCEL_JOIN_TIMEOUT)
    }

    pub fn with_timing(sink: Arc<dyn SimSink>, tick: Duration, cancel_timeout: Duration) -> Self {
        Self {
            fence: Arc::new(PoseFence::new(sink)),
            tick,
            cancel_timeout,
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    pub fn fence(&self) -> &PoseFence {
        &self.fence
    }

    pub fn last_pose(&self) -> Option<Vec<f64>> {
        self.fence.last_pose()
    }

    /// Id of the running plan, if its worker has not exited.
    pub fn active_plan(&self) -> Option<u64> {
        self.active
            .lock()
            .as_ref()
            .filter(|w| w.completion.get().is_none())
            .map(|w| w.id)
    }

    /// Cancel any running plan, then start `plan`.
    pub fn start(&self, plan: TrajectoryPlan) -> MotionResult<PlanHandle> {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            self.stop_worker(previous, self.cancel_timeout);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let plan = Arc::new(plan);
        let completion = Arc::new(Completion::default());
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        self.fence.activate(id);

        let worker_plan = Arc::clone(&plan);
        let worker_fence = Arc::clone(&self.fence);
        let worker_done = Arc::clone(&completion);
        let tick = self.tick;
        let thread = std::thread::Builder::new()
            .name(format!("twin-sync-{id}"))
            .spawn(move || {
                let exit = run_worker(id, &worker_plan, &worker_fence, tick, &cancel_rx);
                debug!(plan = id, ?exit, "twin worker exit");
                worker_done.finish(exit);
            })
            .map_err(|e| {
                self.fence.deactivate();
                MotionError::Config(format!("failed to spawn twin worker: {e}"))
            })?;

        info!(
            plan = id,
            joints = plan.joint_count(),
            duration_s = plan.duration(),
            "twin plan started"
        );

        *active = Some(ActiveWorker {
            id,
            cancel_tx,
            completion: Arc::clone(&completion),
            thread,
        });

        Ok(PlanHandle {
            id,
            plan,
            completion,
            dispatch: None,
        })
    }

    /// Cancel the running plan. Returns true if a worker was still running.
    pub fn cancel(&self) -> bool {
        let worker = self.active.lock().take();
        match worker {
            Some(w) => {
                let running = w.completion.get().is_none();
                self.stop_worker(w, self.cancel_timeout);
                running
            }
            None => false,
        }
    }

    /// Stop with the longer shutdown timeout.
    pub fn shutdown(&self) {
        if let Some(w) = self.active.lock().take() {
            self.stop_worker(w, SHUTDOWN_JOIN_TIMEOUT);
        }
    }

    fn stop_worker(&self, worker: ActiveWorker, timeout: Duration) {
        // No write from this worker can land after deactivate() returns.
        self.fence.deactivate();
        // Receiver may already be gone if the worker completed.
        let _ = worker.cancel_tx.send(());

        match worker.completion.wait_timeout(timeout) {
            Some(exit) => {
                if worker.thread.join().is_err() {
                    warn!(plan = worker.id, "twin worker panicked");
                }
                debug!(plan = worker.id, ?exit, "twin worker joined");
            }
            None => {
                warn!(
                    plan = worker.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "twin worker did not exit in time; detached"
                );
            }
        }
    }
}

impl Drop for TwinSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    id: u64,
    plan: &TrajectoryPlan,
    fence: &PoseFence,
    tick: Duration,
    cancel_rx: &mpsc::Receiver<()>,
) -> TwinExit {
    let duration = plan.duration();
    let mut pose = vec![0.0; plan.joint_count()];

    plan.sample_positions_into(0.0, &mut pose);
    if !fence.write(id, &pose) {
        return TwinExit::Cancelled;
    }
    if duration <= 0.0 {
        return TwinExit::Completed;
    }

    // Samples follow wall-clock time; a slow write shortens the next wait
    // instead of shifting every later tick.
    let started = Instant::now();
    let mut deadline = started;
    loop {
        deadline = (deadline + tick).max(Instant::now());
        match cancel_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return TwinExit::Cancelled,
        }
        let t = started.elapsed().as_secs_f64().min(duration);
        plan.sample_positions_into(t, &mut pose);
        if !fence.write(id, &pose) {
            return TwinExit::Cancelled;
        }
        if t >= duration {
            return TwinExit::Completed;
        }
    }
}
