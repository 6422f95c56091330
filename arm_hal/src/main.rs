//! # Arm HAL Binary
//!
//! Runs the motion core against the simulated drive chain: connect, optional
//! homing, one interpolated move, JSON status lines until it finishes.
//!
//! # Usage
//!
//! ```bash
//! # Status snapshot only
//! arm_hal --config config/machine.toml
//!
//! # Home every axis, then move joints 1..3 (logical degrees)
//! arm_hal -c config/machine.toml --homing nearest --target 30,-15,0
//!
//! # Verbose JSON logs on stderr
//! arm_hal -c config/machine.toml --target 10 -v --json
//! ```
//!
//! Reports go to stdout, one JSON object per line. Logs go to stderr.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arm_common::config::LogLevel;
use arm_common::homing::{HomingMode, HomingParameters};
use arm_common::joint::AxisId;
use arm_hal::report::{MoveSummary, StatusReport};
use arm_hal::{HalConfig, HalError, PoseRecorder, SimChain};
use arm_motion::MotionController;
use arm_motion::command::homing::HomingState;
use arm_motion::controller::HomingTarget;
use clap::{Parser, ValueEnum};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Extra wait on top of the homing timeout for the last status poll.
const HOMING_WAIT_MARGIN: Duration = Duration::from_secs(1);

/// Homing procedure selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HomingArg {
    Nearest,
    Directional,
    Collision,
    LimitSwitch,
    AbsoluteOrigin,
    LastPowerDown,
}

impl From<HomingArg> for HomingMode {
    fn from(arg: HomingArg) -> Self {
        match arg {
            HomingArg::Nearest => HomingMode::NearestZero,
            HomingArg::Directional => HomingMode::DirectionalZero,
            HomingArg::Collision => HomingMode::CollisionZero,
            HomingArg::LimitSwitch => HomingMode::LimitSwitchZero,
            HomingArg::AbsoluteOrigin => HomingMode::AbsoluteOriginZero,
            HomingArg::LastPowerDown => HomingMode::LastPowerDownPosition,
        }
    }
}

/// Arm HAL - motion core on a simulated drive chain
#[derive(Parser, Debug)]
#[command(name = "arm_hal")]
#[command(version)]
#[command(about = "Multi-axis synchronized motion on a simulated drive chain")]
#[command(long_about = None)]
struct Args {
    /// Machine + simulator configuration file.
    #[arg(short, long, default_value = "config/machine.toml")]
    config: PathBuf,

    /// Logical joint targets in degrees, comma separated, joint table order.
    #[arg(short, long, value_name = "DEG,DEG,...", allow_hyphen_values = true)]
    target: Option<String>,

    /// Motor velocity limit per axis [RPM].
    #[arg(long, default_value_t = 500.0)]
    vel_rpm: f64,

    /// Motor acceleration limit per axis [RPM/s].
    #[arg(long, default_value_t = 1000.0)]
    accel_rpm_s: f64,

    /// Home every axis before moving.
    #[arg(long, value_enum)]
    homing: Option<HomingArg>,

    /// Status poll period [ms].
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("arm_hal failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = HalConfig::load_validated(&args.config);
    setup_tracing(
        &args,
        config.as_ref().ok().map(|c| c.machine.shared.log_level),
    );
    let config = config.map_err(HalError::from)?;

    info!(
        "Arm HAL v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.machine.shared.service_name
    );

    let chain = SimChain::new(&config);
    let recorder = Arc::new(PoseRecorder::new());
    let controller = MotionController::new(
        &config.machine,
        Box::new(chain.bus()),
        Arc::clone(&recorder) as Arc<dyn arm_common::bus::SimSink>,
    )
    .map_err(HalError::from)?;

    let report = controller.connect(&chain.probe());
    info!(
        strategy = ?report.strategy,
        probed = report.capabilities.len(),
        unreachable = report.probe_failures.len(),
        "connected"
    );

    let axes = controller.axes().to_vec();
    let enabled = controller.enable(&axes, true);
    for (axis, e) in &enabled.failed {
        warn!(axis, error = %e, "axis not enabled");
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let started = Instant::now();
    controller.sync_twin_from_status();

    if let Some(arg) = args.homing {
        home_all(&controller, arg.into())?;
        controller.sync_twin_from_status();
    }

    match args.target.as_deref() {
        Some(list) => {
            let targets = parse_targets(list, &axes)?;
            run_move(&controller, &args, &targets, &running, started)?;
        }
        None => {
            let report = StatusReport::collect(&controller, started.elapsed().as_secs_f64());
            println!("{}", report.to_json_line().map_err(HalError::from)?);
        }
    }

    let disabled = controller.enable(&axes, false);
    info!(
        frames = chain.frames_handled(),
        twin_writes = recorder.writes(),
        disabled = disabled.succeeded.len(),
        "Arm HAL shutdown complete"
    );
    Ok(())
}

/// Map comma-separated degrees onto the first N configured axes.
fn parse_targets(list: &str, axes: &[AxisId]) -> Result<BTreeMap<AxisId, f64>, HalError> {
    let values = list
        .split(',')
        .map(|s| {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| HalError::InvalidTarget(format!("'{s}' is not a number")))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if values.len() > axes.len() {
        return Err(HalError::InvalidTarget(format!(
            "{} targets for {} configured joints",
            values.len(),
            axes.len()
        )));
    }
    Ok(axes.iter().copied().zip(values).collect())
}

fn home_all(controller: &MotionController, mode: HomingMode) -> Result<(), HalError> {
    let params = HomingParameters::new(mode);
    let handle = controller.trigger_homing(HomingTarget::All, &params)?;
    for (axis, e) in &handle.failed {
        warn!(axis, error = %e, "homing not started");
    }

    let timeout =
        Duration::from_millis(u64::from(params.timeout.upper_bound_ms())) + HOMING_WAIT_MARGIN;
    let states = controller.wait_homing(&handle, timeout);
    for (axis, state) in &states {
        match state {
            HomingState::Homed => info!(axis, "homed"),
            other => warn!(
                axis,
                state = other.as_str(),
                reason = ?controller.homing_failure(*axis),
                "homing did not complete"
            ),
        }
    }
    Ok(())
}

fn run_move(
    controller: &MotionController,
    args: &Args,
    targets: &BTreeMap<AxisId, f64>,
    running: &AtomicBool,
    started: Instant,
) -> Result<(), HalError> {
    let vel: BTreeMap<AxisId, f64> = targets.keys().map(|&a| (a, args.vel_rpm)).collect();
    let accel: BTreeMap<AxisId, f64> = targets.keys().map(|&a| (a, args.accel_rpm_s)).collect();

    let handle = controller.start_interpolated_move(targets, &vel, &accel)?;
    println!("{}", MoveSummary::from_handle(&handle).to_json_line()?);

    let poll = Duration::from_millis(args.poll_ms.max(1));
    while !handle.is_finished() {
        if !running.load(Ordering::SeqCst) {
            let stopped = controller.stop_all();
            warn!(
                stopped = stopped.succeeded.len(),
                failed = stopped.failed.len(),
                "move interrupted"
            );
            break;
        }
        handle.wait(poll);
        let report = StatusReport::collect(controller, started.elapsed().as_secs_f64());
        println!("{}", report.to_json_line()?);
    }

    println!("{}", MoveSummary::from_handle(&handle).to_json_line()?);
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        let level = configured.unwrap_or_default().as_str();
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
