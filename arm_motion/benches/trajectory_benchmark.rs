//! Trajectory and encoding micro-benchmark.
//!
//! Measures the per-tick work of the motion core:
//! - six-joint plan construction
//! - plan sampling into a reused buffer (one twin tick)
//! - direct trapezoid encoding and a six-axis envelope

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use arm_common::bus::DeviceLimits;
use arm_motion::command::encoder::{CommandEncoder, MotionCommand, MotionTarget};
use arm_motion::trajectory::TrajectoryPlan;

const RATIOS: [f64; 6] = [62.0, 51.0, 51.0, 62.0, 12.0, 8.0];
const START: [f64; 6] = [0.0; 6];
const TARGET: [f64; 6] = [30.0, -15.0, 0.0, 0.0, 90.0, 0.0];
const DT: f64 = 0.04; // 25 Hz twin tick

fn caps(rpm: f64) -> Vec<f64> {
    RATIOS.iter().map(|r| rpm * 6.0 / r).collect()
}

fn bench_plan(c: &mut Criterion) {
    let vel = caps(500.0);
    let acc = caps(1000.0);
    c.bench_function("plan_six_joints", |b| {
        b.iter(|| {
            black_box(
                TrajectoryPlan::plan(black_box(&START), black_box(&TARGET), &vel, &acc).unwrap(),
            )
        });
    });
}

fn bench_sample(c: &mut Criterion) {
    let plan = TrajectoryPlan::plan(&START, &TARGET, &caps(500.0), &caps(1000.0)).unwrap();
    let ticks = plan.tick_count(DT);
    let mut buf = [0.0; 6];
    let mut k = 0u64;

    c.bench_function("sample_positions_tick", |b| {
        b.iter(|| {
            k = (k + 1) % (ticks + 1);
            plan.sample_positions_into(black_box(k as f64 * DT), &mut buf);
            black_box(&buf);
        });
    });
}

fn trapezoid(axis: u8, deg: f64) -> MotionCommand {
    MotionCommand::new(
        axis,
        MotionTarget::Trapezoid {
            angle_deg: deg,
            speed_rpm: 500.0,
            accel_rpm_s: 1000.0,
            decel_rpm_s: 1000.0,
            absolute: true,
        },
    )
    .staged(true)
}

fn bench_encode(c: &mut Criterion) {
    let encoder = CommandEncoder::new(DeviceLimits::default());
    let cmds: Vec<_> = (1..=6u8)
        .zip(TARGET)
        .map(|(axis, deg)| trapezoid(axis, deg * RATIOS[axis as usize - 1]))
        .collect();

    c.bench_function("encode_direct_trapezoid", |b| {
        b.iter(|| black_box(encoder.encode(black_box(&cmds[0])).unwrap()));
    });

    c.bench_function("encode_envelope_six_axes", |b| {
        b.iter(|| black_box(encoder.encode_envelope(black_box(&cmds)).unwrap()));
    });
}

criterion_group!(benches, bench_plan, bench_sample, bench_encode);
criterion_main!(benches);
