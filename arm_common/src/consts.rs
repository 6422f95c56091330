//! System-wide constants for the arm motion workspace.
//!
//! Single source of truth for wire-protocol codes, numeric limits and
//! default timings. Imported by all crates, no duplication permitted.

use std::time::Duration;

use static_assertions::const_assert;

// ─── Addressing ─────────────────────────────────────────────────────

/// Maximum number of joint axes in one connected set.
pub const MAX_AXES: usize = 16;

/// Bus address reserved for broadcast / envelope coordinator frames.
pub const BROADCAST_ADDRESS: u8 = 0x00;

// ─── Framing ────────────────────────────────────────────────────────

/// Fixed trailer byte closing every frame and sub-frame.
pub const FRAME_TRAILER: u8 = 0x6B;

/// Longest motion frame allowed inside an envelope (trapezoid).
pub const MAX_DIRECT_FRAME_LEN: usize = 16;

/// Envelope overhead: coordinator addr, code, 2 length bytes, trailer.
pub const ENVELOPE_OVERHEAD: usize = 5;

/// Capacity of an encoded frame buffer.
pub const MAX_FRAME_LEN: usize = 320;

/// Capacity of a device response payload.
pub const MAX_ACK_LEN: usize = 32;

const_assert!(MAX_AXES * MAX_DIRECT_FRAME_LEN + ENVELOPE_OVERHEAD <= MAX_FRAME_LEN);
const_assert!(MAX_AXES <= 255);

// ─── Wire scaling ───────────────────────────────────────────────────

/// Speed and position fields are transmitted in tenths.
pub const WIRE_SCALE: f64 = 10.0;

/// Largest speed representable on the wire [RPM].
pub const MAX_WIRE_SPEED_RPM: f64 = u16::MAX as f64 / WIRE_SCALE;

/// Smallest non-zero speed the wire carries [RPM].
pub const MIN_WIRE_SPEED_RPM: f64 = 1.0 / WIRE_SCALE;

/// Smallest non-zero acceleration the wire carries [RPM/s].
pub const MIN_WIRE_ACCEL_RPM_S: f64 = 1.0;

/// Largest acceleration representable on the wire [RPM/s].
pub const MAX_WIRE_ACCEL_RPM_S: f64 = u16::MAX as f64;

/// Largest position magnitude representable on the wire [deg].
pub const MAX_WIRE_POSITION_DEG: f64 = u32::MAX as f64 / WIRE_SCALE;

/// Largest phase current representable on the wire [mA].
pub const MAX_WIRE_CURRENT_MA: f64 = u16::MAX as f64;

// ─── Default timings ────────────────────────────────────────────────

/// Digital twin sample period (25 Hz).
pub const TWIN_TICK: Duration = Duration::from_millis(40);

/// Bounded wait for a cancelled twin worker to exit.
pub const CANCEL_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Bounded wait for the twin worker at controller shutdown.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default homing speed [RPM].
pub const DEFAULT_HOMING_SPEED_RPM: u16 = 30;

/// Default homing timeout [ms].
pub const DEFAULT_HOMING_TIMEOUT_MS: u32 = 10_000;

/// Default collision-detection speed threshold [RPM].
pub const DEFAULT_COLLISION_SPEED_RPM: u16 = 4000;

/// Default collision-detection current threshold [mA].
pub const DEFAULT_COLLISION_CURRENT_MA: u16 = 800;

/// Default collision-detection time window [ms].
pub const DEFAULT_COLLISION_TIME_MS: u16 = 60;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/arm/machine.toml";
