//! Arm Motion - multi-axis synchronized motion core.
//!
//! ## Levels
//!
//! ```text
//! MotionController
//!   ├── JointRegistry        logical ↔ physical conversion
//!   ├── Dispatcher           FlaggedBroadcast | SinglePacket over the bus
//!   │     └── CommandEncoder direct frames, batched envelope
//!   ├── HomingTable          per-axis Idle → Homing → {Homed, Failed, Aborted}
//!   ├── TwinSync             background sampler → SimSink
//!   │     └── TrajectoryPlan common-duration trapezoidal profiles
//!   └── StatusPoller         per-axis fault-isolated reads
//! ```
//!
//! One control thread issues plan/dispatch/cancel calls. The twin worker is
//! the only background thread. Status polling is driven by an external timer.

pub mod command;
pub mod controller;
pub mod registry;
pub mod status;
pub mod trajectory;
pub mod twin;

pub use controller::MotionController;
