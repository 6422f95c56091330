//! # Arm HAL Library
//!
//! Simulated drive chain and host-side plumbing for the arm motion core.
//!
//! The motion core only talks to the `RawBus`, `AxisCapabilityProbe` and
//! `SimSink` traits. This crate provides in-process implementations of all
//! three, so the whole stack runs without hardware.
//!
//! # Module Structure
//!
//! - [`config`] - machine + simulator TOML configuration
//! - [`sim`] - simulated drive chain answering the wire protocol
//! - [`sink`] - twin pose recorder
//! - [`report`] - JSON status report
//! - [`error`] - crate error type
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       arm_hal (binary)                       │
//! │  ┌──────────────────┐       ┌────────────────────────────┐   │
//! │  │ MotionController │──────►│ SimBus ─► SimChain         │   │
//! │  │   (arm_motion)   │       │            └─ SimDrive × N │   │
//! │  └────────┬─────────┘       └────────────────────────────┘   │
//! │           │ twin poses                                       │
//! │           ▼                                                  │
//! │  ┌──────────────────┐       ┌────────────────────────────┐   │
//! │  │  PoseRecorder    │       │  StatusReport (JSON lines) │   │
//! │  └──────────────────┘       └────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod report;
pub mod sim;
pub mod sink;

pub use crate::config::{HalConfig, SimAxisConfig, SimConfig};
pub use crate::error::HalError;
pub use crate::report::StatusReport;
pub use crate::sim::{SimBus, SimChain, SimProbe};
pub use crate::sink::PoseRecorder;
