//! Arm Common Library
//!
//! Shared types, constants and configuration loading for the arm motion
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits, machine/joint configuration
//! - [`consts`] - Protocol constants and system-wide limits
//! - [`joint`] - Axis identifiers and per-joint mechanical configuration
//! - [`homing`] - Homing modes, parameters and wire availability tags
//! - [`status`] - Device status flags and the per-axis status snapshot
//! - [`bus`] - Collaborator traits: raw bus, capability probe, pose sink
//! - [`error`] - Motion error taxonomy
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use arm_common::prelude::*;
//! use arm_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod bus;
pub mod config;
pub mod consts;
pub mod error;
pub mod homing;
pub mod joint;
pub mod prelude;
pub mod status;
