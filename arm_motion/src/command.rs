//! Motion command path: wire protocol, encoding, dispatch, homing.

pub mod dispatch;
pub mod encoder;
pub mod homing;
pub mod protocol;
