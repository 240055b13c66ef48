//! Torque monitoring
//!
//! Smooths per-channel effort readings for telemetry and evaluates
//! instantaneous stall limits.

pub mod monitor;

pub use monitor::{TorqueMonitor, DEFAULT_ALPHA, MAX_VALID_EFFORT};
