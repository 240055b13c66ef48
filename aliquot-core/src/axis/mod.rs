//! Axis control
//!
//! Per-axis move and homing state machine. An axis owns its motor channels
//! and is only ever mutated through its controller.

pub mod controller;
pub mod homing;
pub mod state;

pub use controller::AxisController;
pub use homing::{HomingPhase, HomingSession, Leg, Stage};
pub use state::{AxisEvent, AxisState};
