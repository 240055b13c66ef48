//! Machine controller
//!
//! Cooperative scheduler owning every axis and the dispense manager.

pub mod controller;
pub mod events;

pub use controller::{Machine, TickOutput, MAX_EVENTS, MAX_STATUS_LINES};
pub use events::MachineEvent;
