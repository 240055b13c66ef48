//! Board-agnostic core logic for the dispensing machine motion controller
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Motor channel abstraction (the seam to the hardware motor driver)
//! - Torque monitoring (effort smoothing and stall limits)
//! - Axis controller with the homing sequencer
//! - Volume-accounted dispense operations
//! - Cooperative machine controller tying it all to the command protocol
//! - Configuration type definitions

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod axis;
pub mod config;
pub mod dispense;
pub mod error;
pub mod machine;
pub mod torque;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use aliquot_protocol::{Command, DispenseKind, MoveArgs, MoveMode};
pub use error::{CommandError, FaultKind, HomingFailure, TimeoutKind, ValidationError};
