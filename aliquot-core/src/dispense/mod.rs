//! Volume-accounted dispense operations
//!
//! Inject and purge run on top of the dispense axis. The manager tracks
//! how much volume each motion segment actually delivered so that pause,
//! resume and cancel never lose or double count material.

pub mod manager;
pub mod operation;

pub use manager::DispenseManager;
pub use operation::{DispenseEvent, DispenseFault, DispenseOperation, DispenseOutcome, DispensePhase};
