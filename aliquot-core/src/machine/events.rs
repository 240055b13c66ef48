//! Machine-level events

use crate::axis::AxisEvent;
use crate::dispense::{DispenseEvent, DispenseOutcome};

/// Terminal event surfaced by a tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineEvent {
    /// An axis operation finished
    Axis { axis: usize, event: AxisEvent },
    /// A dispense operation finished
    Dispense(DispenseEvent),
}

impl MachineEvent {
    /// Check if this event reports a failure
    pub fn is_fault(&self) -> bool {
        match self {
            MachineEvent::Axis { event, .. } => matches!(event, AxisEvent::Fault(_)),
            MachineEvent::Dispense(event) => matches!(event.outcome, DispenseOutcome::Faulted(_)),
        }
    }
}
