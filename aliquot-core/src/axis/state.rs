//! Axis states and terminal events

use aliquot_protocol::Report;

use super::homing::HomingSession;
use crate::error::FaultKind;

/// Top-level axis state
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisState {
    /// Idle, accepts commands
    Standby,
    /// Move issued, waiting for the drives to start stepping
    StartingMove { since_ms: u64 },
    /// Move in progress
    Moving,
    /// Homing sequence in progress
    Homing(HomingSession),
    /// Latched fault; motors stopped until the fault is cleared
    Fault(FaultKind),
}

impl AxisState {
    /// State name for telemetry
    pub fn name(&self) -> &'static str {
        match self {
            AxisState::Standby => "Standby",
            AxisState::StartingMove { .. } => "StartingMove",
            AxisState::Moving => "Moving",
            AxisState::Homing(_) => "Homing",
            AxisState::Fault(_) => "Fault",
        }
    }

    /// Check if an operation is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AxisState::StartingMove { .. } | AxisState::Moving | AxisState::Homing(_)
        )
    }

    /// Check if a normal move is in progress
    pub fn is_moving(&self) -> bool {
        matches!(self, AxisState::StartingMove { .. } | AxisState::Moving)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, AxisState::Fault(_))
    }
}

/// Terminal outcome of an axis operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisEvent {
    /// Move reached its target
    Done,
    /// Homing completed, axis referenced
    Homed,
    /// Move ended on a requested decelerated stop
    Stopped,
    /// Operation interrupted by abort
    Aborted,
    /// Operation failed, motors already stopped
    Fault(FaultKind),
}

impl AxisEvent {
    /// Protocol report for this event
    pub fn report(self, source: &str) -> Report<'_> {
        match self {
            AxisEvent::Done => Report::Done(source),
            AxisEvent::Homed => Report::Homed(source),
            AxisEvent::Stopped => Report::Stopped(source),
            AxisEvent::Aborted => Report::Aborted(source),
            AxisEvent::Fault(kind) => Report::Error {
                source,
                reason: kind.as_str(),
            },
        }
    }
}
