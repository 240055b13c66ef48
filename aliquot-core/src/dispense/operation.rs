//! Dispense operation data

use aliquot_protocol::{DispenseKind, Report};

use crate::error::FaultKind;

/// Dispense manager phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispensePhase {
    /// No operation ongoing
    #[default]
    Idle,
    /// Move issued, waiting for the axis to report motion
    Starting,
    /// Axis is moving the plunger
    Active,
    /// Decelerated stop requested, waiting for it to settle
    Pausing,
    /// Stopped mid-operation, remaining increments kept
    Paused,
    /// Move for the remainder issued after a pause
    Resuming,
}

impl DispensePhase {
    pub fn name(self) -> &'static str {
        match self {
            DispensePhase::Idle => "Idle",
            DispensePhase::Starting => "Starting",
            DispensePhase::Active => "Active",
            DispensePhase::Pausing => "Pausing",
            DispensePhase::Paused => "Paused",
            DispensePhase::Resuming => "Resuming",
        }
    }

    /// Check if an operation is ongoing
    pub fn is_ongoing(self) -> bool {
        !matches!(self, DispensePhase::Idle)
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispenseOutcome {
    Completed,
    Cancelled,
    Faulted(FaultKind),
}

impl DispenseOutcome {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            DispenseOutcome::Completed => "completed",
            DispenseOutcome::Cancelled => "cancelled",
            DispenseOutcome::Faulted(_) => "faulted",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, DispenseOutcome::Completed)
    }
}

/// Terminal event of a dispense operation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispenseEvent {
    pub kind: DispenseKind,
    pub outcome: DispenseOutcome,
    /// Reported volume, per the cancel accounting policy
    pub volume: f32,
}

impl DispenseEvent {
    pub fn report(&self) -> Report<'static> {
        Report::Dispensed {
            outcome: self.outcome.as_str(),
            volume: self.volume,
        }
    }
}

/// Diagnostics kept for the last faulted operation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispenseFault {
    pub kind: DispenseKind,
    pub fault: FaultKind,
    /// Cumulative volume delivered before the fault
    pub volume: f32,
    /// Axis increments when the operation started
    pub start_position: i32,
    /// Axis increments where the motion stopped
    pub stop_position: i32,
}

/// One ongoing operation
///
/// Increment counts are the source of truth; volumes are derived from them
/// with the factor captured at start.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispenseOperation {
    pub kind: DispenseKind,
    pub target_volume: f32,
    /// Increments per unit of volume
    pub steps_per_volume: f32,
    /// Sign of plunger travel
    pub direction: f32,
    pub total_increments: i32,
    /// Increments delivered by folded segments
    pub dispensed_increments: i32,
    pub remaining_increments: i32,
    pub start_position: i32,
    pub segment_start: i32,
    /// Increments/s
    pub velocity: f32,
    /// Increments/s²
    pub accel: f32,
    pub torque_percent: f32,
}

impl DispenseOperation {
    /// Cumulative dispensed volume
    pub fn dispensed_volume(&self) -> f32 {
        self.dispensed_increments as f32 / self.steps_per_volume
    }

    /// Add the travel since the segment start and rebase the segment
    ///
    /// Travel against the dispense direction is ignored so the total never
    /// decreases.
    pub fn fold_segment(&mut self, position: i32) {
        let travelled = libm::roundf((position - self.segment_start) as f32 * self.direction) as i32;
        self.dispensed_increments = self
            .dispensed_increments
            .saturating_add(travelled.max(0))
            .min(self.total_increments);
        self.segment_start = position;
        self.remaining_increments = (self.total_increments - self.dispensed_increments).max(0);
    }

    /// Fault diagnostics as of the last folded segment
    pub fn fault_record(&self, fault: FaultKind) -> DispenseFault {
        DispenseFault {
            kind: self.kind,
            fault,
            volume: self.dispensed_volume(),
            start_position: self.start_position,
            stop_position: self.segment_start,
        }
    }
}
