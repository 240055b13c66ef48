//! Reply, report and telemetry line formatting
//!
//! Every accepted command is answered with a [`Reply`] right away and later
//! produces exactly one terminal [`Report`]. Status lines are polled on a
//! fixed interval by the publisher.

use core::fmt::{self, Write};

use heapless::String;

/// Maximum formatted line length
pub const MAX_LINE_LEN: usize = 160;

/// One outbound protocol line
pub type Line = String<MAX_LINE_LEN>;

/// Format into a line, truncating at [`MAX_LINE_LEN`]
fn line(args: fmt::Arguments<'_>) -> Line {
    let mut out = Line::new();
    let _ = out.write_fmt(args);
    out
}

/// Volume with three decimals, `-` when absent
struct OptVolume(Option<f32>);

impl fmt::Display for OptVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(volume) => write!(f, "{:.3}", volume),
            None => f.write_str("-"),
        }
    }
}

/// Synchronous answer to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Command accepted
    Ok,
    /// Command rejected with a reason token
    Rejected(&'static str),
}

impl Reply {
    pub fn to_line(&self) -> Line {
        match self {
            Reply::Ok => line(format_args!("OK")),
            Reply::Rejected(reason) => line(format_args!("ERR {}", reason)),
        }
    }
}

/// Terminal outcome of an accepted operation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Report<'a> {
    /// Move finished at its target
    Done(&'a str),
    /// Homing sequence finished, axis referenced
    Homed(&'a str),
    /// Move ended early on a requested decelerated stop
    Stopped(&'a str),
    /// Operation interrupted by an abort
    Aborted(&'a str),
    /// Operation failed
    Error { source: &'a str, reason: &'static str },
    /// Dispense operation finalized
    Dispensed { outcome: &'static str, volume: f32 },
}

impl Report<'_> {
    pub fn to_line(&self) -> Line {
        match self {
            Report::Done(src) => line(format_args!("DONE {}", src)),
            Report::Homed(src) => line(format_args!("HOMED {}", src)),
            Report::Stopped(src) => line(format_args!("STOPPED {}", src)),
            Report::Aborted(src) => line(format_args!("ABORTED {}", src)),
            Report::Error { source, reason } => line(format_args!("ERROR {} {}", source, reason)),
            Report::Dispensed { outcome, volume } => {
                line(format_args!("DISPENSED {} {:.3}", outcome, volume))
            }
        }
    }

    /// Check if this report describes a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Report::Error { .. })
    }
}

/// Snapshot of one axis for the status poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTelemetry<'a> {
    pub name: &'a str,
    /// Top-level state name
    pub state: &'static str,
    /// Homing phase name while homing
    pub phase: Option<&'static str>,
    pub homed: bool,
    /// Position in axis units
    pub position: f32,
    /// Smoothed effort per channel, percent
    pub torque: &'a [f32],
}

impl AxisTelemetry<'_> {
    pub fn to_line(&self) -> Line {
        let mut out = line(format_args!(
            "AXIS {} state={} phase={} homed={} pos={:.3} torque=",
            self.name,
            self.state,
            self.phase.unwrap_or("-"),
            self.homed as u8,
            self.position,
        ));
        for (i, torque) in self.torque.iter().enumerate() {
            let sep = if i == 0 { "" } else { "," };
            let _ = write!(out, "{}{:.1}", sep, torque);
        }
        out
    }
}

/// Snapshot of the dispense manager for the status poll
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispenseTelemetry {
    pub phase: &'static str,
    /// Operation kind while one is ongoing
    pub kind: Option<&'static str>,
    /// Cumulative dispensed volume of the ongoing operation
    pub dispensed: f32,
    /// Target volume of the ongoing operation
    pub target: f32,
    /// Increments still to travel
    pub remaining_increments: i32,
    /// Volume of the last successfully completed operation
    pub last_completed: f32,
    /// Outcome token of the last finalized operation
    pub last_outcome: Option<&'static str>,
    /// Volume delivered by the last operation, when it faulted
    pub faulted: Option<f32>,
}

impl DispenseTelemetry {
    pub fn to_line(&self) -> Line {
        line(format_args!(
            "DISPENSE phase={} kind={} dispensed={:.3} target={:.3} remaining={} last={:.3} outcome={} faulted={}",
            self.phase,
            self.kind.unwrap_or("-"),
            self.dispensed,
            self.target,
            self.remaining_increments,
            self.last_completed,
            self.last_outcome.unwrap_or("-"),
            OptVolume(self.faulted),
        ))
    }
}
