//! Aliquot Controller Line Protocol
//!
//! This crate defines the text boundary between the transport layer and the
//! motion core. The transport (datagrams, serial, whatever carries the bytes)
//! hands over one line at a time; the line is parsed exactly once into a
//! closed [`Command`] and nothing downstream inspects raw text again.
//!
//! # Protocol Overview
//!
//! ```text
//! host ──"move x abs 100 50 200 50"──▶ Command::Move ──▶ motion core
//! host ◀──"OK" / "ERR busy"────────── Reply
//! host ◀──"DONE x" / "ERROR x torque"─ Report (exactly one per accepted command)
//! host ◀──"AXIS x state=Moving ..."─── telemetry, polled periodically
//! ```

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod command;
pub mod telemetry;

pub use command::{AxisName, Command, DispenseKind, MoveArgs, MoveMode, ParseError};
pub use telemetry::{AxisTelemetry, DispenseTelemetry, Line, Reply, Report};
