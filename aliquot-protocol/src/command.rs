//! Command parsing for the controller line protocol
//!
//! Lines are whitespace separated and keywords are case-insensitive:
//!
//! ```text
//! move <axis> abs|inc <target> <velocity> <accel> <torque%>
//! home <axis> <max_travel> <torque%>
//! abort <axis> | enable <axis> | disable <axis> | clear <axis>
//! inject <volume> <speed> <accel> <torque%>
//! purge <volume> <speed> <accel> <torque%>
//! pause | resume | cancel | status
//! ```

use core::str::{FromStr, SplitAsciiWhitespace};

use heapless::String;

/// Maximum axis name length
pub const MAX_AXIS_NAME_LEN: usize = 16;

/// Axis name as carried by a command
pub type AxisName = String<MAX_AXIS_NAME_LEN>;

/// Target interpretation for a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveMode {
    /// Target is an absolute position in axis units
    Absolute,
    /// Target is a distance from the current position
    Incremental,
}

/// Which dispense operation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispenseKind {
    /// Push material out through the nozzle
    Inject,
    /// Flush material to waste
    Purge,
}

impl DispenseKind {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            DispenseKind::Inject => "inject",
            DispenseKind::Purge => "purge",
        }
    }
}

/// Arguments of a move command
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MoveArgs {
    pub mode: MoveMode,
    /// Target position or distance (axis units)
    pub target: f32,
    /// Velocity (axis units per second)
    pub velocity: f32,
    /// Acceleration (axis units per second squared)
    pub accel: f32,
    /// Torque limit as a percentage of drive peak
    pub torque_percent: f32,
}

/// Commands accepted by the motion core
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Move an axis
    Move { axis: AxisName, args: MoveArgs },
    /// Run the homing sequence on an axis
    Home {
        axis: AxisName,
        max_travel: f32,
        torque_percent: f32,
    },
    /// Stop an axis immediately
    Abort { axis: AxisName },
    /// Energize an axis
    Enable { axis: AxisName },
    /// De-energize an axis
    Disable { axis: AxisName },
    /// Clear a latched axis fault
    ClearFault { axis: AxisName },
    /// Start a volume-targeted dispense
    Dispense {
        kind: DispenseKind,
        volume: f32,
        speed: f32,
        accel: f32,
        torque_percent: f32,
    },
    /// Pause the running dispense
    Pause,
    /// Resume a paused dispense
    Resume,
    /// Cancel the running or paused dispense
    Cancel,
    /// Request an immediate telemetry report
    Status,
}

/// Errors produced while parsing a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Line contained no tokens
    Empty,
    /// First token is not a known command
    UnknownCommand,
    /// Fewer arguments than the command needs
    MissingArgument,
    /// Argument is not a finite number
    InvalidNumber,
    /// Move mode is neither `abs` nor `inc`
    InvalidMode,
    /// Axis name exceeds [`MAX_AXIS_NAME_LEN`]
    NameTooLong,
    /// More arguments than the command takes
    TrailingArguments,
}

impl ParseError {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            ParseError::Empty => "empty",
            ParseError::UnknownCommand => "unknown_command",
            ParseError::MissingArgument => "missing_argument",
            ParseError::InvalidNumber => "invalid_number",
            ParseError::InvalidMode => "invalid_mode",
            ParseError::NameTooLong => "name_too_long",
            ParseError::TrailingArguments => "trailing_arguments",
        }
    }
}

impl Command {
    /// Parse one protocol line
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut args = Args::new(line);
        let keyword = args.inner.next().ok_or(ParseError::Empty)?;

        let command = if is(keyword, "move") {
            let axis = args.axis()?;
            let mode = args.mode()?;
            Command::Move {
                axis,
                args: MoveArgs {
                    mode,
                    target: args.number()?,
                    velocity: args.number()?,
                    accel: args.number()?,
                    torque_percent: args.number()?,
                },
            }
        } else if is(keyword, "home") {
            Command::Home {
                axis: args.axis()?,
                max_travel: args.number()?,
                torque_percent: args.number()?,
            }
        } else if is(keyword, "abort") {
            Command::Abort { axis: args.axis()? }
        } else if is(keyword, "enable") {
            Command::Enable { axis: args.axis()? }
        } else if is(keyword, "disable") {
            Command::Disable { axis: args.axis()? }
        } else if is(keyword, "clear") {
            Command::ClearFault { axis: args.axis()? }
        } else if is(keyword, "inject") {
            args.dispense(DispenseKind::Inject)?
        } else if is(keyword, "purge") {
            args.dispense(DispenseKind::Purge)?
        } else if is(keyword, "pause") {
            Command::Pause
        } else if is(keyword, "resume") {
            Command::Resume
        } else if is(keyword, "cancel") {
            Command::Cancel
        } else if is(keyword, "status") {
            Command::Status
        } else {
            return Err(ParseError::UnknownCommand);
        };

        args.finish()?;
        Ok(command)
    }

    /// Target axis name, for per-axis commands
    pub fn axis(&self) -> Option<&str> {
        match self {
            Command::Move { axis, .. }
            | Command::Home { axis, .. }
            | Command::Abort { axis }
            | Command::Enable { axis }
            | Command::Disable { axis }
            | Command::ClearFault { axis } => Some(axis.as_str()),
            _ => None,
        }
    }

    /// Check if this command starts motion that ends in a terminal report
    pub fn starts_operation(&self) -> bool {
        matches!(
            self,
            Command::Move { .. } | Command::Home { .. } | Command::Dispense { .. }
        )
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

fn is(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

/// Token cursor over one line
struct Args<'a> {
    inner: SplitAsciiWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            inner: line.split_ascii_whitespace(),
        }
    }

    fn word(&mut self) -> Result<&'a str, ParseError> {
        self.inner.next().ok_or(ParseError::MissingArgument)
    }

    fn number(&mut self) -> Result<f32, ParseError> {
        let value: f32 = self.word()?.parse().map_err(|_| ParseError::InvalidNumber)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ParseError::InvalidNumber)
        }
    }

    fn axis(&mut self) -> Result<AxisName, ParseError> {
        AxisName::try_from(self.word()?).map_err(|_| ParseError::NameTooLong)
    }

    fn mode(&mut self) -> Result<MoveMode, ParseError> {
        let word = self.word()?;
        if is(word, "abs") {
            Ok(MoveMode::Absolute)
        } else if is(word, "inc") {
            Ok(MoveMode::Incremental)
        } else {
            Err(ParseError::InvalidMode)
        }
    }

    fn dispense(&mut self, kind: DispenseKind) -> Result<Command, ParseError> {
        Ok(Command::Dispense {
            kind,
            volume: self.number()?,
            speed: self.number()?,
            accel: self.number()?,
            torque_percent: self.number()?,
        })
    }

    fn finish(mut self) -> Result<(), ParseError> {
        match self.inner.next() {
            Some(_) => Err(ParseError::TrailingArguments),
            None => Ok(()),
        }
    }
}
