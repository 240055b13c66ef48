//! Command rejections and fault kinds
//!
//! Rejections are synchronous: the command had no effect. Faults are
//! asynchronous: the motors have already been stopped by the time one is
//! reported.

/// Bad arguments or preconditions for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    /// Normal moves need a referenced axis
    NotHomed,
    /// Resulting target is outside the travel limits
    OutOfTravel,
    /// Non-finite or out-of-range argument
    InvalidArgument,
    /// Steps-per-volume factor is not positive
    InvalidStepsPerVolume,
    /// Axis channels are disabled
    AxisDisabled,
    /// No axis with the requested name
    UnknownAxis,
    /// Machine has no dispense axis configured
    NoDispenseAxis,
}

impl ValidationError {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationError::NotHomed => "not_homed",
            ValidationError::OutOfTravel => "out_of_travel",
            ValidationError::InvalidArgument => "invalid_argument",
            ValidationError::InvalidStepsPerVolume => "invalid_steps_per_volume",
            ValidationError::AxisDisabled => "axis_disabled",
            ValidationError::UnknownAxis => "unknown_axis",
            ValidationError::NoDispenseAxis => "no_dispense_axis",
        }
    }
}

/// Reasons a command is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Arguments or preconditions are wrong
    Validation(ValidationError),
    /// Axis or operation is not Standby/Idle
    Busy,
    /// Axis has a latched fault that must be cleared first
    Faulted,
    /// Operation is not in a phase that accepts this request
    WrongPhase,
}

impl CommandError {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            CommandError::Validation(e) => e.as_str(),
            CommandError::Busy => "busy",
            CommandError::Faulted => "faulted",
            CommandError::WrongPhase => "wrong_phase",
        }
    }
}

impl From<ValidationError> for CommandError {
    fn from(e: ValidationError) -> Self {
        CommandError::Validation(e)
    }
}

/// Which deadline expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutKind {
    /// A normal move never started stepping
    MoveStart,
    /// A homing phase move never started stepping
    HomingStart,
    /// The whole homing session took too long
    HomingSession,
}

/// Ways the homing sequence can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingFailure {
    /// Search move finished without finding the hard stop or sensor
    StopNotReached,
    /// Torque limit hit where no stall was expected
    UnexpectedStall,
    /// Endstop asserted on an axis that homes against a hard stop
    UnexpectedSensor,
    /// Endstop still asserted after backing off
    SensorStuck,
}

/// Faults reported as terminal events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Torque limit exceeded while stepping
    MotionTorque,
    /// Homing sequence failed
    HomingFailure(HomingFailure),
    /// Deadline expired
    Timeout(TimeoutKind),
    /// Drive reported a fault bit
    Hardware,
}

impl FaultKind {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::MotionTorque => "motion_torque",
            FaultKind::HomingFailure(HomingFailure::StopNotReached) => "homing_stop_not_reached",
            FaultKind::HomingFailure(HomingFailure::UnexpectedStall) => "homing_unexpected_stall",
            FaultKind::HomingFailure(HomingFailure::UnexpectedSensor) => "homing_unexpected_sensor",
            FaultKind::HomingFailure(HomingFailure::SensorStuck) => "homing_sensor_stuck",
            FaultKind::Timeout(TimeoutKind::MoveStart) => "timeout_move_start",
            FaultKind::Timeout(TimeoutKind::HomingStart) => "timeout_homing_start",
            FaultKind::Timeout(TimeoutKind::HomingSession) => "timeout_homing_session",
            FaultKind::Hardware => "hardware_fault",
        }
    }

    /// Check if this fault leaves the axis latched in Fault
    pub fn latches(self) -> bool {
        matches!(
            self,
            FaultKind::Hardware | FaultKind::Timeout(TimeoutKind::MoveStart)
        )
    }
}
