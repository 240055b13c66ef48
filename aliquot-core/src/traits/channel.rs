//! Motor channel trait
//!
//! One channel is one motor with its own driver. An axis owns one or more
//! channels; a squared gantry drives two channels in lockstep.
//!
//! All positions are in increments (microsteps) relative to the logical
//! reference set by [`MotorChannel::set_zero`].

/// Trait for a position-controlled motor driver
///
/// Commands are fire-and-forget: the driver executes the move on its own
/// and the core polls the status getters once per tick.
pub trait MotorChannel {
    /// Start a relative move
    ///
    /// - `increments`: signed distance in increments
    /// - `velocity`: cruise speed in increments/s
    /// - `accel`: acceleration in increments/s²
    fn move_increments(&mut self, increments: i32, velocity: f32, accel: f32);

    /// Stop immediately without a deceleration ramp
    fn stop_abrupt(&mut self);

    /// Stop using the configured deceleration
    fn stop_decelerated(&mut self);

    /// Make the current position the logical zero
    fn set_zero(&mut self);

    /// Commanded position in increments
    fn position(&self) -> i32;

    /// Check if the channel is currently emitting steps
    fn is_stepping(&self) -> bool;

    /// Check if the driver reports a fault bit
    fn has_fault(&self) -> bool;

    /// Motor effort as a percentage of rated torque
    ///
    /// Returns None when the driver has no valid reading.
    fn effort_percent(&self) -> Option<f32>;

    /// Endstop switch state, None when no switch is wired
    fn endstop(&self) -> Option<bool> {
        None
    }

    /// Enable or disable the motor driver
    ///
    /// When disabled, the motor is free to rotate and does not hold position.
    fn set_enabled(&mut self, enabled: bool);

    /// Check if the motor is enabled
    fn is_enabled(&self) -> bool;

    /// Set the driver's own torque limit, percent
    ///
    /// Drives without a hardware limit rely on the core's torque monitor.
    fn set_torque_limit(&mut self, _percent: f32) {}
}
