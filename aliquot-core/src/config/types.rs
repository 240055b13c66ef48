//! Configuration type definitions
//!
//! Per-axis motion, homing and dispense parameters. Distances are in axis
//! units (mm for a gantry, ml-equivalent travel for an injector), speeds in
//! units per second and accelerations in units per second squared.

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum label length
pub const MAX_LABEL_LEN: usize = 16;

/// Maximum axes per machine
pub const MAX_AXES: usize = 4;

/// Maximum motor channels per axis
pub const MAX_AXIS_CHANNELS: usize = 4;

/// How the homing reference is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HomingMode {
    /// Drive into a hard stop until the torque limit trips
    #[default]
    Torque,
    /// Drive until the channel's endstop asserts
    Sensor,
}

/// Direction of travel along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Direction {
    #[default]
    Negative,
    Positive,
}

impl Direction {
    /// Sign multiplier for distances
    pub fn sign(self) -> f32 {
        match self {
            Direction::Negative => -1.0,
            Direction::Positive => 1.0,
        }
    }
}

/// Homing sequence parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HomingConfig {
    pub mode: HomingMode,
    /// Direction towards the reference
    pub direction: Direction,
    /// Speed of the first, long search
    pub rapid_speed: f32,
    /// Speed of backoff and offset moves
    pub backoff_speed: f32,
    /// Speed of the precise re-approach
    pub slow_speed: f32,
    /// Acceleration for every homing move
    pub accel: f32,
    /// Distance to retreat after the rapid search
    pub backoff_distance: f32,
    /// Maximum travel of the slow re-approach
    ///
    /// Must exceed `backoff_distance` so the stop is reached again.
    pub slow_search_distance: f32,
    /// Distance from the reference to the zero position
    pub offset_distance: f32,
    /// Deadline for each phase move to start stepping (ms)
    pub start_timeout_ms: u32,
    /// Deadline for the whole sequence (ms)
    pub timeout_ms: u32,
    /// Time to hold the drives disabled after zeroing (ms), 0 to skip
    pub destress_ms: u32,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            mode: HomingMode::Torque,
            direction: Direction::Negative,
            rapid_speed: 20.0,
            backoff_speed: 10.0,
            slow_speed: 2.0,
            accel: 200.0,
            backoff_distance: 5.0,
            slow_search_distance: 10.0,
            offset_distance: 5.0,
            start_timeout_ms: 500,
            timeout_ms: 60_000,
            destress_ms: 0,
        }
    }
}

/// Axis configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AxisConfig {
    /// Axis name used by the command protocol
    pub name: String<MAX_LABEL_LEN>,
    /// Number of motor channels driving this axis (2 for a squared gantry)
    pub channels: u8,
    /// Motor increments per axis unit
    pub steps_per_unit: f32,
    /// Lower travel limit (units)
    pub travel_min: f32,
    /// Upper travel limit (units)
    pub travel_max: f32,
    /// Deadline for a normal move to start stepping (ms)
    pub start_timeout_ms: u32,
    /// Smoothing factor for the torque telemetry (0, 1]
    pub torque_alpha: f32,
    pub homing: HomingConfig,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            channels: 1,
            steps_per_unit: 200.0,
            travel_min: 0.0,
            travel_max: 400.0,
            start_timeout_ms: 500,
            torque_alpha: 0.2,
            homing: HomingConfig::default(),
        }
    }
}

impl AxisConfig {
    /// Create a config with defaults and the given name
    ///
    /// Names longer than [`MAX_LABEL_LEN`] are truncated.
    pub fn named(name: &str) -> Self {
        let mut label = String::new();
        for c in name.chars() {
            if label.push(c).is_err() {
                break;
            }
        }
        Self {
            name: label,
            ..Self::default()
        }
    }

    /// Check if a position lies within the travel limits
    pub fn within_travel(&self, position: f32) -> bool {
        position >= self.travel_min && position <= self.travel_max
    }
}

/// How a cancelled dispense updates the last completed volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CancelAccounting {
    /// Cancelled operations report zero
    #[default]
    ReportZero,
    /// Cancelled operations report what was actually dispensed
    ReportDispensed,
}

/// Dispense configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispenseConfig {
    /// Name of the axis driving the plunger
    pub axis: String<MAX_LABEL_LEN>,
    /// Motor increments per unit of volume
    pub steps_per_volume: f32,
    /// Plunger direction that injects
    pub inject_direction: Direction,
    pub cancel_accounting: CancelAccounting,
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            axis: String::new(),
            steps_per_volume: 800.0,
            inject_direction: Direction::Positive,
            cancel_accounting: CancelAccounting::ReportZero,
        }
    }
}
