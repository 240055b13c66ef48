//! Machine configuration
//!
//! Root of the configuration tree, validated once at startup. Stored as
//! postcard binary data with a leading version number.

use heapless::Vec;

use super::types::{AxisConfig, DispenseConfig, MAX_AXES, MAX_AXIS_CHANNELS};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Current configuration format version
pub const CONFIG_VERSION: u8 = 1;

/// Configuration validation and persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No axes configured
    NoAxes,
    /// More axes than the controller supports
    TooManyAxes,
    /// Two axes share a name
    DuplicateAxis,
    /// Axis has an empty name
    EmptyName,
    /// Channel count is zero or above the supported maximum
    InvalidChannelCount,
    /// Steps per unit is not a positive number
    InvalidStepsPerUnit,
    /// Travel minimum is not below the maximum
    InvalidTravelLimits,
    /// Torque smoothing factor outside (0, 1]
    InvalidTorqueAlpha,
    /// Homing speeds, distances or timeouts are unusable
    InvalidHoming,
    /// A timeout or interval is zero
    InvalidTiming,
    /// Dispense axis is not one of the configured axes
    UnknownDispenseAxis,
    /// Steps per volume is not a positive number
    InvalidStepsPerVolume,
    /// Stored config has a different format version
    VersionMismatch,
    /// Buffer too small or encoding failed
    Serialize,
    /// Stored bytes could not be decoded
    Deserialize,
}

impl ConfigError {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigError::NoAxes => "no axes configured",
            ConfigError::TooManyAxes => "too many axes",
            ConfigError::DuplicateAxis => "duplicate axis name",
            ConfigError::EmptyName => "empty axis name",
            ConfigError::InvalidChannelCount => "invalid channel count",
            ConfigError::InvalidStepsPerUnit => "invalid steps per unit",
            ConfigError::InvalidTravelLimits => "invalid travel limits",
            ConfigError::InvalidTorqueAlpha => "invalid torque smoothing factor",
            ConfigError::InvalidHoming => "invalid homing parameters",
            ConfigError::InvalidTiming => "invalid timing",
            ConfigError::UnknownDispenseAxis => "unknown dispense axis",
            ConfigError::InvalidStepsPerVolume => "invalid steps per volume",
            ConfigError::VersionMismatch => "config version mismatch",
            ConfigError::Serialize => "serialize failed",
            ConfigError::Deserialize => "deserialize failed",
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete machine configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MachineConfig {
    /// Config format version
    pub version: u8,
    pub axes: Vec<AxisConfig, MAX_AXES>,
    /// Dispense operations, if this machine has an injector
    pub dispense: Option<DispenseConfig>,
    /// Status poll interval (ms)
    pub telemetry_interval_ms: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            axes: Vec::new(),
            dispense: None,
            telemetry_interval_ms: 250,
        }
    }
}

/// Treats NaN as not positive
fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl MachineConfig {
    /// Find an axis index by name
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.name.as_str() == name)
    }

    /// Check the whole tree for values the controller cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes.is_empty() {
            return Err(ConfigError::NoAxes);
        }
        if self.telemetry_interval_ms == 0 {
            return Err(ConfigError::InvalidTiming);
        }

        for (i, axis) in self.axes.iter().enumerate() {
            if axis.name.is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if self.axes[..i].iter().any(|a| a.name == axis.name) {
                return Err(ConfigError::DuplicateAxis);
            }
            validate_axis(axis)?;
        }

        if let Some(dispense) = &self.dispense {
            if self.axis_index(&dispense.axis).is_none() {
                return Err(ConfigError::UnknownDispenseAxis);
            }
            if !positive(dispense.steps_per_volume) {
                return Err(ConfigError::InvalidStepsPerVolume);
            }
        }

        Ok(())
    }

    /// Serialize to postcard bytes, returning the used length
    #[cfg(feature = "serde")]
    pub fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, ConfigError> {
        postcard::to_slice(self, buf)
            .map(|used| used.len())
            .map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize from postcard bytes and validate
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: MachineConfig =
            postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;

        if config.version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch);
        }

        config.validate()?;
        Ok(config)
    }
}

fn validate_axis(axis: &AxisConfig) -> Result<(), ConfigError> {
    if axis.channels == 0 || axis.channels as usize > MAX_AXIS_CHANNELS {
        return Err(ConfigError::InvalidChannelCount);
    }
    if !positive(axis.steps_per_unit) {
        return Err(ConfigError::InvalidStepsPerUnit);
    }
    if !(axis.travel_min.is_finite() && axis.travel_max.is_finite())
        || axis.travel_min >= axis.travel_max
    {
        return Err(ConfigError::InvalidTravelLimits);
    }
    if !(positive(axis.torque_alpha) && axis.torque_alpha <= 1.0) {
        return Err(ConfigError::InvalidTorqueAlpha);
    }
    if axis.start_timeout_ms == 0 {
        return Err(ConfigError::InvalidTiming);
    }

    let homing = &axis.homing;
    let speeds_ok = positive(homing.rapid_speed)
        && positive(homing.backoff_speed)
        && positive(homing.slow_speed)
        && positive(homing.accel);
    let distances_ok = positive(homing.backoff_distance)
        && positive(homing.offset_distance)
        && positive(homing.slow_search_distance)
        && homing.slow_search_distance > homing.backoff_distance;
    if !(speeds_ok && distances_ok) {
        return Err(ConfigError::InvalidHoming);
    }
    if homing.start_timeout_ms == 0 || homing.timeout_ms == 0 {
        return Err(ConfigError::InvalidTiming);
    }

    Ok(())
}
