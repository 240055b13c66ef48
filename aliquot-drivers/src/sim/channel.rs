//! Simulated stepper channel
//!
//! Two positions are tracked, both in increments:
//!
//! - the step counter, which advances with every emitted step and is what
//!   the drive reports as its position
//! - the mechanical position, which follows the step counter but cannot
//!   pass a hard stop
//!
//! Steps emitted while pressed against a hard stop are lost, as with a
//! real stalled stepper. Effort reads the stall value while that happens.

use aliquot_core::traits::MotorChannel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mechanics of one simulated channel
///
/// Positions are mechanical increments from the power-on position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Lower hard stop
    pub hard_stop_min: Option<i32>,
    /// Upper hard stop
    pub hard_stop_max: Option<i32>,
    /// Endstop asserted at or below this position
    pub endstop_min: Option<i32>,
    /// Endstop asserted at or above this position
    pub endstop_max: Option<i32>,
    /// Effort while stepping freely, percent
    pub base_effort: f32,
    /// Effort while pushing against a hard stop, percent
    pub stall_effort: f32,
    /// Delay between a move command and the first step (ms)
    pub start_delay_ms: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hard_stop_min: None,
            hard_stop_max: None,
            endstop_min: None,
            endstop_max: None,
            base_effort: 10.0,
            stall_effort: 95.0,
            start_delay_ms: 0,
        }
    }
}

/// Simulated motor channel
#[derive(Debug, Clone)]
pub struct SimChannel {
    config: SimConfig,
    /// Emitted step counter
    steps: f32,
    /// Mechanical position
    mechanical: f32,
    /// Step counter value at the logical zero
    zero: i32,
    /// Step counter target of the current move
    target: f32,
    /// Cruise speed, increments/s
    velocity: f32,
    /// Increments/s²
    accel: f32,
    stepping: bool,
    /// Move accepted, waiting out the start delay
    start_pending_ms: Option<u32>,
    /// Pressed against a hard stop during the last advance
    blocked: bool,
    enabled: bool,
    fault: bool,
    effort_override: Option<f32>,
    effort_invalid: bool,
    torque_limit: f32,
}

impl SimChannel {
    pub fn new(config: SimConfig) -> Self {
        Self::at(config, 0)
    }

    /// Create a channel resting at a mechanical position
    pub fn at(config: SimConfig, position: i32) -> Self {
        Self {
            config,
            steps: position as f32,
            mechanical: position as f32,
            zero: 0,
            target: position as f32,
            velocity: 0.0,
            accel: 0.0,
            stepping: false,
            start_pending_ms: None,
            blocked: false,
            enabled: true,
            fault: false,
            effort_override: None,
            effort_invalid: false,
            torque_limit: 100.0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Mechanical position in increments
    pub fn mechanical_position(&self) -> i32 {
        libm::roundf(self.mechanical) as i32
    }

    /// Last torque limit set by the controller
    pub fn torque_limit(&self) -> f32 {
        self.torque_limit
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Inject or clear a driver fault bit
    pub fn set_fault(&mut self, fault: bool) {
        self.fault = fault;
    }

    /// Force the effort reading, None to return to the load model
    pub fn set_effort_override(&mut self, effort: Option<f32>) {
        self.effort_override = effort;
    }

    /// Make the drive report no valid effort reading
    pub fn set_effort_invalid(&mut self, invalid: bool) {
        self.effort_invalid = invalid;
    }

    /// Let `dt_ms` milliseconds of motion happen
    pub fn advance(&mut self, dt_ms: u32) {
        self.blocked = false;

        let mut dt_ms = dt_ms;
        if let Some(delay) = self.start_pending_ms {
            if delay > dt_ms {
                self.start_pending_ms = Some(delay - dt_ms);
                return;
            }
            self.start_pending_ms = None;
            self.stepping = true;
            dt_ms -= delay;
        }

        if !self.stepping {
            return;
        }

        let remaining = self.target - self.steps;
        let travel = self.velocity * dt_ms as f32 / 1000.0;
        let arrives = libm::fabsf(remaining) <= travel;
        let delta = if arrives {
            remaining
        } else {
            libm::copysignf(travel, remaining)
        };

        self.mechanical = self.clamp_to_stops(self.mechanical + delta);
        if arrives {
            self.steps = self.target;
            self.stepping = false;
        } else {
            self.steps += delta;
        }
    }

    fn clamp_to_stops(&mut self, position: f32) -> f32 {
        let mut clamped = position;
        if let Some(min) = self.config.hard_stop_min {
            if clamped < min as f32 {
                clamped = min as f32;
                self.blocked = true;
            }
        }
        if let Some(max) = self.config.hard_stop_max {
            if clamped > max as f32 {
                clamped = max as f32;
                self.blocked = true;
            }
        }
        clamped
    }
}

impl MotorChannel for SimChannel {
    fn move_increments(&mut self, increments: i32, velocity: f32, accel: f32) {
        self.target = self.steps + increments as f32;
        self.velocity = libm::fabsf(velocity);
        self.accel = libm::fabsf(accel);
        self.stepping = false;
        self.start_pending_ms = None;

        if increments == 0 || !self.enabled || self.fault {
            self.target = self.steps;
            return;
        }

        if self.config.start_delay_ms == 0 {
            self.stepping = true;
        } else {
            self.start_pending_ms = Some(self.config.start_delay_ms);
        }
    }

    fn stop_abrupt(&mut self) {
        self.target = self.steps;
        self.stepping = false;
        self.start_pending_ms = None;
        self.blocked = false;
    }

    fn stop_decelerated(&mut self) {
        if self.start_pending_ms.take().is_some() {
            self.target = self.steps;
            return;
        }
        if !self.stepping {
            return;
        }
        // Braking distance at constant deceleration: v² / 2a
        let remaining = self.target - self.steps;
        let braking = if self.accel > 0.0 {
            self.velocity * self.velocity / (2.0 * self.accel)
        } else {
            0.0
        };
        if braking < libm::fabsf(remaining) {
            self.target = self.steps + libm::copysignf(libm::roundf(braking), remaining);
        }
        if self.target == self.steps {
            self.stepping = false;
        }
    }

    fn set_zero(&mut self) {
        self.zero = libm::roundf(self.steps) as i32;
    }

    fn position(&self) -> i32 {
        libm::roundf(self.steps) as i32 - self.zero
    }

    fn is_stepping(&self) -> bool {
        self.stepping
    }

    fn has_fault(&self) -> bool {
        self.fault
    }

    fn effort_percent(&self) -> Option<f32> {
        if self.effort_invalid {
            return None;
        }
        if let Some(effort) = self.effort_override {
            return Some(effort);
        }
        let effort = if !self.enabled {
            0.0
        } else if self.blocked {
            self.config.stall_effort
        } else if self.stepping {
            self.config.base_effort
        } else {
            0.0
        };
        Some(effort)
    }

    fn endstop(&self) -> Option<bool> {
        if self.config.endstop_min.is_none() && self.config.endstop_max.is_none() {
            return None;
        }
        let position = self.mechanical_position();
        let low = self.config.endstop_min.map_or(false, |at| position <= at);
        let high = self.config.endstop_max.map_or(false, |at| position >= at);
        Some(low || high)
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stop_abrupt();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_torque_limit(&mut self, percent: f32) {
        self.torque_limit = percent;
    }
}
