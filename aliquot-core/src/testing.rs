//! Scriptable motor channel for unit tests
//!
//! The mock never moves on its own; tests drive position, stepping and
//! effort directly between controller updates.

use crate::traits::MotorChannel;

#[derive(Debug, Clone)]
pub struct MockChannel {
    pub position: i32,
    pub target: i32,
    pub stepping: bool,
    pub fault: bool,
    pub effort: Option<f32>,
    pub endstop: Option<bool>,
    pub enabled: bool,
    pub torque_limit: Option<f32>,
    /// Last commanded (increments, velocity, accel)
    pub last_move: Option<(i32, f32, f32)>,
    pub moves: usize,
    pub abrupt_stops: usize,
    pub decel_stops: usize,
    /// Begin stepping as soon as a non-zero move is issued
    pub auto_start: bool,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self {
            position: 0,
            target: 0,
            stepping: false,
            fault: false,
            effort: Some(0.0),
            endstop: None,
            enabled: true,
            torque_limit: None,
            last_move: None,
            moves: 0,
            abrupt_stops: 0,
            decel_stops: 0,
            auto_start: true,
        }
    }
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to the commanded target and stop stepping
    pub fn finish(&mut self) {
        self.position = self.target;
        self.stepping = false;
    }

    /// Move part of the way towards the target
    pub fn advance(&mut self, increments: i32) {
        let remaining = self.target - self.position;
        let step = increments.min(remaining.abs());
        self.position += step * remaining.signum();
    }

    /// Stop where the channel currently is
    pub fn halt(&mut self) {
        self.target = self.position;
        self.stepping = false;
    }
}

impl MotorChannel for MockChannel {
    fn move_increments(&mut self, increments: i32, velocity: f32, accel: f32) {
        self.moves += 1;
        self.last_move = Some((increments, velocity, accel));
        self.target = self.position + increments;
        if increments != 0 && self.auto_start {
            self.stepping = true;
        }
    }

    fn stop_abrupt(&mut self) {
        self.abrupt_stops += 1;
        self.halt();
    }

    fn stop_decelerated(&mut self) {
        // Keeps stepping until the test calls finish() or halt()
        self.decel_stops += 1;
        self.target = self.position;
    }

    fn set_zero(&mut self) {
        self.target -= self.position;
        self.position = 0;
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn is_stepping(&self) -> bool {
        self.stepping
    }

    fn has_fault(&self) -> bool {
        self.fault
    }

    fn effort_percent(&self) -> Option<f32> {
        self.effort
    }

    fn endstop(&self) -> Option<bool> {
        self.endstop
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_torque_limit(&mut self, percent: f32) {
        self.torque_limit = Some(percent);
    }
}
