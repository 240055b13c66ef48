//! Homing sequence definition
//!
//! The sequence is four legs, each a Start / WaitStart / Moving triple:
//!
//! ```text
//! RapidSearch ──▶ Backoff ──▶ SlowSearch ──▶ SetOffset ──▶ SetZero ──▶ [Destress]
//!  (to stop)      (away)      (to stop)       (away)
//! ```
//!
//! Search legs end when every channel has signaled the reference. Retreat
//! legs end when the move completes.

use crate::config::{HomingConfig, MAX_AXIS_CHANNELS};

/// One leg of the homing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Leg {
    RapidSearch,
    Backoff,
    SlowSearch,
    SetOffset,
}

/// Progress within a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// Move not yet issued
    Start,
    /// Move issued, waiting for stepping
    WaitStart,
    /// Move in progress
    Moving,
}

impl Leg {
    /// Check if this leg travels towards the reference
    pub fn is_search(self) -> bool {
        matches!(self, Leg::RapidSearch | Leg::SlowSearch)
    }

    /// Following leg, None after the offset move
    pub fn next(self) -> Option<Leg> {
        match self {
            Leg::RapidSearch => Some(Leg::Backoff),
            Leg::Backoff => Some(Leg::SlowSearch),
            Leg::SlowSearch => Some(Leg::SetOffset),
            Leg::SetOffset => None,
        }
    }

    /// Distance and speed of this leg's move (units, units/s)
    pub fn motion(self, config: &HomingConfig, max_travel: f32) -> (f32, f32) {
        match self {
            Leg::RapidSearch => (max_travel, config.rapid_speed),
            Leg::Backoff => (config.backoff_distance, config.backoff_speed),
            Leg::SlowSearch => (config.slow_search_distance, config.slow_speed),
            Leg::SetOffset => (config.offset_distance, config.backoff_speed),
        }
    }

    /// Phase for a stage of this leg
    pub fn phase(self, stage: Stage) -> HomingPhase {
        use HomingPhase::*;
        match (self, stage) {
            (Leg::RapidSearch, Stage::Start) => RapidSearchStart,
            (Leg::RapidSearch, Stage::WaitStart) => RapidSearchWaitStart,
            (Leg::RapidSearch, Stage::Moving) => RapidSearchMoving,
            (Leg::Backoff, Stage::Start) => BackoffStart,
            (Leg::Backoff, Stage::WaitStart) => BackoffWaitStart,
            (Leg::Backoff, Stage::Moving) => BackoffMoving,
            (Leg::SlowSearch, Stage::Start) => SlowSearchStart,
            (Leg::SlowSearch, Stage::WaitStart) => SlowSearchWaitStart,
            (Leg::SlowSearch, Stage::Moving) => SlowSearchMoving,
            (Leg::SetOffset, Stage::Start) => SetOffsetStart,
            (Leg::SetOffset, Stage::WaitStart) => SetOffsetWaitStart,
            (Leg::SetOffset, Stage::Moving) => SetOffsetMoving,
        }
    }
}

/// Homing phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingPhase {
    RapidSearchStart,
    RapidSearchWaitStart,
    RapidSearchMoving,
    BackoffStart,
    BackoffWaitStart,
    BackoffMoving,
    SlowSearchStart,
    SlowSearchWaitStart,
    SlowSearchMoving,
    SetOffsetStart,
    SetOffsetWaitStart,
    SetOffsetMoving,
    /// Zero all channels at the offset position
    SetZero,
    /// Drives released after zeroing until the deadline
    Destress { until_ms: u64 },
}

impl HomingPhase {
    /// Split into leg and stage, None for the closing phases
    pub fn leg_stage(self) -> Option<(Leg, Stage)> {
        use HomingPhase::*;
        let split = match self {
            RapidSearchStart => (Leg::RapidSearch, Stage::Start),
            RapidSearchWaitStart => (Leg::RapidSearch, Stage::WaitStart),
            RapidSearchMoving => (Leg::RapidSearch, Stage::Moving),
            BackoffStart => (Leg::Backoff, Stage::Start),
            BackoffWaitStart => (Leg::Backoff, Stage::WaitStart),
            BackoffMoving => (Leg::Backoff, Stage::Moving),
            SlowSearchStart => (Leg::SlowSearch, Stage::Start),
            SlowSearchWaitStart => (Leg::SlowSearch, Stage::WaitStart),
            SlowSearchMoving => (Leg::SlowSearch, Stage::Moving),
            SetOffsetStart => (Leg::SetOffset, Stage::Start),
            SetOffsetWaitStart => (Leg::SetOffset, Stage::WaitStart),
            SetOffsetMoving => (Leg::SetOffset, Stage::Moving),
            SetZero | Destress { .. } => return None,
        };
        Some(split)
    }

    /// Phase name for telemetry
    pub fn name(self) -> &'static str {
        use HomingPhase::*;
        match self {
            RapidSearchStart => "RapidSearchStart",
            RapidSearchWaitStart => "RapidSearchWaitStart",
            RapidSearchMoving => "RapidSearchMoving",
            BackoffStart => "BackoffStart",
            BackoffWaitStart => "BackoffWaitStart",
            BackoffMoving => "BackoffMoving",
            SlowSearchStart => "SlowSearchStart",
            SlowSearchWaitStart => "SlowSearchWaitStart",
            SlowSearchMoving => "SlowSearchMoving",
            SetOffsetStart => "SetOffsetStart",
            SetOffsetWaitStart => "SetOffsetWaitStart",
            SetOffsetMoving => "SetOffsetMoving",
            SetZero => "SetZero",
            Destress { .. } => "Destress",
        }
    }

    /// Phase that follows a completed leg
    pub fn after(leg: Leg) -> HomingPhase {
        match leg.next() {
            Some(next) => next.phase(Stage::Start),
            None => HomingPhase::SetZero,
        }
    }
}

/// State of one homing run
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HomingSession {
    pub phase: HomingPhase,
    /// Speeds, distances and deadlines captured at session start
    pub config: HomingConfig,
    /// Travel limit of the rapid search (units)
    pub max_travel: f32,
    pub torque_percent: f32,
    /// Channels that have signaled the reference in the current search leg
    pub hits: [bool; MAX_AXIS_CHANNELS],
    pub started_ms: u64,
    pub phase_started_ms: u64,
}

impl HomingSession {
    pub fn new(config: HomingConfig, max_travel: f32, torque_percent: f32, now_ms: u64) -> Self {
        Self {
            phase: HomingPhase::RapidSearchStart,
            config,
            max_travel,
            torque_percent,
            hits: [false; MAX_AXIS_CHANNELS],
            started_ms: now_ms,
            phase_started_ms: now_ms,
        }
    }

    /// Move to a new phase
    pub fn enter(&mut self, phase: HomingPhase, now_ms: u64) {
        self.phase = phase;
        self.phase_started_ms = now_ms;
    }

    /// Time since the session started
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }

    /// Time since the current phase was entered
    pub fn phase_elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.phase_started_ms)
    }

    /// Check if the first `count` channels have all signaled
    pub fn all_hit(&self, count: usize) -> bool {
        self.hits[..count.min(MAX_AXIS_CHANNELS)].iter().all(|h| *h)
    }
}
