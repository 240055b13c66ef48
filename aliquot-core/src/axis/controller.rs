//! Axis controller
//!
//! Owns the motor channels of one axis and runs its move and homing state
//! machine. Commands are non-blocking: they validate, issue motion to the
//! channels and return. [`AxisController::update`] must be called every
//! tick and yields at most one terminal event.

use heapless::Vec;

use aliquot_protocol::{AxisTelemetry, MoveArgs, MoveMode};

use super::homing::{HomingPhase, HomingSession, Leg, Stage};
use super::state::{AxisEvent, AxisState};
use crate::config::{AxisConfig, ConfigError, HomingMode, MAX_AXIS_CHANNELS};
use crate::error::{CommandError, FaultKind, HomingFailure, TimeoutKind, ValidationError};
use crate::torque::TorqueMonitor;
use crate::traits::MotorChannel;

/// Result of one homing step
enum HomingStep {
    Continue,
    Fail(FaultKind),
    Complete,
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Torque limits are percentages in (0, 100]
fn valid_torque(percent: f32) -> bool {
    positive(percent) && percent <= 100.0
}

/// Controller for one axis
pub struct AxisController<C: MotorChannel> {
    config: AxisConfig,
    channels: Vec<C, MAX_AXIS_CHANNELS>,
    state: AxisState,
    homed: bool,
    /// Active torque limit, percent
    torque_limit: f32,
    monitor: TorqueMonitor,
    /// Channel positions when the current move was issued
    origins: [i32; MAX_AXIS_CHANNELS],
    /// A decelerated stop was requested for the current move
    stop_requested: bool,
    /// Event to report on the next update
    pending: Option<AxisEvent>,
}

impl<C: MotorChannel> AxisController<C> {
    /// Create a controller owning `channels`
    ///
    /// The channel count must match the config.
    pub fn new(config: AxisConfig, channels: Vec<C, MAX_AXIS_CHANNELS>) -> Result<Self, ConfigError> {
        if channels.is_empty() || channels.len() != config.channels as usize {
            return Err(ConfigError::InvalidChannelCount);
        }
        let monitor = TorqueMonitor::new(channels.len(), config.torque_alpha);
        Ok(Self {
            config,
            channels,
            state: AxisState::Standby,
            homed: false,
            torque_limit: 100.0,
            monitor,
            origins: [0; MAX_AXIS_CHANNELS],
            stop_requested: false,
            pending: None,
        })
    }

    pub fn name(&self) -> &str {
        self.config.name.as_str()
    }

    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    pub fn state(&self) -> &AxisState {
        &self.state
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&C> {
        self.channels.get(index)
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut C> {
        self.channels.get_mut(index)
    }

    /// Mutable access for the hardware integration
    pub fn channels_mut(&mut self) -> &mut [C] {
        &mut self.channels
    }

    /// Reference position in increments (first channel)
    pub fn position_increments(&self) -> i32 {
        self.channels.first().map_or(0, |ch| ch.position())
    }

    /// Reference position in axis units
    pub fn position(&self) -> f32 {
        self.position_increments() as f32 / self.config.steps_per_unit
    }

    /// Reference position when the current move was issued
    pub fn move_origin(&self) -> i32 {
        self.origins[0]
    }

    /// Smoothed effort of a channel, percent
    pub fn smoothed_torque(&self, channel: usize) -> Option<f32> {
        self.monitor.smoothed(channel)
    }

    /// Smoothed effort of every channel, zero before the first reading
    pub fn torque_readings(&self) -> Vec<f32, MAX_AXIS_CHANNELS> {
        (0..self.channels.len())
            .map(|i| self.monitor.smoothed(i).unwrap_or(0.0))
            .collect()
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Homing phase name while homing
    pub fn phase_name(&self) -> Option<&'static str> {
        match &self.state {
            AxisState::Homing(session) => Some(session.phase.name()),
            _ => None,
        }
    }

    /// Status snapshot, `torque` from [`Self::torque_readings`]
    pub fn telemetry<'a>(&'a self, torque: &'a [f32]) -> AxisTelemetry<'a> {
        AxisTelemetry {
            name: self.name(),
            state: self.state_name(),
            phase: self.phase_name(),
            homed: self.homed,
            position: self.position(),
            torque,
        }
    }

    fn check_ready(&self) -> Result<(), CommandError> {
        match self.state {
            AxisState::Standby => Ok(()),
            AxisState::Fault(_) => Err(CommandError::Faulted),
            _ => Err(CommandError::Busy),
        }
    }

    fn check_enabled(&self) -> Result<(), ValidationError> {
        if self.channels.iter().all(|ch| ch.is_enabled()) {
            Ok(())
        } else {
            Err(ValidationError::AxisDisabled)
        }
    }

    fn increment_limits(&self) -> (i32, i32) {
        let spu = self.config.steps_per_unit;
        (
            libm::roundf(self.config.travel_min * spu) as i32,
            libm::roundf(self.config.travel_max * spu) as i32,
        )
    }

    /// Start a normal move
    ///
    /// Requires Standby, enabled channels and a homed axis. Velocity and
    /// acceleration are in axis units.
    pub fn move_to(&mut self, args: &MoveArgs, now_ms: u64) -> Result<(), CommandError> {
        self.check_ready()?;
        if !(args.target.is_finite()
            && positive(args.velocity)
            && positive(args.accel)
            && valid_torque(args.torque_percent))
        {
            return Err(ValidationError::InvalidArgument.into());
        }
        self.check_enabled()?;
        if !self.homed {
            return Err(ValidationError::NotHomed.into());
        }

        let spu = self.config.steps_per_unit;
        let current = self.position_increments();
        let target = match args.mode {
            MoveMode::Absolute => args.target,
            MoveMode::Incremental => self.position() + args.target,
        };
        if !self.config.within_travel(target) {
            return Err(ValidationError::OutOfTravel.into());
        }

        let increments = match args.mode {
            MoveMode::Absolute => (libm::roundf(args.target * spu) as i32).saturating_sub(current),
            MoveMode::Incremental => libm::roundf(args.target * spu) as i32,
        };

        self.issue(
            increments,
            args.velocity * spu,
            args.accel * spu,
            args.torque_percent,
            now_ms,
        );
        Ok(())
    }

    /// Start a relative move given in increments
    ///
    /// Same preconditions as [`Self::move_to`], with velocity in
    /// increments/s and acceleration in increments/s².
    pub fn move_increments(
        &mut self,
        increments: i32,
        velocity: f32,
        accel: f32,
        torque_percent: f32,
        now_ms: u64,
    ) -> Result<(), CommandError> {
        self.check_ready()?;
        if !(positive(velocity) && positive(accel) && valid_torque(torque_percent)) {
            return Err(ValidationError::InvalidArgument.into());
        }
        self.check_enabled()?;
        if !self.homed {
            return Err(ValidationError::NotHomed.into());
        }

        let (min, max) = self.increment_limits();
        let target = self.position_increments().saturating_add(increments);
        if target < min || target > max {
            return Err(ValidationError::OutOfTravel.into());
        }

        self.issue(increments, velocity, accel, torque_percent, now_ms);
        Ok(())
    }

    fn issue(&mut self, increments: i32, velocity: f32, accel: f32, torque: f32, now_ms: u64) {
        self.apply_torque_limit(torque);
        self.monitor.reset();
        self.stop_requested = false;
        self.record_origins();

        if increments == 0 {
            self.pending = Some(AxisEvent::Done);
            return;
        }

        for ch in self.channels.iter_mut() {
            ch.move_increments(increments, velocity, accel);
        }
        self.state = AxisState::StartingMove { since_ms: now_ms };
    }

    fn apply_torque_limit(&mut self, percent: f32) {
        self.torque_limit = percent;
        for ch in self.channels.iter_mut() {
            ch.set_torque_limit(percent);
        }
    }

    fn record_origins(&mut self) {
        for (origin, ch) in self.origins.iter_mut().zip(self.channels.iter()) {
            *origin = ch.position();
        }
    }

    /// Any channel stepping, or moved since the move was issued
    fn motion_started(&self) -> bool {
        self.channels
            .iter()
            .zip(self.origins.iter())
            .any(|(ch, origin)| ch.is_stepping() || ch.position() != *origin)
    }

    fn any_stepping(&self) -> bool {
        self.channels.iter().any(|ch| ch.is_stepping())
    }

    fn stop_all(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.stop_abrupt();
        }
    }

    fn set_all_enabled(&mut self, enabled: bool) {
        for ch in self.channels.iter_mut() {
            ch.set_enabled(enabled);
        }
    }

    /// Start the homing sequence
    pub fn home(&mut self, max_travel: f32, torque_percent: f32, now_ms: u64) -> Result<(), CommandError> {
        self.check_ready()?;
        if !(positive(max_travel) && valid_torque(torque_percent)) {
            return Err(ValidationError::InvalidArgument.into());
        }
        self.check_enabled()?;

        self.pending = None;
        self.apply_torque_limit(torque_percent);
        self.state = AxisState::Homing(HomingSession::new(
            self.config.homing,
            max_travel,
            torque_percent,
            now_ms,
        ));
        Ok(())
    }

    /// Stop all channels immediately
    ///
    /// An interrupted move or homing run reports [`AxisEvent::Aborted`] on
    /// the next update. A latched fault stays latched.
    pub fn abort(&mut self) {
        self.stop_all();
        self.stop_requested = false;

        match self.state {
            AxisState::Standby | AxisState::Fault(_) => {}
            AxisState::Homing(session) => {
                if matches!(session.phase, HomingPhase::Destress { .. }) {
                    self.set_all_enabled(true);
                }
                self.state = AxisState::Standby;
                self.pending = Some(AxisEvent::Aborted);
            }
            AxisState::StartingMove { .. } | AxisState::Moving => {
                self.state = AxisState::Standby;
                self.pending = Some(AxisEvent::Aborted);
            }
        }
    }

    /// Drop an event queued by a command, for callers that report it themselves
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Request a decelerated stop of the current move
    ///
    /// The move then completes with [`AxisEvent::Stopped`].
    pub fn stop_decelerated(&mut self) -> Result<(), CommandError> {
        if !self.state.is_moving() {
            return Err(CommandError::WrongPhase);
        }
        for ch in self.channels.iter_mut() {
            ch.stop_decelerated();
        }
        self.stop_requested = true;
        Ok(())
    }

    /// Energize all channels
    pub fn enable(&mut self) {
        self.set_all_enabled(true);
    }

    /// Abort any operation and de-energize all channels
    pub fn disable(&mut self) {
        self.abort();
        self.set_all_enabled(false);
    }

    /// Leave a latched fault once no channel reports one
    pub fn clear_fault(&mut self) -> Result<(), CommandError> {
        if !self.state.is_fault() {
            return Ok(());
        }
        if self.channels.iter().any(|ch| ch.has_fault()) {
            return Err(CommandError::Faulted);
        }
        self.state = AxisState::Standby;
        Ok(())
    }

    /// Advance the state machine
    pub fn update(&mut self, now_ms: u64) -> Option<AxisEvent> {
        for (i, ch) in self.channels.iter().enumerate() {
            self.monitor.sample(i, ch.effort_percent(), ch.is_stepping());
        }

        if let Some(event) = self.pending.take() {
            return Some(event);
        }

        if !self.state.is_fault() && self.channels.iter().any(|ch| ch.has_fault()) {
            return Some(self.latch_hardware_fault());
        }

        match self.state {
            AxisState::Standby | AxisState::Fault(_) => None,
            AxisState::StartingMove { since_ms } => self.update_starting(since_ms, now_ms),
            AxisState::Moving => self.update_moving(),
            AxisState::Homing(session) => self.update_homing(session, now_ms),
        }
    }

    fn latch_hardware_fault(&mut self) -> AxisEvent {
        self.stop_all();
        if let AxisState::Homing(session) = self.state {
            if matches!(session.phase, HomingPhase::Destress { .. }) {
                self.set_all_enabled(true);
            }
        }
        self.homed = false;
        self.state = AxisState::Fault(FaultKind::Hardware);
        AxisEvent::Fault(FaultKind::Hardware)
    }

    /// Stop a failed move, latching the fault where its kind requires
    fn fail_move(&mut self, kind: FaultKind) -> AxisEvent {
        self.stop_all();
        self.stop_requested = false;
        self.state = if kind.latches() {
            AxisState::Fault(kind)
        } else {
            AxisState::Standby
        };
        AxisEvent::Fault(kind)
    }

    fn update_starting(&mut self, since_ms: u64, now_ms: u64) -> Option<AxisEvent> {
        if self.motion_started() {
            self.state = AxisState::Moving;
            return None;
        }

        if self.stop_requested {
            self.state = AxisState::Standby;
            return Some(AxisEvent::Stopped);
        }

        if now_ms.saturating_sub(since_ms) >= u64::from(self.config.start_timeout_ms) {
            return Some(self.fail_move(FaultKind::Timeout(TimeoutKind::MoveStart)));
        }

        None
    }

    fn update_moving(&mut self) -> Option<AxisEvent> {
        let limit = self.torque_limit;
        let over_limit = (0..self.channels.len())
            .fold(false, |over, i| self.monitor.check_limit(i, limit) | over);

        if over_limit {
            return Some(self.fail_move(FaultKind::MotionTorque));
        }

        if !self.any_stepping() {
            self.state = AxisState::Standby;
            let event = if self.stop_requested {
                AxisEvent::Stopped
            } else {
                AxisEvent::Done
            };
            self.stop_requested = false;
            return Some(event);
        }

        None
    }

    fn update_homing(&mut self, mut session: HomingSession, now_ms: u64) -> Option<AxisEvent> {
        let step = if session.elapsed_ms(now_ms) >= u64::from(session.config.timeout_ms) {
            HomingStep::Fail(FaultKind::Timeout(TimeoutKind::HomingSession))
        } else {
            match session.phase.leg_stage() {
                Some((leg, Stage::Start)) => self.start_leg(&mut session, leg, now_ms),
                Some((leg, Stage::WaitStart)) => self.wait_leg_start(&mut session, leg, now_ms),
                Some((leg, Stage::Moving)) if leg.is_search() => self.search(&mut session, leg, now_ms),
                Some((leg, Stage::Moving)) => self.retreat(&mut session, leg, now_ms),
                None => self.finish_homing(&mut session, now_ms),
            }
        };

        match step {
            HomingStep::Continue => {
                self.state = AxisState::Homing(session);
                None
            }
            HomingStep::Fail(kind) => {
                self.stop_all();
                if matches!(session.phase, HomingPhase::Destress { .. }) {
                    self.set_all_enabled(true);
                }
                self.state = AxisState::Standby;
                Some(AxisEvent::Fault(kind))
            }
            HomingStep::Complete => {
                self.homed = true;
                self.state = AxisState::Standby;
                Some(AxisEvent::Homed)
            }
        }
    }

    fn start_leg(&mut self, session: &mut HomingSession, leg: Leg, now_ms: u64) -> HomingStep {
        let config = &session.config;
        let spu = self.config.steps_per_unit;
        let (distance, speed) = leg.motion(config, session.max_travel);
        let sign = if leg.is_search() {
            config.direction.sign()
        } else {
            -config.direction.sign()
        };
        let increments = libm::roundf(sign * distance * spu) as i32;
        let velocity = speed * spu;
        let accel = config.accel * spu;

        self.apply_torque_limit(session.torque_percent);
        self.monitor.reset();
        self.record_origins();
        session.hits = [false; MAX_AXIS_CHANNELS];

        for ch in self.channels.iter_mut() {
            ch.move_increments(increments, velocity, accel);
        }
        session.enter(leg.phase(Stage::WaitStart), now_ms);
        HomingStep::Continue
    }

    fn wait_leg_start(&mut self, session: &mut HomingSession, leg: Leg, now_ms: u64) -> HomingStep {
        if self.motion_started() {
            session.enter(leg.phase(Stage::Moving), now_ms);
            return HomingStep::Continue;
        }
        if session.phase_elapsed_ms(now_ms) >= u64::from(session.config.start_timeout_ms) {
            return HomingStep::Fail(FaultKind::Timeout(TimeoutKind::HomingStart));
        }
        HomingStep::Continue
    }

    /// Travel towards the reference until every channel has signaled
    fn search(&mut self, session: &mut HomingSession, leg: Leg, now_ms: u64) -> HomingStep {
        let limit = self.torque_limit;
        let mode = session.config.mode;

        for (i, ch) in self.channels.iter_mut().enumerate() {
            let over = self.monitor.check_limit(i, limit);
            let sensor = ch.endstop() == Some(true);

            let signaled = match mode {
                HomingMode::Torque if sensor => {
                    return HomingStep::Fail(FaultKind::HomingFailure(HomingFailure::UnexpectedSensor))
                }
                HomingMode::Sensor if over => {
                    return HomingStep::Fail(FaultKind::HomingFailure(HomingFailure::UnexpectedStall))
                }
                HomingMode::Torque => over,
                HomingMode::Sensor => sensor,
            };

            if signaled && !session.hits[i] {
                ch.stop_abrupt();
                session.hits[i] = true;
            }
        }

        if session.all_hit(self.channels.len()) {
            session.enter(HomingPhase::after(leg), now_ms);
            return HomingStep::Continue;
        }

        if !self.any_stepping() {
            return HomingStep::Fail(FaultKind::HomingFailure(HomingFailure::StopNotReached));
        }

        HomingStep::Continue
    }

    /// Travel away from the reference to a fixed distance
    fn retreat(&mut self, session: &mut HomingSession, leg: Leg, now_ms: u64) -> HomingStep {
        let limit = self.torque_limit;
        let over_limit = (0..self.channels.len())
            .fold(false, |over, i| self.monitor.check_limit(i, limit) | over);
        if over_limit {
            return HomingStep::Fail(FaultKind::HomingFailure(HomingFailure::UnexpectedStall));
        }

        if self.any_stepping() {
            return HomingStep::Continue;
        }

        let stuck = session.config.mode == HomingMode::Sensor
            && self.channels.iter().any(|ch| ch.endstop() == Some(true));
        if stuck {
            return HomingStep::Fail(FaultKind::HomingFailure(HomingFailure::SensorStuck));
        }

        session.enter(HomingPhase::after(leg), now_ms);
        HomingStep::Continue
    }

    fn finish_homing(&mut self, session: &mut HomingSession, now_ms: u64) -> HomingStep {
        match session.phase {
            HomingPhase::SetZero => {
                for ch in self.channels.iter_mut() {
                    ch.set_zero();
                }
                let destress_ms = session.config.destress_ms;
                if destress_ms == 0 {
                    return HomingStep::Complete;
                }
                self.set_all_enabled(false);
                session.enter(
                    HomingPhase::Destress {
                        until_ms: now_ms.saturating_add(u64::from(destress_ms)),
                    },
                    now_ms,
                );
                HomingStep::Continue
            }
            HomingPhase::Destress { until_ms } => {
                if now_ms < until_ms {
                    return HomingStep::Continue;
                }
                self.set_all_enabled(true);
                HomingStep::Complete
            }
            _ => HomingStep::Continue,
        }
    }
}
