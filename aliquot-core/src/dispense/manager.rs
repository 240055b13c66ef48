//! Dispense operation manager
//!
//! Drives one axis through an inject or purge. The axis is passed in on
//! every call; the manager never owns it.
//!
//! ```text
//! Idle ──start──▶ Starting ──axis Moving──▶ Active ──Done──▶ Completed
//!                                  │  ▲
//!                            pause │  │ axis Moving
//!                                  ▼  │
//!                        Pausing ──▶ Paused ──resume──▶ Resuming
//! ```
//!
//! Cancel is accepted in every ongoing phase. Finalized operations land in
//! Idle within the same call.

use aliquot_protocol::{DispenseKind, DispenseTelemetry};

use super::operation::{
    DispenseEvent, DispenseFault, DispenseOperation, DispenseOutcome, DispensePhase,
};
use crate::axis::{AxisController, AxisEvent, AxisState};
use crate::config::{CancelAccounting, DispenseConfig};
use crate::error::{CommandError, ValidationError};
use crate::traits::MotorChannel;

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Dispense state for one dispense axis
#[derive(Debug, Clone)]
pub struct DispenseManager {
    config: DispenseConfig,
    phase: DispensePhase,
    operation: Option<DispenseOperation>,
    /// Volume of the last operation that did not fault
    last_completed_volume: f32,
    last_outcome: Option<DispenseOutcome>,
    /// Kept until the next operation starts
    last_fault: Option<DispenseFault>,
    /// Finalized without axis involvement, reported on the next update
    pending: Option<DispenseEvent>,
}

impl DispenseManager {
    pub fn new(config: DispenseConfig) -> Self {
        Self {
            config,
            phase: DispensePhase::Idle,
            operation: None,
            last_completed_volume: 0.0,
            last_outcome: None,
            last_fault: None,
            pending: None,
        }
    }

    pub fn config(&self) -> &DispenseConfig {
        &self.config
    }

    pub fn phase(&self) -> DispensePhase {
        self.phase
    }

    pub fn is_ongoing(&self) -> bool {
        self.phase.is_ongoing()
    }

    pub fn operation(&self) -> Option<&DispenseOperation> {
        self.operation.as_ref()
    }

    pub fn last_completed_volume(&self) -> f32 {
        self.last_completed_volume
    }

    pub fn last_outcome(&self) -> Option<DispenseOutcome> {
        self.last_outcome
    }

    /// Diagnostics of the last operation, when it faulted
    pub fn last_fault(&self) -> Option<&DispenseFault> {
        self.last_fault.as_ref()
    }

    /// Cumulative volume of the ongoing operation
    pub fn dispensed_volume(&self) -> f32 {
        self.operation.map_or(0.0, |op| op.dispensed_volume())
    }

    /// Change the volume calibration
    pub fn set_steps_per_volume(&mut self, steps_per_volume: f32) -> Result<(), CommandError> {
        if self.is_ongoing() {
            return Err(CommandError::Busy);
        }
        if !positive(steps_per_volume) {
            return Err(ValidationError::InvalidStepsPerVolume.into());
        }
        self.config.steps_per_volume = steps_per_volume;
        Ok(())
    }

    /// Start an operation delivering `volume`
    ///
    /// `speed` is in volume/s and `accel` in volume/s².
    pub fn start<C: MotorChannel>(
        &mut self,
        axis: &mut AxisController<C>,
        kind: DispenseKind,
        volume: f32,
        speed: f32,
        accel: f32,
        torque_percent: f32,
        now_ms: u64,
    ) -> Result<(), CommandError> {
        if self.is_ongoing() {
            return Err(CommandError::Busy);
        }
        if !(positive(volume) && positive(speed) && positive(accel)) {
            return Err(ValidationError::InvalidArgument.into());
        }
        let factor = self.config.steps_per_volume;
        if !positive(factor) {
            return Err(ValidationError::InvalidStepsPerVolume.into());
        }

        let direction = self.config.inject_direction.sign();
        let total = libm::roundf(volume * factor) as i32;
        let origin = axis.position_increments();
        let velocity = speed * factor;
        let accel = accel * factor;

        axis.move_increments(
            libm::roundf(direction * total as f32) as i32,
            velocity,
            accel,
            torque_percent,
            now_ms,
        )?;

        self.pending = None;
        self.last_fault = None;
        self.operation = Some(DispenseOperation {
            kind,
            target_volume: volume,
            steps_per_volume: factor,
            direction,
            total_increments: total,
            dispensed_increments: 0,
            remaining_increments: total,
            start_position: origin,
            segment_start: origin,
            velocity,
            accel,
            torque_percent,
        });
        self.phase = DispensePhase::Starting;
        Ok(())
    }

    /// Request a pause; the axis decelerates to a stop
    pub fn pause<C: MotorChannel>(&mut self, axis: &mut AxisController<C>) -> Result<(), CommandError> {
        if self.phase != DispensePhase::Active {
            return Err(CommandError::WrongPhase);
        }
        axis.stop_decelerated()?;
        self.phase = DispensePhase::Pausing;
        Ok(())
    }

    /// Continue a paused operation with the remaining increments
    pub fn resume<C: MotorChannel>(
        &mut self,
        axis: &mut AxisController<C>,
        now_ms: u64,
    ) -> Result<(), CommandError> {
        if self.phase != DispensePhase::Paused {
            return Err(CommandError::WrongPhase);
        }
        let Some(mut op) = self.operation else {
            return Err(CommandError::WrongPhase);
        };

        if op.remaining_increments == 0 {
            self.pending = Some(self.finalize(DispenseOutcome::Completed));
            return Ok(());
        }

        op.segment_start = axis.position_increments();
        axis.move_increments(
            libm::roundf(op.direction * op.remaining_increments as f32) as i32,
            op.velocity,
            op.accel,
            op.torque_percent,
            now_ms,
        )?;
        self.operation = Some(op);
        self.phase = DispensePhase::Resuming;
        Ok(())
    }

    /// Abort motion and finalize as cancelled
    ///
    /// The cancellation is reported on the next update.
    pub fn cancel<C: MotorChannel>(&mut self, axis: &mut AxisController<C>) -> Result<(), CommandError> {
        if !self.is_ongoing() {
            return Err(CommandError::WrongPhase);
        }

        axis.abort();
        axis.discard_pending();
        self.fold(axis);

        self.pending = Some(self.finalize(DispenseOutcome::Cancelled));
        Ok(())
    }

    /// Advance with this tick's axis event
    ///
    /// Returns the terminal event once the operation finalizes.
    pub fn update<C: MotorChannel>(
        &mut self,
        axis: &AxisController<C>,
        event: Option<AxisEvent>,
    ) -> Option<DispenseEvent> {
        if let Some(done) = self.pending.take() {
            return Some(done);
        }
        if !self.is_ongoing() {
            return None;
        }

        match (self.phase, event) {
            (_, Some(AxisEvent::Fault(kind))) => {
                self.fold(axis);
                Some(self.finalize(DispenseOutcome::Faulted(kind)))
            }
            (_, Some(AxisEvent::Aborted)) => {
                self.fold(axis);
                Some(self.finalize(DispenseOutcome::Cancelled))
            }
            (DispensePhase::Pausing, Some(AxisEvent::Stopped | AxisEvent::Done)) => {
                self.fold(axis);
                self.phase = DispensePhase::Paused;
                None
            }
            (
                DispensePhase::Starting | DispensePhase::Resuming | DispensePhase::Active,
                Some(AxisEvent::Done),
            ) => {
                self.fold(axis);
                Some(self.finalize(DispenseOutcome::Completed))
            }
            (
                DispensePhase::Starting | DispensePhase::Resuming | DispensePhase::Active,
                Some(AxisEvent::Stopped),
            ) => {
                self.fold(axis);
                self.phase = DispensePhase::Paused;
                None
            }
            (DispensePhase::Starting | DispensePhase::Resuming, None) => {
                if *axis.state() == AxisState::Moving {
                    if let Some(op) = self.operation.as_mut() {
                        op.segment_start = axis.move_origin();
                    }
                    self.phase = DispensePhase::Active;
                }
                None
            }
            _ => None,
        }
    }

    fn fold<C: MotorChannel>(&mut self, axis: &AxisController<C>) {
        if let Some(op) = self.operation.as_mut() {
            op.fold_segment(axis.position_increments());
        }
    }

    fn finalize(&mut self, outcome: DispenseOutcome) -> DispenseEvent {
        let op = self.operation.take();
        let (kind, dispensed) = op.map_or((DispenseKind::Inject, 0.0), |op| (op.kind, op.dispensed_volume()));

        let volume = match outcome {
            DispenseOutcome::Completed => {
                self.last_completed_volume = dispensed;
                dispensed
            }
            DispenseOutcome::Cancelled => {
                let reported = match self.config.cancel_accounting {
                    CancelAccounting::ReportZero => 0.0,
                    CancelAccounting::ReportDispensed => dispensed,
                };
                self.last_completed_volume = reported;
                reported
            }
            DispenseOutcome::Faulted(fault) => {
                self.last_fault = op.map(|op| op.fault_record(fault));
                dispensed
            }
        };

        self.last_outcome = Some(outcome);
        self.phase = DispensePhase::Idle;
        DispenseEvent {
            kind,
            outcome,
            volume,
        }
    }

    /// Status snapshot
    pub fn telemetry(&self) -> DispenseTelemetry {
        let op = self.operation.as_ref();
        DispenseTelemetry {
            phase: self.phase.name(),
            kind: op.map(|op| op.kind.as_str()),
            dispensed: op.map_or(0.0, |op| op.dispensed_volume()),
            target: op.map_or(0.0, |op| op.target_volume),
            remaining_increments: op.map_or(0, |op| op.remaining_increments),
            last_completed: self.last_completed_volume,
            last_outcome: self.last_outcome.map(DispenseOutcome::as_str),
            faulted: self.last_fault.map(|f| f.volume),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::error::{FaultKind, TimeoutKind};
    use crate::testing::MockChannel;

    fn injector() -> AxisController<MockChannel> {
        let mut config = AxisConfig::named("injector");
        config.steps_per_unit = 100.0;
        config.travel_min = 0.0;
        config.travel_max = 1_000.0;
        let mut channels = heapless::Vec::new();
        let _ = channels.push(MockChannel::new());
        let mut axis = AxisController::new(config, channels).unwrap();
        home(&mut axis);
        axis
    }

    /// Fake a completed homing run on the mock
    fn home(axis: &mut AxisController<MockChannel>) {
        axis.home(100.0, 50.0, 0).unwrap();
        let mut now = 0;
        for _ in 0..40 {
            now += 10;
            let phase = axis.phase_name();
            if phase.map_or(false, |p| p.ends_with("SearchMoving")) {
                axis.channel_mut(0).unwrap().effort = Some(90.0);
            } else if phase.map_or(false, |p| p.ends_with("Moving")) {
                axis.channel_mut(0).unwrap().effort = Some(0.0);
                axis.channel_mut(0).unwrap().finish();
            } else {
                axis.channel_mut(0).unwrap().effort = Some(0.0);
            }
            if axis.update(now) == Some(AxisEvent::Homed) {
                assert!(axis.is_homed());
                return;
            }
        }
        panic!("mock homing did not complete");
    }

    fn manager() -> DispenseManager {
        DispenseManager::new(DispenseConfig {
            axis: heapless::String::try_from("injector").unwrap(),
            steps_per_volume: 800.0,
            ..DispenseConfig::default()
        })
    }

    /// Run one controller tick: axis first, then the manager
    fn tick(
        manager: &mut DispenseManager,
        axis: &mut AxisController<MockChannel>,
        now: u64,
    ) -> Option<DispenseEvent> {
        let event = axis.update(now);
        manager.update(axis, event)
    }

    fn start(manager: &mut DispenseManager, axis: &mut AxisController<MockChannel>, volume: f32) {
        manager
            .start(axis, DispenseKind::Inject, volume, 1.0, 5.0, 60.0, 0)
            .unwrap();
    }

    #[test]
    fn test_start_issues_full_move() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);

        assert_eq!(manager.phase(), DispensePhase::Starting);
        assert_eq!(axis.channel(0).unwrap().last_move, Some((8_000, 800.0, 4_000.0)));
        let op = manager.operation().unwrap();
        assert_eq!(op.total_increments, 8_000);
        assert_eq!(op.remaining_increments, 8_000);

        assert_eq!(tick(&mut manager, &mut axis, 10), None);
        assert_eq!(manager.phase(), DispensePhase::Active);
    }

    #[test]
    fn test_start_validation() {
        let mut axis = injector();
        let mut manager = manager();
        let moves = axis.channel(0).unwrap().moves;
        assert_eq!(
            manager.start(&mut axis, DispenseKind::Inject, 0.0, 1.0, 5.0, 60.0, 0),
            Err(CommandError::Validation(ValidationError::InvalidArgument))
        );
        assert_eq!(
            manager.start(&mut axis, DispenseKind::Inject, 10.0, -1.0, 5.0, 60.0, 0),
            Err(CommandError::Validation(ValidationError::InvalidArgument))
        );
        assert_eq!(manager.phase(), DispensePhase::Idle);
        assert_eq!(axis.channel(0).unwrap().moves, moves);

        start(&mut manager, &mut axis, 10.0);
        assert_eq!(
            manager.start(&mut axis, DispenseKind::Purge, 1.0, 1.0, 5.0, 60.0, 0),
            Err(CommandError::Busy)
        );
    }

    #[test]
    fn test_axis_rejection_leaves_manager_idle() {
        let mut axis = injector();
        let mut manager = manager();
        // 200 ml would leave the travel range
        assert_eq!(
            manager.start(&mut axis, DispenseKind::Inject, 200.0, 1.0, 5.0, 60.0, 0),
            Err(CommandError::Validation(ValidationError::OutOfTravel))
        );
        assert!(!manager.is_ongoing());
        assert!(manager.operation().is_none());
    }

    #[test]
    fn test_completion() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);

        axis.channel_mut(0).unwrap().finish();
        let event = tick(&mut manager, &mut axis, 20).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Completed);
        assert!((event.volume - 10.0).abs() < 1e-4);
        assert!((manager.last_completed_volume() - 10.0).abs() < 1e-4);
        assert_eq!(manager.phase(), DispensePhase::Idle);
        assert!(manager.operation().is_none());
    }

    #[test]
    fn test_pause_resume_accounting() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);

        // Pause at 4000 of 8000 increments
        axis.channel_mut(0).unwrap().advance(4_000);
        manager.pause(&mut axis).unwrap();
        assert_eq!(manager.phase(), DispensePhase::Pausing);
        axis.channel_mut(0).unwrap().halt();
        assert_eq!(tick(&mut manager, &mut axis, 20), None);
        assert_eq!(manager.phase(), DispensePhase::Paused);

        let op = *manager.operation().unwrap();
        assert!((op.dispensed_volume() - 5.0).abs() < 1e-4);
        assert_eq!(op.remaining_increments, 4_000);

        manager.resume(&mut axis, 30).unwrap();
        assert_eq!(manager.phase(), DispensePhase::Resuming);
        assert_eq!(axis.channel(0).unwrap().last_move.unwrap().0, 4_000);
        tick(&mut manager, &mut axis, 40);
        assert_eq!(manager.phase(), DispensePhase::Active);

        axis.channel_mut(0).unwrap().finish();
        let event = tick(&mut manager, &mut axis, 50).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Completed);
        assert!((event.volume - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_pause_only_when_active() {
        let mut axis = injector();
        let mut manager = manager();
        assert_eq!(manager.pause(&mut axis), Err(CommandError::WrongPhase));
        assert_eq!(manager.resume(&mut axis, 0), Err(CommandError::WrongPhase));
        start(&mut manager, &mut axis, 10.0);
        assert_eq!(manager.pause(&mut axis), Err(CommandError::WrongPhase));
        assert_eq!(manager.resume(&mut axis, 0), Err(CommandError::WrongPhase));
    }

    #[test]
    fn test_pause_settling_at_target_leaves_nothing_to_resume() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);

        manager.pause(&mut axis).unwrap();
        axis.channel_mut(0).unwrap().position += 8_000;
        axis.channel_mut(0).unwrap().halt();
        tick(&mut manager, &mut axis, 20);
        assert_eq!(manager.phase(), DispensePhase::Paused);
        assert_eq!(manager.operation().unwrap().remaining_increments, 0);

        let moves = axis.channel(0).unwrap().moves;
        manager.resume(&mut axis, 30).unwrap();
        assert_eq!(axis.channel(0).unwrap().moves, moves);
        let event = tick(&mut manager, &mut axis, 40).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Completed);
        assert!((manager.last_completed_volume() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_torque_fault_finalizes_faulted() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);

        axis.channel_mut(0).unwrap().advance(2_000);
        axis.channel_mut(0).unwrap().effort = Some(95.0);
        let event = tick(&mut manager, &mut axis, 20).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Faulted(FaultKind::MotionTorque));
        assert!(!event.outcome.is_success());
        assert!((event.volume - 2.5).abs() < 1e-4);
        // Last completed volume is not updated by a fault
        assert_eq!(manager.last_completed_volume(), 0.0);
        assert_eq!(manager.phase(), DispensePhase::Idle);

        // Diagnostics survive the finalize until the next start
        let fault = *manager.last_fault().unwrap();
        assert_eq!(fault.fault, FaultKind::MotionTorque);
        assert!((fault.volume - 2.5).abs() < 1e-4);
        assert_eq!((fault.stop_position - fault.start_position).abs(), 2_000);
        assert_eq!(fault.stop_position, axis.position_increments());
        assert!(manager
            .telemetry()
            .to_line()
            .ends_with("dispensed=0.000 target=0.000 remaining=0 last=0.000 outcome=faulted faulted=2.500"));

        start(&mut manager, &mut axis, 1.0);
        assert!(manager.last_fault().is_none());
    }

    #[test]
    fn test_fault_while_paused() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);
        axis.channel_mut(0).unwrap().advance(800);
        manager.pause(&mut axis).unwrap();
        axis.channel_mut(0).unwrap().halt();
        tick(&mut manager, &mut axis, 20);

        axis.channel_mut(0).unwrap().fault = true;
        let event = tick(&mut manager, &mut axis, 30).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Faulted(FaultKind::Hardware));
        assert!((event.volume - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_start_timeout_faults_operation() {
        let mut axis = injector();
        axis.channel_mut(0).unwrap().auto_start = false;
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        assert_eq!(tick(&mut manager, &mut axis, 10), None);
        let event = tick(&mut manager, &mut axis, 1_000).unwrap();
        assert_eq!(
            event.outcome,
            DispenseOutcome::Faulted(FaultKind::Timeout(TimeoutKind::MoveStart))
        );
        assert_eq!(event.volume, 0.0);
    }

    #[test]
    fn test_cancel_reports_zero() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);
        axis.channel_mut(0).unwrap().advance(4_000);

        manager.cancel(&mut axis).unwrap();
        assert_eq!(manager.phase(), DispensePhase::Idle);
        assert!(!axis.channel(0).unwrap().stepping);
        assert_eq!(*axis.state(), AxisState::Standby);

        let event = tick(&mut manager, &mut axis, 20).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Cancelled);
        assert_eq!(event.volume, 0.0);
        assert_eq!(manager.last_completed_volume(), 0.0);

        // The axis abort is not reported separately
        assert_eq!(tick(&mut manager, &mut axis, 30), None);
    }

    #[test]
    fn test_cancel_reports_dispensed_when_configured() {
        let mut axis = injector();
        let mut manager = manager();
        manager.config.cancel_accounting = CancelAccounting::ReportDispensed;
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);
        axis.channel_mut(0).unwrap().advance(2_400);

        manager.cancel(&mut axis).unwrap();
        let event = tick(&mut manager, &mut axis, 20).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Cancelled);
        assert!((event.volume - 3.0).abs() < 1e-4);
        assert!((manager.last_completed_volume() - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_cancel_while_paused() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);
        axis.channel_mut(0).unwrap().advance(1_000);
        manager.pause(&mut axis).unwrap();
        axis.channel_mut(0).unwrap().halt();
        tick(&mut manager, &mut axis, 20);

        manager.cancel(&mut axis).unwrap();
        let event = tick(&mut manager, &mut axis, 30).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Cancelled);
        assert_eq!(manager.cancel(&mut axis), Err(CommandError::WrongPhase));
    }

    #[test]
    fn test_external_abort_cancels() {
        let mut axis = injector();
        let mut manager = manager();
        start(&mut manager, &mut axis, 10.0);
        tick(&mut manager, &mut axis, 10);
        axis.abort();
        let event = tick(&mut manager, &mut axis, 20).unwrap();
        assert_eq!(event.outcome, DispenseOutcome::Cancelled);
    }

    #[test]
    fn test_set_steps_per_volume() {
        let mut axis = injector();
        let mut manager = manager();
        assert_eq!(
            manager.set_steps_per_volume(0.0),
            Err(CommandError::Validation(ValidationError::InvalidStepsPerVolume))
        );
        manager.set_steps_per_volume(400.0).unwrap();
        start(&mut manager, &mut axis, 10.0);
        assert_eq!(manager.operation().unwrap().total_increments, 4_000);
        assert_eq!(manager.set_steps_per_volume(800.0), Err(CommandError::Busy));
    }

    #[test]
    fn test_telemetry() {
        let mut axis = injector();
        let mut manager = manager();
        assert_eq!(
            manager.telemetry().to_line().as_str(),
            "DISPENSE phase=Idle kind=- dispensed=0.000 target=0.000 remaining=0 last=0.000 outcome=- faulted=-"
        );
        start(&mut manager, &mut axis, 10.0);
        let t = manager.telemetry();
        assert_eq!(t.phase, "Starting");
        assert_eq!(t.kind, Some("inject"));
        assert_eq!(t.remaining_increments, 8_000);
    }
}
