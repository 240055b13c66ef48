//! Cooperative machine controller
//!
//! One [`Machine::tick`] does, in order:
//!
//! 1. Handle at most one inbound command and produce its reply
//! 2. Update every axis controller
//! 3. Update the dispense manager with its axis and that axis's event
//! 4. Flag telemetry as due on its interval
//!
//! Nothing here blocks; all deadlines compare against the caller's clock.

use heapless::Vec;

use aliquot_protocol::{Command, Line, Reply, Report};

use super::events::MachineEvent;
use crate::axis::AxisController;
use crate::config::{AxisConfig, ConfigError, MachineConfig, MAX_AXES};
use crate::dispense::{DispenseManager, DispensePhase};
use crate::error::{CommandError, ValidationError};
use crate::traits::MotorChannel;

/// Maximum events produced by one tick
pub const MAX_EVENTS: usize = MAX_AXES + 1;

/// Maximum status lines (one per axis plus dispense)
pub const MAX_STATUS_LINES: usize = MAX_AXES + 1;

/// Everything one tick produced
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// Answer to the command handled this tick
    pub reply: Option<Result<(), CommandError>>,
    /// Terminal events, in axis order
    pub events: Vec<MachineEvent, MAX_EVENTS>,
    /// Status lines should be published
    pub telemetry_due: bool,
}

impl TickOutput {
    /// Protocol reply for the handled command
    pub fn reply_message(&self) -> Option<Reply> {
        self.reply.map(|result| match result {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::Rejected(e.as_str()),
        })
    }
}

/// The machine: axes, dispense manager and telemetry cadence
pub struct Machine<C: MotorChannel> {
    axes: Vec<AxisController<C>, MAX_AXES>,
    dispense: Option<DispenseManager>,
    dispense_axis: usize,
    telemetry_interval_ms: u64,
    last_telemetry_ms: Option<u64>,
    status_requested: bool,
}

impl<C: MotorChannel> Machine<C> {
    /// Build the machine from a validated config
    ///
    /// `make_channel` is called once per motor channel with the owning
    /// axis config and the channel index.
    pub fn new<F>(config: &MachineConfig, mut make_channel: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&AxisConfig, usize) -> C,
    {
        config.validate()?;

        let mut axes = Vec::new();
        for axis_config in config.axes.iter() {
            let mut channels = Vec::new();
            for index in 0..axis_config.channels as usize {
                channels
                    .push(make_channel(axis_config, index))
                    .map_err(|_| ConfigError::InvalidChannelCount)?;
            }
            let axis = AxisController::new(axis_config.clone(), channels)?;
            axes.push(axis).map_err(|_| ConfigError::TooManyAxes)?;
        }

        let (dispense, dispense_axis) = match &config.dispense {
            Some(dispense) => {
                let index = config
                    .axis_index(&dispense.axis)
                    .ok_or(ConfigError::UnknownDispenseAxis)?;
                (Some(DispenseManager::new(dispense.clone())), index)
            }
            None => (None, 0),
        };

        Ok(Self {
            axes,
            dispense,
            dispense_axis,
            telemetry_interval_ms: u64::from(config.telemetry_interval_ms),
            last_telemetry_ms: None,
            status_requested: false,
        })
    }

    pub fn axes(&self) -> &[AxisController<C>] {
        &self.axes
    }

    /// Mutable access for the hardware integration
    pub fn axes_mut(&mut self) -> &mut [AxisController<C>] {
        &mut self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&AxisController<C>> {
        self.axes.iter().find(|a| a.name() == name)
    }

    pub fn dispense(&self) -> Option<&DispenseManager> {
        self.dispense.as_ref()
    }

    /// Index of the dispense axis, if one is configured
    pub fn dispense_axis(&self) -> Option<usize> {
        self.dispense.as_ref().map(|_| self.dispense_axis)
    }

    /// Check if nothing is in motion
    ///
    /// A paused dispense counts as quiescent.
    pub fn is_quiescent(&self) -> bool {
        let axes_idle = self.axes.iter().all(|a| !a.state().is_busy());
        let dispense_idle = self.dispense.as_ref().map_or(true, |m| {
            matches!(m.phase(), DispensePhase::Idle | DispensePhase::Paused)
        });
        axes_idle && dispense_idle
    }

    /// Run one scheduler pass
    pub fn tick(&mut self, now_ms: u64, command: Option<&Command>) -> TickOutput {
        let reply = command.map(|cmd| self.handle(cmd, now_ms));

        let mut events = Vec::new();
        for index in 0..self.axes.len() {
            let event = self.axes[index].update(now_ms);

            if index == self.dispense_axis {
                if let Some(manager) = self.dispense.as_mut() {
                    // Events of an ongoing dispense belong to the dispense
                    let consumed = manager.is_ongoing();
                    if let Some(done) = manager.update(&self.axes[index], event) {
                        let _ = events.push(MachineEvent::Dispense(done));
                    }
                    if consumed {
                        continue;
                    }
                }
            }

            if let Some(event) = event {
                let _ = events.push(MachineEvent::Axis { axis: index, event });
            }
        }

        let interval_elapsed = self.last_telemetry_ms.map_or(true, |last| {
            now_ms.saturating_sub(last) >= self.telemetry_interval_ms
        });
        let telemetry_due = interval_elapsed || self.status_requested;
        if telemetry_due {
            self.last_telemetry_ms = Some(now_ms);
            self.status_requested = false;
        }

        TickOutput {
            reply,
            events,
            telemetry_due,
        }
    }

    fn lookup(&self, name: &str) -> Result<usize, CommandError> {
        self.axes
            .iter()
            .position(|a| a.name() == name)
            .ok_or(CommandError::Validation(ValidationError::UnknownAxis))
    }

    fn dispensing_on(&self, index: usize) -> bool {
        index == self.dispense_axis && self.dispense.as_ref().map_or(false, |m| m.is_ongoing())
    }

    fn dispense_parts(&mut self) -> Result<(&mut DispenseManager, &mut AxisController<C>), CommandError> {
        let manager = self
            .dispense
            .as_mut()
            .ok_or(ValidationError::NoDispenseAxis)?;
        let axis = self
            .axes
            .get_mut(self.dispense_axis)
            .ok_or(ValidationError::NoDispenseAxis)?;
        Ok((manager, axis))
    }

    fn handle(&mut self, command: &Command, now_ms: u64) -> Result<(), CommandError> {
        match command {
            Command::Move { axis, args } => {
                let index = self.lookup(axis)?;
                if self.dispensing_on(index) {
                    return Err(CommandError::Busy);
                }
                self.axes[index].move_to(args, now_ms)
            }
            Command::Home {
                axis,
                max_travel,
                torque_percent,
            } => {
                let index = self.lookup(axis)?;
                if self.dispensing_on(index) {
                    return Err(CommandError::Busy);
                }
                self.axes[index].home(*max_travel, *torque_percent, now_ms)
            }
            Command::Abort { axis } => {
                let index = self.lookup(axis)?;
                if self.dispensing_on(index) {
                    let (manager, axis) = self.dispense_parts()?;
                    return manager.cancel(axis);
                }
                self.axes[index].abort();
                Ok(())
            }
            Command::Enable { axis } => {
                let index = self.lookup(axis)?;
                self.axes[index].enable();
                Ok(())
            }
            Command::Disable { axis } => {
                let index = self.lookup(axis)?;
                if self.dispensing_on(index) {
                    let (manager, axis) = self.dispense_parts()?;
                    manager.cancel(axis)?;
                }
                self.axes[index].disable();
                Ok(())
            }
            Command::ClearFault { axis } => {
                let index = self.lookup(axis)?;
                self.axes[index].clear_fault()
            }
            Command::Dispense {
                kind,
                volume,
                speed,
                accel,
                torque_percent,
            } => {
                let (manager, axis) = self.dispense_parts()?;
                manager.start(axis, *kind, *volume, *speed, *accel, *torque_percent, now_ms)
            }
            Command::Pause => {
                let (manager, axis) = self.dispense_parts()?;
                manager.pause(axis)
            }
            Command::Resume => {
                let (manager, axis) = self.dispense_parts()?;
                manager.resume(axis, now_ms)
            }
            Command::Cancel => {
                let (manager, axis) = self.dispense_parts()?;
                manager.cancel(axis)
            }
            Command::Status => {
                self.status_requested = true;
                Ok(())
            }
        }
    }

    /// Protocol report for an event
    pub fn report(&self, event: &MachineEvent) -> Report<'_> {
        match event {
            MachineEvent::Axis { axis, event } => {
                let source = self.axes.get(*axis).map_or("?", |a| a.name());
                event.report(source)
            }
            MachineEvent::Dispense(event) => event.report(),
        }
    }

    /// Current status of every axis and the dispense manager
    pub fn status_lines(&self) -> Vec<Line, MAX_STATUS_LINES> {
        let mut lines = Vec::new();
        for axis in self.axes.iter() {
            let torque = axis.torque_readings();
            let _ = lines.push(axis.telemetry(&torque).to_line());
        }
        if let Some(manager) = &self.dispense {
            let _ = lines.push(manager.telemetry().to_line());
        }
        lines
    }
}
