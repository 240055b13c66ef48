//! Cooperative bench loop
//!
//! Each tick takes at most one script line, runs one machine pass and then
//! lets every simulated channel move for the tick duration. Protocol lines
//! go to the output writer; the same information is traced.
//!
//! Besides protocol commands a script may hold bench directives:
//!
//! - `wait` holds the script until the machine is quiescent
//! - `wait <ms>` holds it for a fixed simulated time

use std::io::{self, Write};

use aliquot_core::machine::{Machine, MachineEvent};
use aliquot_drivers::SimChannel;
use aliquot_protocol::{Command, Reply};
use tracing::{debug, error, info, warn};

use crate::config::{BenchConfig, BenchError};

/// Counters of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Script lines handed to the machine
    pub commands: usize,
    /// Rejected commands and unparsable lines
    pub rejected: usize,
    pub reports: usize,
    /// Reports describing a failure
    pub failures: usize,
    /// Stopped on the tick limit with work still outstanding
    pub timed_out: bool,
}

/// Drives a machine built from simulated channels
pub struct Runner<W: Write> {
    machine: Machine<SimChannel>,
    tick_ms: u32,
    now_ms: u64,
    out: W,
    summary: RunSummary,
}

/// Script hold requested by a `wait` directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Quiescent,
    Until(u64),
}

/// Parse a `wait` directive, None when the line is a protocol command
fn wait_directive(line: &str, now_ms: u64) -> Option<Result<Wait, &'static str>> {
    let mut tokens = line.split_ascii_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("wait") {
        return None;
    }
    let wait = match (tokens.next(), tokens.next()) {
        (None, _) => Ok(Wait::Quiescent),
        (Some(ms), None) => ms
            .parse::<u64>()
            .map(|ms| Wait::Until(now_ms.saturating_add(ms)))
            .map_err(|_| "invalid_number"),
        (Some(_), Some(_)) => Err("trailing_arguments"),
    };
    Some(wait)
}

/// Strip comments and surrounding whitespace, None for nothing left
fn script_line(raw: &str) -> Option<&str> {
    let line = raw.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

impl<W: Write> Runner<W> {
    pub fn new(config: &BenchConfig, tick_ms: u32, out: W) -> Result<Self, BenchError> {
        let machine = Machine::new(&config.machine, |axis, channel| {
            SimChannel::new(config.sim_for(axis, channel))
        })?;

        info!(
            "Machine built: axes={}, dispense={}",
            machine.axes().len(),
            machine.dispense().is_some()
        );

        Ok(Self {
            machine,
            tick_ms: tick_ms.max(1),
            now_ms: 0,
            out,
            summary: RunSummary::default(),
        })
    }

    pub fn machine(&self) -> &Machine<SimChannel> {
        &self.machine
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Consume the runner, returning the output writer
    pub fn into_output(self) -> W {
        self.out
    }

    /// Run one tick, optionally with a command line
    pub fn step(&mut self, line: Option<&str>) -> Result<(), BenchError> {
        let command = match line {
            Some(text) => match Command::parse(text) {
                Ok(command) => {
                    debug!(tick = self.now_ms, "<- {}", text);
                    Some(command)
                }
                Err(e) => {
                    warn!(tick = self.now_ms, "Unparsable line '{}': {}", text, e.as_str());
                    self.summary.rejected += 1;
                    writeln!(self.out, "{}", Reply::Rejected(e.as_str()).to_line())?;
                    None
                }
            },
            None => None,
        };
        if command.is_some() {
            self.summary.commands += 1;
        }

        let output = self.machine.tick(self.now_ms, command.as_ref());

        if let Some(reply) = output.reply_message() {
            if let Reply::Rejected(reason) = reply {
                warn!(tick = self.now_ms, "Command rejected: {}", reason);
                self.summary.rejected += 1;
            }
            writeln!(self.out, "{}", reply.to_line())?;
        }

        for event in output.events.iter() {
            self.publish(event)?;
        }

        if output.telemetry_due {
            for line in self.machine.status_lines() {
                debug!(tick = self.now_ms, "{}", line);
                writeln!(self.out, "{}", line)?;
            }
        }

        for axis in self.machine.axes_mut() {
            for channel in axis.channels_mut() {
                channel.advance(self.tick_ms);
            }
        }
        self.now_ms += u64::from(self.tick_ms);
        self.summary.ticks += 1;
        Ok(())
    }

    fn publish(&mut self, event: &MachineEvent) -> Result<(), BenchError> {
        let report = self.machine.report(event);
        let line = report.to_line();
        if report.is_error() || event.is_fault() {
            error!(tick = self.now_ms, "{}", line);
            self.summary.failures += 1;
        } else {
            info!(tick = self.now_ms, "{}", line);
        }
        self.summary.reports += 1;
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    /// Feed a script until it is exhausted and the machine is quiescent
    ///
    /// Blank lines, `#` comments and directives do not use a tick.
    pub fn run<I>(&mut self, lines: I, max_ticks: Option<u64>) -> Result<RunSummary, BenchError>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let mut lines = lines.into_iter();
        let mut exhausted = false;
        let mut wait = None;

        loop {
            if max_ticks.map_or(false, |max| self.summary.ticks >= max) {
                let outstanding = !exhausted || !self.machine.is_quiescent();
                if outstanding {
                    warn!("Tick limit reached at {} ms", self.now_ms);
                }
                self.summary.timed_out = outstanding;
                break;
            }

            let held = match wait {
                Some(Wait::Quiescent) => !self.machine.is_quiescent(),
                Some(Wait::Until(until)) => self.now_ms < until,
                None => false,
            };
            if held {
                self.step(None)?;
                continue;
            }
            wait = None;

            let mut next = None;
            while !exhausted {
                match lines.next() {
                    Some(raw) => {
                        let raw = raw?;
                        let Some(line) = script_line(&raw) else {
                            continue;
                        };
                        match wait_directive(line, self.now_ms) {
                            Some(Ok(directive)) => {
                                debug!(tick = self.now_ms, "Script waiting: {:?}", directive);
                                wait = Some(directive);
                                break;
                            }
                            Some(Err(reason)) => {
                                warn!(tick = self.now_ms, "Bad directive '{}': {}", line, reason);
                                self.summary.rejected += 1;
                                writeln!(self.out, "{}", Reply::Rejected(reason).to_line())?;
                            }
                            None => {
                                next = Some(line.to_string());
                                break;
                            }
                        }
                    }
                    None => exhausted = true,
                }
            }
            if wait.is_some() {
                continue;
            }

            if next.is_none() && exhausted && self.machine.is_quiescent() {
                break;
            }

            self.step(next.as_deref())?;
        }

        self.out.flush()?;
        info!(
            "Run finished: ticks={}, commands={}, rejected={}, reports={}, failures={}",
            self.summary.ticks,
            self.summary.commands,
            self.summary.rejected,
            self.summary.reports,
            self.summary.failures
        );
        Ok(self.summary)
    }
}
