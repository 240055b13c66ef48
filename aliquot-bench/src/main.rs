//! # Aliquot Bench
//!
//! Runs the motion core against simulated channels on the host. Commands
//! come from a script file or stdin, one protocol line per tick; replies,
//! reports and status lines are printed as protocol text.

mod config;
mod runner;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, BenchError};
use crate::runner::Runner;

/// Aliquot bench runner
#[derive(Parser, Debug)]
#[command(name = "aliquot-bench")]
#[command(version)]
#[command(about = "Drive the Aliquot motion core on simulated channels")]
struct Args {
    /// Bench configuration TOML (machine plus simulated mechanics)
    #[arg(long, default_value = "config/bench.toml")]
    config: PathBuf,

    /// Command script, one protocol line per tick. Reads stdin when absent.
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Simulated time per tick in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u32,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Aliquot bench v{} starting...", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(timed_out) => {
            if timed_out {
                process::exit(2);
            }
        }
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<bool, BenchError> {
    info!("Loading config from {:?}", args.config);
    let config = load_config(&args.config)?;
    info!(
        "Config OK: axes={}, sim entries={}, tick={}ms",
        config.machine.axes.len(),
        config.sim.len(),
        args.tick_ms
    );

    let stdout = io::stdout();
    let mut runner = Runner::new(&config, args.tick_ms, stdout.lock())?;

    let summary = match &args.script {
        Some(path) => {
            let file = File::open(path).map_err(|source| BenchError::Read {
                path: path.clone(),
                source,
            })?;
            runner.run(BufReader::new(file).lines(), args.max_ticks)?
        }
        None => {
            info!("Reading commands from stdin");
            runner.run(io::stdin().lock().lines(), args.max_ticks)?
        }
    };

    for axis in runner.machine().axes() {
        info!(
            "{}: state={} homed={} pos={:.3}",
            axis.name(),
            axis.state_name(),
            axis.is_homed(),
            axis.position()
        );
    }
    info!("Simulated {} ms", runner.now_ms());

    if summary.timed_out {
        warn!("Work still outstanding after {} ticks", summary.ticks);
    }
    Ok(summary.timed_out)
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // Protocol lines own stdout
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .compact()
            .init();
    }
}
