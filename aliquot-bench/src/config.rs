//! Bench configuration loading
//!
//! One TOML file describes the machine (same layout as the persisted
//! [`MachineConfig`]) plus a `[[sim]]` entry per simulated channel that
//! needs non-default mechanics.
//!
//! ```toml
//! telemetry_interval_ms = 250
//!
//! [[axes]]
//! name = "gantry"
//! channels = 2
//!
//! [[sim]]
//! axis = "gantry"
//! channel = 1
//! hard_stop_min = -2600
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use aliquot_core::config::{AxisConfig, ConfigError, MachineConfig};
use aliquot_drivers::SimConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised by the bench
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration validation failed: {0}")]
    Config(ConfigError),

    #[error("sim entry {axis}/{channel} does not match any axis channel")]
    UnknownSimChannel { axis: String, channel: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for BenchError {
    fn from(e: ConfigError) -> Self {
        BenchError::Config(e)
    }
}

/// Mechanics of one simulated channel
#[derive(Debug, Clone, Deserialize)]
pub struct SimEntry {
    pub axis: String,
    #[serde(default)]
    pub channel: usize,
    #[serde(flatten)]
    pub mechanics: SimConfig,
}

/// Complete bench configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    #[serde(flatten)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub sim: Vec<SimEntry>,
}

impl BenchConfig {
    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, BenchError> {
        let config: BenchConfig = toml::from_str(text)?;
        config.machine.validate()?;

        for entry in &config.sim {
            let known = config
                .machine
                .axes
                .iter()
                .any(|a| a.name.as_str() == entry.axis && entry.channel < a.channels as usize);
            if !known {
                return Err(BenchError::UnknownSimChannel {
                    axis: entry.axis.clone(),
                    channel: entry.channel,
                });
            }
        }

        Ok(config)
    }

    /// Mechanics for one channel, default when no entry names it
    pub fn sim_for(&self, axis: &AxisConfig, channel: usize) -> SimConfig {
        self.sim
            .iter()
            .find(|e| e.axis == axis.name.as_str() && e.channel == channel)
            .map_or_else(SimConfig::default, |e| e.mechanics)
    }
}

/// Load the bench configuration from a file
pub fn load_config(path: &Path) -> Result<BenchConfig, BenchError> {
    let text = fs::read_to_string(path).map_err(|source| BenchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    BenchConfig::from_toml(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aliquot_core::config::{CancelAccounting, HomingMode};
    use std::io::Write;

    const CONFIG: &str = r#"
telemetry_interval_ms = 100

[[axes]]
name = "gantry"
channels = 2
steps_per_unit = 200.0
travel_max = 400.0

[axes.homing]
backoff_distance = 1.0
slow_search_distance = 2.0
offset_distance = 1.0

[[axes]]
name = "injector"
steps_per_unit = 800.0

[axes.homing]
mode = "sensor"

[dispense]
axis = "injector"
steps_per_volume = 800.0
cancel_accounting = "report_dispensed"

[[sim]]
axis = "gantry"
channel = 1
hard_stop_min = -2600

[[sim]]
axis = "injector"
endstop_min = -500
start_delay_ms = 20
"#;

    #[test]
    fn test_parse_bench_config() {
        let config = BenchConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.machine.telemetry_interval_ms, 100);
        assert_eq!(config.machine.axes.len(), 2);

        let gantry = &config.machine.axes[0];
        assert_eq!(gantry.channels, 2);
        assert_eq!(gantry.homing.offset_distance, 1.0);
        // Unset fields keep their defaults
        assert_eq!(gantry.homing.rapid_speed, 20.0);

        let injector = &config.machine.axes[1];
        assert_eq!(injector.homing.mode, HomingMode::Sensor);

        let dispense = config.machine.dispense.as_ref().unwrap();
        assert_eq!(dispense.cancel_accounting, CancelAccounting::ReportDispensed);
    }

    #[test]
    fn test_sim_lookup() {
        let config = BenchConfig::from_toml(CONFIG).unwrap();
        let gantry = &config.machine.axes[0];

        assert_eq!(config.sim_for(gantry, 0), SimConfig::default());
        assert_eq!(config.sim_for(gantry, 1).hard_stop_min, Some(-2600));

        let injector = config.sim_for(&config.machine.axes[1], 0);
        assert_eq!(injector.endstop_min, Some(-500));
        assert_eq!(injector.start_delay_ms, 20);
        assert_eq!(injector.stall_effort, SimConfig::default().stall_effort);
    }

    #[test]
    fn test_rejects_unknown_sim_channel() {
        let text = CONFIG.replace("channel = 1", "channel = 2");
        let result = BenchConfig::from_toml(&text);
        assert!(matches!(
            result,
            Err(BenchError::UnknownSimChannel { channel: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_machine() {
        let text = CONFIG.replace("steps_per_unit = 800.0", "steps_per_unit = 0.0");
        let result = BenchConfig::from_toml(&text);
        assert!(matches!(
            result,
            Err(BenchError::Config(ConfigError::InvalidStepsPerUnit))
        ));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let result = BenchConfig::from_toml("[[axes]\nname = ");
        assert!(matches!(result, Err(BenchError::Toml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sim.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/bench.toml"));
        assert!(matches!(result, Err(BenchError::Read { .. })));
    }
}
