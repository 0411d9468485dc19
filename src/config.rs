use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::BenchmarkRun;
use crate::errors::BenchError;
use crate::histogram::Histogram;
use crate::simulator::{OperationSimulator, RandomParkSimulator, SleepSimulator};
use crate::types::{AbortedSamplePolicy, DrawPolicy, OverflowPolicy, SimulatorKind};

const CONFIG_DIR_NAME: &str = "jitterbench";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Everything a run needs, loadable from TOML. Missing keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub histogram: HistogramConfig,
    pub simulator: SimulatorConfig,
    pub run: RunConfig,
    pub messaging: MessagingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistogramConfig {
    pub lowest_discernible_value: u64,
    pub highest_trackable_value: u64,
    pub significant_value_digits: u8,
    pub overflow: OverflowPolicy,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            lowest_discernible_value: 100,
            // One hour in nanoseconds, wide enough for either simulator.
            highest_trackable_value: 3_600_000_000_000,
            significant_value_digits: 3,
            overflow: OverflowPolicy::Reject,
        }
    }
}

impl HistogramConfig {
    pub fn build(&self) -> Result<Histogram, BenchError> {
        Histogram::new(
            self.lowest_discernible_value,
            self.highest_trackable_value,
            self.significant_value_digits,
            self.overflow,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub kind: SimulatorKind,
    pub min_park_time_nanos: u64,
    pub max_park_time_nanos: u64,
    pub sleep_time_millis: u64,
    pub draw: DrawPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            kind: SimulatorKind::Park,
            min_park_time_nanos: 100,
            max_park_time_nanos: 100_000,
            sleep_time_millis: 5,
            draw: DrawPolicy::Uniform,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn build(&self) -> Result<Box<dyn OperationSimulator>, BenchError> {
        Ok(match self.kind {
            SimulatorKind::Park => Box::new(RandomParkSimulator::with_options(
                self.min_park_time_nanos,
                self.max_park_time_nanos,
                self.draw,
                self.seed,
            )?),
            SimulatorKind::Sleep => Box::new(SleepSimulator::from_millis(self.sleep_time_millis)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub iterations: u64,
    pub scale_factor: f64,
    pub aborted_samples: AbortedSamplePolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            scale_factor: 1000.0,
            aborted_samples: AbortedSamplePolicy::Discard,
        }
    }
}

impl RunConfig {
    pub fn build(&self) -> Result<BenchmarkRun, BenchError> {
        Ok(BenchmarkRun::new(self.iterations, self.scale_factor)?
            .with_aborted_samples(self.aborted_samples))
    }
}

/// Pacing parameters for the separate high-volume messaging benchmark.
///
/// Carried and validated here so that benchmark never depends on
/// process-wide constants; this crate does not drive any traffic itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessagingConfig {
    pub max_executions_per_second: u64,
    pub num_messages: u64,
    pub channel: String,
    pub stream_id: i32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_executions_per_second: 100_000,
            num_messages: 200_000,
            channel: "aeron:ipc".to_string(),
            stream_id: 1001,
        }
    }
}

impl MessagingConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.max_executions_per_second == 0 {
            return Err(BenchError::InvalidMessagingConfig {
                detail: "max_executions_per_second must be positive".to_string(),
            });
        }
        if self.num_messages == 0 {
            return Err(BenchError::InvalidMessagingConfig {
                detail: "num_messages must be positive".to_string(),
            });
        }
        if self.channel.trim().is_empty() {
            return Err(BenchError::InvalidMessagingConfig {
                detail: "channel must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Interval between sends that holds the target rate, at nanosecond
    /// resolution. Zero if the rate is zero.
    pub fn expected_time_between_calls(&self) -> Duration {
        if self.max_executions_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(1_000_000_000 / self.max_executions_per_second)
    }
}

impl Config {
    /// `<config_dir>/jitterbench/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, which must exist, or else from the default location
    /// if a file is there, or else fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, BenchError> {
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(BenchError::ConfigNotFound {
                        path: path.to_path_buf(),
                    });
                }
                Self::from_file(path)
            }
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BenchError> {
        let contents = std::fs::read_to_string(path).map_err(|source| BenchError::ConfigReadError {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&contents, path)
    }

    /// Parse TOML text; `origin` only labels errors.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, BenchError> {
        toml::from_str(contents).map_err(|e| BenchError::ConfigParseError {
            path: origin.to_path_buf(),
            detail: e.message().to_string(),
        })
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check every section by building it, without running anything.
    pub fn validate(&self) -> Result<(), BenchError> {
        self.histogram.build()?;
        self.simulator.build()?;
        self.run.build()?;
        self.messaging.validate()
    }
}
