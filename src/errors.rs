use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("Invalid histogram range: highest trackable value {highest} must exceed lowest discernible value {lowest} (lowest must be at least 1)")]
    InvalidHistogramRange { lowest: u64, highest: u64 },

    #[error("Lowest discernible value {lowest} is too coarse to track with {digits} significant digits in 64 bits; lower it or reduce the digits")]
    UnsupportedPrecision { lowest: u64, digits: u8 },

    #[error("Significant value digits must be between 0 and 5, got {digits}")]
    InvalidSignificantDigits { digits: u8 },

    #[error("Invalid park range: max park time {max}ns must exceed min park time {min}ns and fit in a signed 64-bit value")]
    InvalidParkRange { min: u64, max: u64 },

    #[error("Invalid run configuration: {detail}")]
    InvalidRunConfig { detail: String },

    #[error("Invalid messaging configuration: {detail}")]
    InvalidMessagingConfig { detail: String },

    #[error("Config file not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to read config file {path}: {source}")]
    ConfigReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParseError { path: PathBuf, detail: String },

    #[error("Value {value} exceeds highest trackable value {highest}")]
    ValueOutOfRange { value: u64, highest: u64 },

    #[error("Clock went backwards: operation ended at {end}ns before it started at {start}ns")]
    ClockRegression { start: u64, end: u64 },

    #[error("Simulator lock poisoned by a panicking caller")]
    SimulatorPoisoned,

    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

impl BenchError {
    /// True for errors raised while building components, before any run starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BenchError::InvalidHistogramRange { .. }
                | BenchError::InvalidSignificantDigits { .. }
                | BenchError::UnsupportedPrecision { .. }
                | BenchError::InvalidParkRange { .. }
                | BenchError::InvalidRunConfig { .. }
                | BenchError::InvalidMessagingConfig { .. }
                | BenchError::ConfigNotFound { .. }
                | BenchError::ConfigReadError { .. }
                | BenchError::ConfigParseError { .. }
        )
    }
}
