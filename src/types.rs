use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which operation simulator a run measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulatorKind {
    /// Busy-wait for a random duration
    Park,
    /// Scheduler-mediated fixed sleep
    Sleep,
}

/// What `Histogram::record` does with a value above the highest trackable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Return `ValueOutOfRange` and leave the histogram untouched
    Reject,
    /// Count the sample at the highest trackable value
    Clamp,
}

/// How the randomized simulator draws its park time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawPolicy {
    /// Unbiased draw over `[min, max)`
    Uniform,
    /// `|rand_i64 % max| + min`, biased and able to reach `min + max - 1`
    LegacyModulo,
}

/// Whether a latency sample from an aborted operation enters the histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortedSamplePolicy {
    Discard,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        draw: DrawPolicy,
        overflow: OverflowPolicy,
    }

    #[test]
    fn policies_use_kebab_case_in_config() {
        let parsed: Wrapper = toml::from_str("draw = \"legacy-modulo\"\noverflow = \"clamp\"").unwrap();
        assert_eq!(parsed.draw, DrawPolicy::LegacyModulo);
        assert_eq!(parsed.overflow, OverflowPolicy::Clamp);
    }

    #[test]
    fn cli_names_match_config_names() {
        let value = DrawPolicy::LegacyModulo.to_possible_value().unwrap();
        assert_eq!(value.get_name(), "legacy-modulo");
        let value = AbortedSamplePolicy::Discard.to_possible_value().unwrap();
        assert_eq!(value.get_name(), "discard");
    }
}
