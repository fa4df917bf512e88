use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which exploration policy a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TunerKind {
    /// Tuning disabled; one fixed empty configuration, no reports
    NoOp,
    /// Exhaustive walk over every knob candidate
    Grid,
}

/// Configuration for a tuning session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Enable tuning (if false, the no-op tuner is used)
    pub enabled: bool,

    /// Maximum number of speculative compilations awaiting feedback
    pub max_in_flight: usize,

    /// Number of configurations a session tries before stopping
    pub iterations: usize,

    /// Number of timed invocations recorded per configuration
    pub samples: usize,

    /// Where compiled modules are dumped as textual IR (None = no dump)
    pub dump_path: Option<PathBuf>,

    /// Where the best-first JSON report is written (None = no report)
    pub stats_path: Option<PathBuf>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_in_flight: 1,
            iterations: 16,
            samples: 5,
            dump_path: None,
            stats_path: None,
        }
    }
}

impl TunerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TUNEJIT_TUNER_ENABLED") {
            config.enabled = val.parse().unwrap_or(true);
        }

        if let Ok(val) = std::env::var("TUNEJIT_MAX_IN_FLIGHT")
            && let Ok(count) = val.parse::<usize>()
        {
            config.max_in_flight = count.max(1);
        }

        if let Ok(val) = std::env::var("TUNEJIT_ITERATIONS")
            && let Ok(count) = val.parse::<usize>()
        {
            config.iterations = count;
        }

        if let Ok(val) = std::env::var("TUNEJIT_SAMPLES")
            && let Ok(count) = val.parse::<usize>()
        {
            config.samples = count.max(1);
        }

        if let Ok(path) = std::env::var("TUNEJIT_DUMP_IR")
            && !path.is_empty()
        {
            config.dump_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("TUNEJIT_STATS")
            && !path.is_empty()
        {
            config.stats_path = Some(PathBuf::from(path));
        }

        config
    }

    pub fn tuner_kind(&self) -> TunerKind {
        if self.enabled {
            TunerKind::Grid
        } else {
            TunerKind::NoOp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TunerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_in_flight, 1);
        assert!(config.dump_path.is_none());
        assert_eq!(config.tuner_kind(), TunerKind::Grid);
    }

    #[test]
    fn test_disabled_selects_noop() {
        let config = TunerConfig {
            enabled: false,
            ..TunerConfig::default()
        };
        assert_eq!(config.tuner_kind(), TunerKind::NoOp);
    }
}
