use thiserror::Error;

use crate::pipeline::StagePacing;
use crate::ProgrammingLanguage;

/// Default execution speed (delay between auto-steps) in milliseconds.
pub const DEFAULT_EXECUTION_SPEED_MS: u64 = 1000;

/// Program shown when the simulator starts.
pub const DEFAULT_SOURCE: &str = r#"// A simple C example
#include <stdio.h>

int main() {
    int a = 5;
    int b = 3;
    int sum = a + b;
    printf("result: %d\n", sum);
    return 0;
}"#;

/// Configuration rejected by [`SimulatorConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Randomized pacing with an inverted range.
    #[error("stage pacing range is inverted: min {min_ms} ms > max {max_ms} ms")]
    InvertedPacing {
        /// Lower bound.
        min_ms: u64,
        /// Upper bound.
        max_ms: u64,
    },
    /// Initial source is empty.
    #[error("initial source code is empty")]
    EmptySource,
}

/// Top-level simulator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulatorConfig {
    /// Source code loaded at start and on reset.
    pub initial_source: String,
    /// Language selected at start.
    pub language: ProgrammingLanguage,
    /// Delay between automatic steps in milliseconds.
    pub execution_speed_ms: u64,
    /// Simulated compilation pacing.
    pub stage_pacing: StagePacing,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_source: DEFAULT_SOURCE.to_owned(),
            language: ProgrammingLanguage::C,
            execution_speed_ms: DEFAULT_EXECUTION_SPEED_MS,
            stage_pacing: StagePacing::Immediate,
        }
    }
}

impl SimulatorConfig {
    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_source.trim().is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if let StagePacing::Randomized { min_ms, max_ms, .. } = self.stage_pacing {
            if min_ms > max_ms {
                return Err(ConfigError::InvertedPacing { min_ms, max_ms });
            }
        }
        Ok(())
    }
}
