use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, queue_manager::MAX_QUEUES};

/// Configuration snapshot for one run.
///
/// All values are expected to be positive; [`SimulationConfig::validate`] enforces it and
/// the controller refuses to start on a failing snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Number of cashiers, one queue each (1..=5).
    pub cashier_count: usize,
    /// Exclusive upper bound of a simulated service delay, in milliseconds.
    pub max_service_time_ms: u64,
    /// Exclusive upper bound of the gap between arrivals, in milliseconds.
    pub max_generation_time_ms: u64,
    /// Customers generated before the run drains and completes.
    pub customer_count: u64,
}

impl SimulationConfig {
    /// Creates a snapshot without validating it.
    #[must_use]
    pub const fn new(
        cashier_count: usize,
        max_service_time_ms: u64,
        max_generation_time_ms: u64,
        customer_count: u64,
    ) -> Self {
        Self {
            cashier_count,
            max_service_time_ms,
            max_generation_time_ms,
            customer_count,
        }
    }

    /// Checks every field is positive and the cashier count fits the queue capacity.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.cashier_count == 0 {
            return Err(ConfigError::ZeroValue {
                field: "cashier_count",
            });
        }
        if self.cashier_count > MAX_QUEUES {
            return Err(ConfigError::TooManyCashiers {
                requested: self.cashier_count,
                max: MAX_QUEUES,
            });
        }
        if self.max_service_time_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_service_time_ms",
            });
        }
        if self.max_generation_time_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_generation_time_ms",
            });
        }
        if self.customer_count == 0 {
            return Err(ConfigError::ZeroValue {
                field: "customer_count",
            });
        }
        Ok(())
    }

    /// Loads and validates a snapshot from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading simulation config {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }
}

/// Controller-level settings that do not change between runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Period of the statistics tick loop, in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    /// Base seed for every actor's delay stream; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ControllerSettings {
    /// Tick period as a duration.
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Same settings with a fixed seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            seed: None,
        }
    }
}

const fn default_tick_period_ms() -> u64 {
    5
}
