use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Telemetry builder for the simulation engine.
pub struct SimulationTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl SimulationTelemetryBuilder {
    /// Creates a new builder scoped to a module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            publishers: Vec::new(),
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Adds an event publisher. Every event goes to each publisher in turn.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Builds telemetry.
    pub fn build(self) -> Result<SimulationTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(Arc::new(JsonLogger::with_min_level(path, self.min_level)?)),
            None => None,
        };
        Ok(SimulationTelemetry {
            module: self.module,
            logger,
            publishers: self.publishers,
        })
    }
}

/// Telemetry handle shared across the controller and its actors.
///
/// Clones share the same log file and publishers; [`SimulationTelemetry::scoped`] only
/// changes the module label written on each record.
#[derive(Clone)]
pub struct SimulationTelemetry {
    module: String,
    logger: Option<Arc<JsonLogger>>,
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for SimulationTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationTelemetry")
            .field("module", &self.module)
            .field("logging", &self.logger.is_some())
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl SimulationTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> SimulationTelemetryBuilder {
        SimulationTelemetryBuilder::new(module)
    }

    /// Same sinks, different module label.
    #[must_use]
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            logger: self.logger.clone(),
            publishers: self.publishers.clone(),
        }
    }

    /// Logs a message with JSON metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: &Value) -> Result<()> {
        if let Some(logger) = &self.logger {
            if logger.enabled(level) {
                logger.log(&LogRecord::new(&self.module, level, message).with_metadata(metadata))?;
            }
        }
        Ok(())
    }

    /// Emits an event.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if self.publishers.is_empty() {
            return Ok(());
        }
        let record = EventRecord::new(&self.module, event_type, payload);
        for publisher in &self.publishers {
            publisher.publish(record.clone())?;
        }
        Ok(())
    }
}

/// Generates a random seed for simulation runs.
#[must_use]
pub fn random_seed() -> u64 {
    rand::thread_rng().gen()
}

/// Returns a reproducible RNG.
#[must_use]
pub fn seeded_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Derives a per-actor seed so actors sharing a base seed draw independent streams.
#[must_use]
pub const fn actor_seed(base: u64, slot: u64) -> u64 {
    base ^ slot.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(4));
        let log_path = tmp.path().join("sim.log");
        let telemetry = SimulationTelemetry::builder("controller")
            .log_path(&log_path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "controller.run.started", &json!({ "cashiers": 3 }))
            .unwrap();
        telemetry
            .event("simulation.completed", json!({ "served": 10 }))
            .unwrap();
        assert!(std::fs::read_to_string(&log_path)
            .unwrap()
            .contains("controller.run.started"));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn events_reach_every_publisher() {
        let first = Arc::new(MemoryEventBus::new(4));
        let second = Arc::new(MemoryEventBus::new(4));
        let mut rx = second.subscribe();
        let telemetry = SimulationTelemetry::builder("controller")
            .event_publisher(first.clone())
            .event_publisher(second.clone())
            .build()
            .unwrap();
        telemetry.event("simulation.started", json!({})).unwrap();
        assert_eq!(first.event_types(), vec!["simulation.started".to_string()]);
        let received = rx.try_recv().unwrap();
        assert_eq!(received.id, first.snapshot()[0].id);
    }

    #[test]
    fn scoped_telemetry_shares_sinks() {
        let tmp = tempdir().unwrap();
        let log_path = tmp.path().join("sim.log");
        let telemetry = SimulationTelemetry::builder("controller")
            .log_path(&log_path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        let cashier = telemetry.scoped("cashier-0");
        cashier
            .log(LogLevel::Info, "cashier.started", &json!({}))
            .unwrap();
        cashier
            .log(LogLevel::Debug, "cashier.wakeup", &json!({}))
            .unwrap();
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("\"module\":\"cashier-0\""));
        assert!(!content.contains("cashier.wakeup"));
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let a: u64 = seeded_rng(7).gen();
        let b: u64 = seeded_rng(7).gen();
        assert_eq!(a, b);
        assert_ne!(actor_seed(7, 0), actor_seed(7, 1));
    }
}
