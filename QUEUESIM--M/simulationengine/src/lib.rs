#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! QueueSim engine – concurrent multi-server queue simulation with cashier and generator
//! actors, shortest-queue routing, pause/resume/kill control and live statistics.

/// Telemetry and seeding helpers.
#[path = "../helper.rs"]
pub mod helper;

/// Error types.
#[path = "../error.rs"]
pub mod error;

/// Run configuration and controller settings.
#[path = "../config.rs"]
pub mod config;

/// Random and fixed delay sources.
#[path = "../delay.rs"]
pub mod delay;

/// Customer records.
#[path = "../customer.rs"]
pub mod customer;

/// Statistics accumulators.
#[path = "../statistics.rs"]
pub mod statistics;

/// Thread-safe FIFO service queue.
#[path = "../service_queue.rs"]
pub mod service_queue;

/// Queue set ownership, routing and aggregation.
#[path = "../queue_manager.rs"]
pub mod queue_manager;

/// Suspend/resume/kill gate and actor thread handles.
#[path = "../actor.rs"]
pub mod actor;

/// Cashier worker actor.
#[path = "../cashier.rs"]
pub mod cashier;

/// Customer generator producer actor.
#[path = "../generator.rs"]
pub mod generator;

/// Run lifecycle and tick loop.
#[path = "../controller.rs"]
pub mod controller;

pub use config::{ControllerSettings, SimulationConfig};
pub use controller::{
    QueueSnapshot, RunState, SimulationController, SimulationSnapshot, StartOutcome,
};
pub use error::{ConfigError, SimulationError};
pub use helper::{SimulationTelemetry, SimulationTelemetryBuilder};
pub use queue_manager::{ServiceQueueManager, MAX_QUEUES};
pub use statistics::Statistics;
