use thiserror::Error;

/// Rejected configuration snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field that must be positive was zero.
    #[error("{field} must be a positive integer")]
    ZeroValue {
        /// Offending field name.
        field: &'static str,
    },
    /// More cashiers than the manager can hold queues for.
    #[error("cashier count {requested} exceeds the maximum of {max}")]
    TooManyCashiers {
        /// Requested cashier count.
        requested: usize,
        /// Queue capacity of the manager.
        max: usize,
    },
}

/// Errors surfaced by the simulation core.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Start was called with an invalid snapshot; the previous run is untouched.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// A queue index outside the configured set.
    #[error("queue index {index} out of range ({count} queues configured)")]
    QueueIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of configured queues.
        count: usize,
    },
    /// The manager cannot hold the requested number of queues.
    #[error("cannot hold {requested} queues (capacity {max})")]
    CapacityExceeded {
        /// Queues that would exist after the request.
        requested: usize,
        /// Fixed capacity.
        max: usize,
    },
    /// The OS refused to start an actor thread.
    #[error("failed to spawn {actor} thread: {source}")]
    Spawn {
        /// Thread name.
        actor: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
