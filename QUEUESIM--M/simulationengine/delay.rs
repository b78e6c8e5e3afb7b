use std::time::Duration;

use rand::{rngs::SmallRng, Rng};

use crate::helper::{random_seed, seeded_rng};

/// Source of simulated delays, owned by an actor.
pub trait DelaySource: Send {
    /// Next delay to sleep for.
    fn next_delay(&mut self) -> Duration;
}

/// Delays drawn uniformly from `[0, max)` milliseconds.
#[derive(Debug, Clone)]
pub struct UniformDelay {
    max_ms: u64,
    rng: SmallRng,
}

impl UniformDelay {
    /// Creates a seeded source.
    #[must_use]
    pub fn new(max_ms: u64, seed: u64) -> Self {
        Self {
            max_ms,
            rng: seeded_rng(seed),
        }
    }

    /// Creates a source with a random seed.
    #[must_use]
    pub fn unseeded(max_ms: u64) -> Self {
        Self::new(max_ms, random_seed())
    }
}

impl DelaySource for UniformDelay {
    fn next_delay(&mut self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..self.max_ms))
    }
}

/// Always the same delay. Useful for deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelaySource for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}
