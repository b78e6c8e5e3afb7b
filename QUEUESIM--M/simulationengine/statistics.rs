use std::{
    iter::Sum,
    ops::{Add, AddAssign},
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Running totals for one queue, or the sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Customers removed from the queue by its cashier.
    pub customers_served: u64,
    /// Accumulated wait time, in milliseconds.
    pub total_wait_ms: f64,
    /// Accumulated service time, in milliseconds.
    pub total_service_ms: f64,
    /// Accumulated cashier idle time, in milliseconds.
    pub total_idle_ms: f64,
}

impl Statistics {
    /// Mean wait per served customer; 0 when none were served.
    #[must_use]
    pub fn average_wait_ms(&self) -> f64 {
        self.per_customer(self.total_wait_ms)
    }

    /// Mean service time per served customer; 0 when none were served.
    #[must_use]
    pub fn average_service_ms(&self) -> f64 {
        self.per_customer(self.total_service_ms)
    }

    /// Idle time per served customer; 0 when none were served.
    #[must_use]
    pub fn average_idle_ms(&self) -> f64 {
        self.per_customer(self.total_idle_ms)
    }

    #[allow(clippy::cast_precision_loss)]
    fn per_customer(&self, total: f64) -> f64 {
        if self.customers_served == 0 {
            0.0
        } else {
            total / self.customers_served as f64
        }
    }
}

impl Add for Statistics {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, rhs: Self) {
        self.customers_served += rhs.customers_served;
        self.total_wait_ms += rhs.total_wait_ms;
        self.total_service_ms += rhs.total_service_ms;
        self.total_idle_ms += rhs.total_idle_ms;
    }
}

impl Sum for Statistics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Duration as fractional milliseconds.
#[must_use]
pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
