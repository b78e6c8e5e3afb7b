use std::time::{Duration, Instant};

/// An arrival waiting in a service queue.
#[derive(Debug, Clone)]
pub struct Customer {
    id: u64,
    entry_time: Instant,
    service_time: Option<Duration>,
}

impl Customer {
    /// Creates a customer entering now.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self::entered_at(id, Instant::now())
    }

    /// Creates a customer with an explicit entry instant.
    #[must_use]
    pub const fn entered_at(id: u64, entry_time: Instant) -> Self {
        Self {
            id,
            entry_time,
            service_time: None,
        }
    }

    /// Sequence number assigned by the generator.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// When the customer arrived.
    #[must_use]
    pub const fn entry_time(&self) -> Instant {
        self.entry_time
    }

    /// Records how long service took. A second call overwrites the first.
    pub fn set_service_time(&mut self, service_time: Duration) {
        self.service_time = Some(service_time);
    }

    /// Service duration, once served.
    #[must_use]
    pub const fn service_time(&self) -> Option<Duration> {
        self.service_time
    }

    /// Time elapsed since arrival, measured at the moment of the call.
    ///
    /// Not frozen at dequeue: a cashier reading this after its service delay gets a value
    /// that includes the delay.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        self.entry_time.elapsed()
    }
}
