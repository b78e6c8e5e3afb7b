use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{
    actor::ActorControl, error::SimulationError, service_queue::ServiceQueue,
    statistics::Statistics,
};

/// Maximum number of queues (and therefore cashiers) a manager holds.
pub const MAX_QUEUES: usize = 5;

/// Owns the queue set of a run, routes arrivals and aggregates statistics.
///
/// Aggregation reads each queue under that queue's lock in turn; there is no cross-queue
/// snapshot, so totals taken while actors run are eventually consistent.
#[derive(Debug, Default)]
pub struct ServiceQueueManager {
    queues: RwLock<Vec<Arc<ServiceQueue>>>,
    cashiers: RwLock<Vec<Arc<ActorControl>>>,
    totals: Mutex<Statistics>,
}

impl ServiceQueueManager {
    /// Creates a manager with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager holding `count` fresh queues.
    pub fn with_queues(count: usize) -> Result<Self, SimulationError> {
        let manager = Self::new();
        manager.generate_queues(count)?;
        Ok(manager)
    }

    /// Appends `count` empty queues. Fails without change if capacity would be exceeded.
    pub fn generate_queues(&self, count: usize) -> Result<(), SimulationError> {
        let mut queues = self.queues.write();
        let requested = queues.len() + count;
        if requested > MAX_QUEUES {
            return Err(SimulationError::CapacityExceeded {
                requested,
                max: MAX_QUEUES,
            });
        }
        let start = queues.len();
        queues.extend((start..requested).map(|index| Arc::new(ServiceQueue::new(index))));
        Ok(())
    }

    /// Drops every queue.
    pub fn clean_queues(&self) {
        self.queues.write().clear();
    }

    /// Number of configured queues.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.queues.read().len()
    }

    /// Queue at `index`.
    pub fn queue(&self, index: usize) -> Result<Arc<ServiceQueue>, SimulationError> {
        let queues = self.queues.read();
        queues
            .get(index)
            .cloned()
            .ok_or(SimulationError::QueueIndexOutOfRange {
                index,
                count: queues.len(),
            })
    }

    /// Every configured queue, in index order.
    #[must_use]
    pub fn queues(&self) -> Vec<Arc<ServiceQueue>> {
        self.queues.read().clone()
    }

    /// Current length of each queue, in index order.
    #[must_use]
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.read().iter().map(|queue| queue.len()).collect()
    }

    /// Whether every queue is empty.
    #[must_use]
    pub fn all_empty(&self) -> bool {
        self.queues.read().iter().all(|queue| queue.is_empty())
    }

    /// Whether every queue is empty with no service in flight.
    #[must_use]
    pub fn all_settled(&self) -> bool {
        self.queues.read().iter().all(|queue| queue.is_settled())
    }

    /// First queue with the minimum length; ties go to the lowest index.
    ///
    /// `None` only when no queues are configured.
    #[must_use]
    pub fn determine_shortest_queue(&self) -> Option<Arc<ServiceQueue>> {
        let queues = self.queues.read();
        let mut shortest: Option<(&Arc<ServiceQueue>, usize)> = None;
        for queue in queues.iter() {
            let len = queue.len();
            if shortest.map_or(true, |(_, best)| len < best) {
                shortest = Some((queue, len));
            }
        }
        shortest.map(|(queue, _)| Arc::clone(queue))
    }

    /// Binds the cashier controls used by [`ServiceQueueManager::suspend_all_cashiers`].
    pub fn set_cashiers(&self, cashiers: Vec<Arc<ActorControl>>) {
        *self.cashiers.write() = cashiers;
    }

    /// Suspends every bound cashier.
    pub fn suspend_all_cashiers(&self) {
        for cashier in self.cashiers.read().iter() {
            cashier.suspend();
        }
    }

    /// Recomputes the manager totals from scratch and returns them.
    pub fn compute_statistics(&self) -> Statistics {
        let totals: Statistics = self
            .queues
            .read()
            .iter()
            .map(|queue| queue.statistics())
            .sum();
        *self.totals.lock() = totals;
        totals
    }

    /// Totals from the last [`ServiceQueueManager::compute_statistics`].
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        *self.totals.lock()
    }

    /// Zeroes the manager totals.
    pub fn reset_statistics(&self) {
        *self.totals.lock() = Statistics::default();
    }

    /// Zeroes the counters of every queue and the manager totals.
    pub fn reset_all_statistics(&self) {
        for queue in self.queues.read().iter() {
            queue.reset_statistics();
        }
        self.reset_statistics();
    }

    /// Served count from the last computation.
    #[must_use]
    pub fn customers_served(&self) -> u64 {
        self.totals.lock().customers_served
    }

    /// Average wait from the last computation; 0 when nobody was served.
    #[must_use]
    pub fn average_wait_ms(&self) -> f64 {
        self.totals.lock().average_wait_ms()
    }

    /// Average service time from the last computation; 0 when nobody was served.
    #[must_use]
    pub fn average_service_ms(&self) -> f64 {
        self.totals.lock().average_service_ms()
    }

    /// Average idle time from the last computation; 0 when nobody was served.
    #[must_use]
    pub fn average_idle_ms(&self) -> f64 {
        self.totals.lock().average_idle_ms()
    }
}
