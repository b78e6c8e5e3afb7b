use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{customer::Customer, statistics::Statistics};

/// FIFO of customers bound to a single cashier, with running totals.
///
/// Every mutation happens under the queue's own lock. In a run the generator is the only
/// inserter and the bound cashier the only remover.
#[derive(Debug)]
pub struct ServiceQueue {
    index: usize,
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    customers: VecDeque<Customer>,
    stats: Statistics,
    in_service: bool,
}

impl ServiceQueue {
    /// Creates an empty queue at position `index` in its manager.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Position of this queue in its manager.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Appends a customer behind everyone already waiting.
    pub fn insert(&self, customer: Customer) {
        self.state.lock().customers.push_back(customer);
    }

    /// Removes the oldest customer and counts it as served.
    ///
    /// Returns `None` on an empty queue without touching the served count. A returned
    /// customer leaves the queue in service until [`ServiceQueue::finish_service`].
    pub fn serve(&self) -> Option<Customer> {
        let mut state = self.state.lock();
        let customer = state.customers.pop_front()?;
        state.stats.customers_served += 1;
        state.in_service = true;
        Some(customer)
    }

    /// Marks the service started by the last [`ServiceQueue::serve`] as recorded.
    pub fn finish_service(&self) {
        self.state.lock().in_service = false;
    }

    /// Whether a served customer's times are still being recorded.
    #[must_use]
    pub fn is_in_service(&self) -> bool {
        self.state.lock().in_service
    }

    /// Empty and no service in flight: the totals are final until the next insert.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        let state = self.state.lock();
        state.customers.is_empty() && !state.in_service
    }

    /// Customers currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().customers.len()
    }

    /// Whether nobody is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().customers.is_empty()
    }

    /// Adds cashier idle time, in milliseconds.
    pub fn add_idle_time(&self, ms: f64) {
        self.state.lock().stats.total_idle_ms += ms;
    }

    /// Adds service time, in milliseconds.
    pub fn add_service_time(&self, ms: f64) {
        self.state.lock().stats.total_service_ms += ms;
    }

    /// Adds wait time, in milliseconds.
    pub fn add_wait_time(&self, ms: f64) {
        self.state.lock().stats.total_wait_ms += ms;
    }

    /// Zeroes the served count and the three time totals. Waiting customers stay.
    pub fn reset_statistics(&self) {
        self.state.lock().stats = Statistics::default();
    }

    /// Copy of the current totals.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.state.lock().stats
    }

    /// Served count only.
    #[must_use]
    pub fn customers_served(&self) -> u64 {
        self.state.lock().stats.customers_served
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_in_arrival_order() {
        let queue = ServiceQueue::new(0);
        for id in 0..25 {
            queue.insert(Customer::new(id));
        }
        let served: Vec<u64> = std::iter::from_fn(|| queue.serve().map(|c| c.id())).collect();
        assert_eq!(served, (0..25).collect::<Vec<_>>());
        assert_eq!(queue.customers_served(), 25);
    }

    #[test]
    fn interleaved_inserts_keep_fifo() {
        let queue = ServiceQueue::new(0);
        queue.insert(Customer::new(1));
        queue.insert(Customer::new(2));
        assert_eq!(queue.serve().map(|c| c.id()), Some(1));
        queue.insert(Customer::new(3));
        assert_eq!(queue.serve().map(|c| c.id()), Some(2));
        assert_eq!(queue.serve().map(|c| c.id()), Some(3));
    }

    #[test]
    fn serving_empty_queue_is_a_no_op() {
        let queue = ServiceQueue::new(2);
        assert!(queue.serve().is_none());
        assert_eq!(queue.customers_served(), 0);
        assert!(queue.is_empty());
        assert_eq!(queue.index(), 2);
    }

    #[test]
    fn served_customer_stays_in_service_until_finished() {
        let queue = ServiceQueue::new(0);
        assert!(queue.is_settled());
        queue.insert(Customer::new(0));
        assert!(!queue.is_settled());
        let _ = queue.serve();
        assert!(queue.is_empty());
        assert!(queue.is_in_service());
        assert!(!queue.is_settled());
        queue.finish_service();
        assert!(queue.is_settled());
    }

    #[test]
    fn reset_clears_counters_only() {
        let queue = ServiceQueue::new(0);
        queue.insert(Customer::new(0));
        queue.insert(Customer::new(1));
        let _ = queue.serve();
        queue.add_idle_time(3.0);
        queue.add_service_time(2.0);
        queue.add_wait_time(1.5);
        assert_eq!(
            queue.statistics(),
            Statistics {
                customers_served: 1,
                total_wait_ms: 1.5,
                total_service_ms: 2.0,
                total_idle_ms: 3.0,
            }
        );
        queue.reset_statistics();
        assert_eq!(queue.statistics(), Statistics::default());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn concurrent_producer_and_consumer_keep_order() {
        use std::sync::Arc;

        let queue = Arc::new(ServiceQueue::new(0));
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for id in 0..1_000 {
                    queue.insert(Customer::new(id));
                }
            })
        };
        let mut seen = Vec::with_capacity(1_000);
        while seen.len() < 1_000 {
            match queue.serve() {
                Some(customer) => seen.push(customer.id()),
                None => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(queue.customers_served(), 1_000);
    }
}
