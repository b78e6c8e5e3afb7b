use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    actor::{ActorControl, ActorHandle},
    customer::Customer,
    delay::DelaySource,
    error::SimulationError,
    helper::SimulationTelemetry,
    service_queue::ServiceQueue,
    statistics::millis,
};

/// Worker actor serving one queue.
///
/// States: running and suspended, with killed terminal from either. Kill is observed only
/// at the top of an iteration, so an in-flight service delay always completes.
pub struct Cashier {
    queue: Arc<ServiceQueue>,
    control: Arc<ActorControl>,
    delay: Box<dyn DelaySource>,
    telemetry: Option<SimulationTelemetry>,
    idle_since: Option<Instant>,
}

impl Cashier {
    /// Creates a cashier bound to `queue`.
    #[must_use]
    pub fn new(
        queue: Arc<ServiceQueue>,
        delay: Box<dyn DelaySource>,
        telemetry: Option<SimulationTelemetry>,
    ) -> Self {
        Self {
            queue,
            control: Arc::new(ActorControl::new()),
            delay,
            telemetry,
            idle_since: None,
        }
    }

    /// Control shared with the owner and the manager.
    #[must_use]
    pub fn control(&self) -> Arc<ActorControl> {
        Arc::clone(&self.control)
    }

    /// Thread name for this cashier.
    #[must_use]
    pub fn thread_name(&self) -> String {
        format!("cashier-{}", self.queue.index())
    }

    /// Starts the cashier on its own thread.
    pub fn spawn(self) -> Result<ActorHandle, SimulationError> {
        let name = self.thread_name();
        let control = self.control();
        ActorHandle::spawn(name, control, move || self.run())
    }

    /// Actor loop. Returns once killed.
    pub fn run(mut self) {
        self.log(LogLevel::Info, "cashier.started", &json!({ "queue": self.queue.index() }));
        let control = Arc::clone(&self.control);
        let telemetry = self.telemetry.clone();
        let queue_index = self.queue.index();
        while control.wait_while_suspended_with(|| {
            if let Some(tel) = &telemetry {
                let _ = tel.log(LogLevel::Debug, "cashier.wakeup", &json!({ "queue": queue_index }));
            }
        }) {
            if self.step().is_none() {
                thread::yield_now();
            }
        }
        self.log(
            LogLevel::Info,
            "cashier.stopped",
            &json!({
                "queue": queue_index,
                "served": self.queue.customers_served(),
            }),
        );
    }

    /// One loop iteration past the suspension gate.
    ///
    /// On an empty queue, opens an idle period (if none is open) and returns `None`.
    /// Otherwise serves the oldest customer and returns it; the queue stays in service
    /// until every total for that customer is recorded.
    pub fn step(&mut self) -> Option<Customer> {
        if self.queue.is_empty() {
            self.idle_since.get_or_insert_with(Instant::now);
            return None;
        }
        let mut customer = self.queue.serve()?;
        let service = self.delay.next_delay();
        thread::sleep(service);
        self.record_service(&mut customer, service);
        if let Some(since) = self.idle_since.take() {
            self.queue.add_idle_time(millis(since.elapsed()));
        }
        self.queue.finish_service();
        Some(customer)
    }

    /// Wait is read after the service delay, so the delay is subtracted back out.
    fn record_service(&self, customer: &mut Customer, service: Duration) {
        let wait = customer.wait_time().saturating_sub(service);
        self.queue.add_wait_time(millis(wait));
        customer.set_service_time(service);
        self.queue.add_service_time(millis(service));
    }

    /// Whether an idle period is currently open.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.idle_since.is_some()
    }

    fn log(&self, level: LogLevel, message: &str, metadata: &serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}
