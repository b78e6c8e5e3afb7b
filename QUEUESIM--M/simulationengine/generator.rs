use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    actor::{ActorControl, ActorHandle},
    customer::Customer,
    delay::DelaySource,
    error::SimulationError,
    helper::SimulationTelemetry,
    queue_manager::ServiceQueueManager,
};

/// Thread name of the generator actor.
pub const GENERATOR_THREAD: &str = "customer-generator";

/// Progress shared between the generator and whoever observes it.
#[derive(Debug, Default)]
pub struct GeneratorProgress {
    generated: AtomicU64,
    finished: AtomicBool,
}

impl GeneratorProgress {
    /// Customers generated so far.
    #[must_use]
    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Acquire)
    }

    /// Whether the target was reached, the queues drained and the cashiers suspended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Producer actor creating arrivals and routing each to the shortest queue.
pub struct CustomerGenerator {
    manager: Arc<ServiceQueueManager>,
    control: Arc<ActorControl>,
    delay: Box<dyn DelaySource>,
    target: u64,
    progress: Arc<GeneratorProgress>,
    telemetry: Option<SimulationTelemetry>,
}

impl CustomerGenerator {
    /// Creates a generator that will produce `target` customers into `manager`.
    #[must_use]
    pub fn new(
        manager: Arc<ServiceQueueManager>,
        delay: Box<dyn DelaySource>,
        target: u64,
        telemetry: Option<SimulationTelemetry>,
    ) -> Self {
        Self {
            manager,
            control: Arc::new(ActorControl::new()),
            delay,
            target,
            progress: Arc::new(GeneratorProgress::default()),
            telemetry,
        }
    }

    /// Control shared with the owner.
    #[must_use]
    pub fn control(&self) -> Arc<ActorControl> {
        Arc::clone(&self.control)
    }

    /// Progress shared with the owner.
    #[must_use]
    pub fn progress(&self) -> Arc<GeneratorProgress> {
        Arc::clone(&self.progress)
    }

    /// Starts the generator on its own thread.
    pub fn spawn(self) -> Result<ActorHandle, SimulationError> {
        let control = self.control();
        ActorHandle::spawn(GENERATOR_THREAD, control, move || self.run())
    }

    /// Actor loop: generate up to the target, drain, suspend the cashiers, finish.
    pub fn run(mut self) {
        self.log(LogLevel::Info, "generator.started", &json!({ "target": self.target }));
        while self.progress.generated() < self.target {
            if !self.control.wait_while_suspended() {
                self.stopped("killed");
                return;
            }
            thread::sleep(self.delay.next_delay());
            if !self.insert_customer() {
                self.stopped("no_queues");
                return;
            }
        }
        self.log(
            LogLevel::Info,
            "generator.target_reached",
            &json!({ "generated": self.progress.generated() }),
        );
        if !self.drain() {
            self.stopped("killed");
            return;
        }
        self.manager.suspend_all_cashiers();
        self.progress.finished.store(true, Ordering::Release);
        self.log(
            LogLevel::Info,
            "generator.drained",
            &json!({ "generated": self.progress.generated() }),
        );
    }

    /// Creates one customer and hands it to the shortest queue.
    ///
    /// Returns `false` only when the manager has no queues.
    #[must_use]
    pub fn insert_customer(&self) -> bool {
        let Some(queue) = self.manager.determine_shortest_queue() else {
            return false;
        };
        let id = self.progress.generated();
        queue.insert(Customer::new(id));
        self.progress.generated.store(id + 1, Ordering::Release);
        true
    }

    /// Busy-polls until every queue is empty and no cashier is mid-service.
    /// Returns `false` if killed meanwhile.
    fn drain(&self) -> bool {
        while !self.manager.all_settled() {
            if self.control.is_killed() {
                return false;
            }
            thread::yield_now();
        }
        true
    }

    fn stopped(&self, reason: &str) {
        self.log(
            LogLevel::Info,
            "generator.stopped",
            &json!({ "reason": reason, "generated": self.progress.generated() }),
        );
    }

    fn log(&self, level: LogLevel, message: &str, metadata: &serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}
