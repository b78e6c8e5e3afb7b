use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    actor::{ActorControl, ActorHandle},
    cashier::Cashier,
    config::{ControllerSettings, SimulationConfig},
    delay::{DelaySource, UniformDelay},
    error::SimulationError,
    generator::{CustomerGenerator, GeneratorProgress},
    helper::{actor_seed, SimulationTelemetry},
    queue_manager::{ServiceQueueManager, MAX_QUEUES},
    statistics::Statistics,
};

/// Thread name of the statistics tick loop.
pub const TICK_THREAD: &str = "simulation-tick";

/// Control state of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Actors and tick loop running.
    Running,
    /// Suspended by [`SimulationController::pause`].
    Paused,
    /// Suspended after the generator finished and the queues drained.
    Completed,
    /// Actors told to exit; the run cannot be resumed.
    Killed,
}

/// What [`SimulationController::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Old actors killed, new queue set and actors created.
    Rebuilt,
    /// Same configuration as the live run; it was resumed instead.
    Resumed,
}

/// Length and totals of one queue at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue index.
    pub index: usize,
    /// Customers waiting.
    pub length: usize,
    /// Running totals.
    pub statistics: Statistics,
}

/// Presentation view published by the tick loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    /// Identifier of the run the snapshot belongs to.
    pub run_id: Option<Uuid>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Run state, `None` before the first start.
    pub state: Option<RunState>,
    /// Active configuration.
    pub config: Option<SimulationConfig>,
    /// Customers generated so far.
    pub generated: u64,
    /// Generator finished flag.
    pub finished: bool,
    /// Per-queue view in index order.
    pub queues: Vec<QueueSnapshot>,
    /// Sum over all queues.
    pub aggregate: Statistics,
    /// Queue selected for detailed inspection.
    pub inspected_queue: usize,
    /// Totals of the inspected queue.
    pub inspected: Option<Statistics>,
}

impl SimulationSnapshot {
    fn empty() -> Self {
        Self {
            run_id: None,
            taken_at: Utc::now(),
            state: None,
            config: None,
            generated: 0,
            finished: false,
            queues: Vec::new(),
            aggregate: Statistics::default(),
            inspected_queue: 0,
            inspected: None,
        }
    }
}

struct Run {
    id: Uuid,
    config: SimulationConfig,
    manager: Arc<ServiceQueueManager>,
    cashiers: Vec<ActorHandle>,
    generator: ActorHandle,
    progress: Arc<GeneratorProgress>,
    state: RunState,
}

impl Run {
    fn actors(&self) -> impl Iterator<Item = &ActorHandle> {
        std::iter::once(&self.generator).chain(self.cashiers.iter())
    }

    fn suspend_all(&self) {
        self.actors().for_each(ActorHandle::suspend);
    }

    fn resume_all(&self) {
        self.actors().for_each(ActorHandle::resume);
    }

    fn kill_all(&self) {
        self.actors().for_each(ActorHandle::kill);
    }

    fn into_handles(self) -> Vec<ActorHandle> {
        std::iter::once(self.generator).chain(self.cashiers).collect()
    }

    fn summary(&self) -> serde_json::Value {
        json!({
            "run_id": self.id,
            "config": self.config,
            "generated": self.progress.generated(),
            "statistics": self.manager.compute_statistics(),
        })
    }
}

struct Shared {
    settings: ControllerSettings,
    telemetry: Option<SimulationTelemetry>,
    run: Mutex<Option<Run>>,
    retired: Mutex<Vec<ActorHandle>>,
    tick: Arc<ActorControl>,
    snapshot: Mutex<SimulationSnapshot>,
    inspected: AtomicUsize,
}

impl Shared {
    fn log(&self, level: LogLevel, message: &str, metadata: &serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn event(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.event(event_type, payload);
        }
    }

    /// Builds and stores the presentation snapshot. Caller holds the run lock.
    fn publish_snapshot(&self, run: Option<&Run>) {
        let inspected_queue = self.inspected.load(Ordering::Acquire);
        let snapshot = run.map_or_else(
            || SimulationSnapshot {
                inspected_queue,
                ..SimulationSnapshot::empty()
            },
            |run| {
                let queues: Vec<QueueSnapshot> = run
                    .manager
                    .queues()
                    .iter()
                    .map(|queue| QueueSnapshot {
                        index: queue.index(),
                        length: queue.len(),
                        statistics: queue.statistics(),
                    })
                    .collect();
                SimulationSnapshot {
                    run_id: Some(run.id),
                    taken_at: Utc::now(),
                    state: Some(run.state),
                    config: Some(run.config),
                    generated: run.progress.generated(),
                    finished: run.progress.is_finished(),
                    inspected: queues.get(inspected_queue).map(|q| q.statistics),
                    aggregate: run.manager.compute_statistics(),
                    queues,
                    inspected_queue,
                }
            },
        );
        *self.snapshot.lock() = snapshot;
    }

    fn refresh(&self) {
        let run = self.run.lock();
        self.publish_snapshot(run.as_ref());
    }

    /// Flips a finished run to completed and suspends the whole ensemble.
    fn check_completion(&self) {
        let mut slot = self.run.lock();
        let Some(run) = slot.as_mut() else {
            return;
        };
        if run.state != RunState::Running || !run.progress.is_finished() {
            return;
        }
        run.suspend_all();
        run.state = RunState::Completed;
        self.tick.suspend();
        self.publish_snapshot(Some(run));
        let summary = run.summary();
        self.log(LogLevel::Info, "controller.run.completed", &summary);
        self.event("simulation.completed", summary);
    }

    fn tick_loop(&self) {
        let period = self.settings.tick_period();
        while self.tick.wait_while_suspended() {
            self.refresh();
            thread::sleep(period);
            self.check_completion();
        }
    }

    fn resume_run(&self, run: &mut Run) {
        self.tick.resume();
        if run.state != RunState::Paused {
            return;
        }
        run.resume_all();
        run.state = RunState::Running;
        let summary = run.summary();
        self.log(LogLevel::Info, "controller.run.resumed", &summary);
        self.event("simulation.resumed", summary);
    }

    /// Signals every actor of `run` and moves the handles to the retired list.
    fn retire(&self, run: Run) {
        run.kill_all();
        self.retired.lock().extend(run.into_handles());
    }

    /// Joins retired actors whose threads have already exited.
    fn reap_retired(&self) {
        self.retired.lock().retain_mut(|handle| {
            if handle.is_finished() {
                let _ = handle.join();
                false
            } else {
                true
            }
        });
    }
}

/// Builds, runs and observes simulation runs.
///
/// All methods take `&self`; the controller can be shared behind an `Arc` between a
/// presentation layer and other observers.
pub struct SimulationController {
    shared: Arc<Shared>,
    tick_thread: Mutex<Option<ActorHandle>>,
}

impl SimulationController {
    /// Creates a controller with default settings and no telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(ControllerSettings::default(), None)
    }

    /// Creates a controller.
    #[must_use]
    pub fn with_settings(
        settings: ControllerSettings,
        telemetry: Option<SimulationTelemetry>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                telemetry,
                run: Mutex::new(None),
                retired: Mutex::new(Vec::new()),
                tick: Arc::new(ActorControl::new()),
                snapshot: Mutex::new(SimulationSnapshot::empty()),
                inspected: AtomicUsize::new(0),
            }),
            tick_thread: Mutex::new(None),
        }
    }

    /// Settings fixed at construction.
    #[must_use]
    pub fn settings(&self) -> ControllerSettings {
        self.shared.settings
    }

    /// Starts a run for `config`.
    ///
    /// An invalid snapshot is rejected before anything is touched. An unchanged
    /// configuration on a running or paused run resumes it; anything else builds a fresh
    /// queue set and actor set, then kills the current actors. If building fails the
    /// current run is kept.
    pub fn start(&self, config: SimulationConfig) -> Result<StartOutcome, SimulationError> {
        if let Err(err) = config.validate() {
            self.shared.log(
                LogLevel::Warn,
                "controller.start.rejected",
                &json!({ "config": config, "reason": err.to_string() }),
            );
            return Err(err.into());
        }
        let mut slot = self.shared.run.lock();
        if let Some(run) = slot.as_mut() {
            if run.config == config && matches!(run.state, RunState::Running | RunState::Paused) {
                self.shared.resume_run(run);
                return Ok(StartOutcome::Resumed);
            }
        }

        let run = self.build_run(config)?;
        if let Some(old) = slot.replace(run) {
            if old.state != RunState::Killed {
                self.announce_kill(&old);
            }
            self.shared.retire(old);
        }
        self.shared.reap_retired();
        self.shared.inspected.store(0, Ordering::Release);
        let summary = slot.as_ref().map(Run::summary).unwrap_or_default();
        self.shared.publish_snapshot(slot.as_ref());
        drop(slot);

        self.ensure_tick()?;
        self.shared
            .log(LogLevel::Info, "controller.run.started", &summary);
        self.shared.event("simulation.started", summary);
        Ok(StartOutcome::Rebuilt)
    }

    /// Suspends the tick loop, the generator and every cashier. Idempotent.
    pub fn pause(&self) {
        let mut slot = self.shared.run.lock();
        self.shared.tick.suspend();
        let Some(run) = slot.as_mut() else {
            return;
        };
        if run.state != RunState::Running {
            return;
        }
        run.suspend_all();
        run.state = RunState::Paused;
        self.shared.publish_snapshot(Some(run));
        let summary = run.summary();
        self.shared
            .log(LogLevel::Info, "controller.run.paused", &summary);
        self.shared.event("simulation.paused", summary);
    }

    /// Resumes a paused run. Idempotent; no effect on completed or killed runs.
    pub fn resume(&self) {
        let mut slot = self.shared.run.lock();
        if let Some(run) = slot.as_mut() {
            if run.state == RunState::Paused {
                self.shared.resume_run(run);
            }
        }
    }

    /// Tells every actor of the current run to exit at its next loop boundary.
    ///
    /// Does not wait: an actor inside a simulated delay finishes it first. Statistics of
    /// the killed run stay readable until the next start.
    pub fn kill(&self) {
        let mut slot = self.shared.run.lock();
        self.shared.tick.suspend();
        let Some(run) = slot.as_mut() else {
            return;
        };
        if run.state == RunState::Killed {
            return;
        }
        run.kill_all();
        run.state = RunState::Killed;
        self.announce_kill(run);
        self.shared.publish_snapshot(Some(run));
    }

    /// Kills the current run and joins every actor thread and the tick loop.
    ///
    /// Blocks for at most the longest in-flight simulated delay.
    pub fn shutdown(&self) {
        self.kill();
        if let Some(run) = self.shared.run.lock().take() {
            self.shared.retire(run);
        }
        for mut handle in self.shared.retired.lock().drain(..) {
            let _ = handle.join();
        }
        self.stop_tick();
    }

    /// Number of configured queues; 0 before the first start.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.manager().map_or(0, |manager| manager.queue_count())
    }

    /// Customers waiting in queue `index`.
    pub fn queue_length(&self, index: usize) -> Result<usize, SimulationError> {
        Ok(self.queue_manager()?.queue(index)?.len())
    }

    /// Current length of every queue.
    #[must_use]
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.manager()
            .map_or_else(Vec::new, |manager| manager.queue_lengths())
    }

    /// Totals over every queue, recomputed now.
    #[must_use]
    pub fn aggregate_statistics(&self) -> Statistics {
        self.manager()
            .map_or_else(Statistics::default, |manager| manager.compute_statistics())
    }

    /// Totals of queue `index`.
    pub fn queue_statistics(&self, index: usize) -> Result<Statistics, SimulationError> {
        Ok(self.queue_manager()?.queue(index)?.statistics())
    }

    /// Whether the generator of the current run finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared
            .run
            .lock()
            .as_ref()
            .is_some_and(|run| run.progress.is_finished())
    }

    /// Customers generated by the current run.
    #[must_use]
    pub fn generated_count(&self) -> u64 {
        self.shared
            .run
            .lock()
            .as_ref()
            .map_or(0, |run| run.progress.generated())
    }

    /// State of the current run; `None` before the first start.
    #[must_use]
    pub fn run_state(&self) -> Option<RunState> {
        self.shared.run.lock().as_ref().map(|run| run.state)
    }

    /// Configuration of the current run.
    #[must_use]
    pub fn config(&self) -> Option<SimulationConfig> {
        self.shared.run.lock().as_ref().map(|run| run.config)
    }

    /// Selects the queue whose totals the snapshot details.
    pub fn select_queue_for_inspection(&self, index: usize) -> Result<(), SimulationError> {
        let slot = self.shared.run.lock();
        let count = slot.as_ref().map_or(0, |run| run.manager.queue_count());
        if index >= count {
            return Err(SimulationError::QueueIndexOutOfRange { index, count });
        }
        self.shared.inspected.store(index, Ordering::Release);
        self.shared.publish_snapshot(slot.as_ref());
        Ok(())
    }

    /// Queue currently selected for inspection.
    #[must_use]
    pub fn inspected_queue(&self) -> usize {
        self.shared.inspected.load(Ordering::Acquire)
    }

    /// Totals of the inspected queue.
    #[must_use]
    pub fn inspected_statistics(&self) -> Option<Statistics> {
        self.queue_statistics(self.inspected_queue()).ok()
    }

    /// Latest snapshot published by the tick loop (or by a lifecycle call).
    #[must_use]
    pub fn snapshot(&self) -> SimulationSnapshot {
        self.shared.snapshot.lock().clone()
    }

    /// Polls until the current run is completed or `timeout` passes.
    #[must_use]
    pub fn wait_until_complete(&self, timeout: Duration) -> bool {
        let poll = self.shared.settings.tick_period().max(Duration::from_millis(1));
        let start = Instant::now();
        loop {
            if self.run_state() == Some(RunState::Completed) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(poll);
        }
    }

    fn manager(&self) -> Option<Arc<ServiceQueueManager>> {
        self.shared
            .run
            .lock()
            .as_ref()
            .map(|run| Arc::clone(&run.manager))
    }

    fn queue_manager(&self) -> Result<Arc<ServiceQueueManager>, SimulationError> {
        self.manager()
            .ok_or(SimulationError::QueueIndexOutOfRange { index: 0, count: 0 })
    }

    fn delay(&self, max_ms: u64, slot: u64) -> Box<dyn DelaySource> {
        Box::new(self.shared.settings.seed.map_or_else(
            || UniformDelay::unseeded(max_ms),
            |seed| UniformDelay::new(max_ms, actor_seed(seed, slot)),
        ))
    }

    fn actor_telemetry(&self, module: String) -> Option<SimulationTelemetry> {
        self.shared
            .telemetry
            .as_ref()
            .map(|tel| tel.scoped(module))
    }

    fn build_run(&self, config: SimulationConfig) -> Result<Run, SimulationError> {
        let manager = Arc::new(ServiceQueueManager::with_queues(config.cashier_count)?);
        manager.reset_all_statistics();

        let cashiers: Vec<Cashier> = manager
            .queues()
            .into_iter()
            .map(|queue| {
                let slot = queue.index() as u64;
                let telemetry = self.actor_telemetry(format!("cashier-{}", queue.index()));
                Cashier::new(queue, self.delay(config.max_service_time_ms, slot), telemetry)
            })
            .collect();
        manager.set_cashiers(cashiers.iter().map(Cashier::control).collect());

        let generator = CustomerGenerator::new(
            Arc::clone(&manager),
            self.delay(config.max_generation_time_ms, MAX_QUEUES as u64),
            config.customer_count,
            self.actor_telemetry("generator".into()),
        );
        let progress = generator.progress();

        let mut handles = Vec::with_capacity(cashiers.len());
        for cashier in cashiers {
            match cashier.spawn() {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    handles.iter().for_each(ActorHandle::kill);
                    self.shared.retired.lock().extend(handles);
                    return Err(err);
                }
            }
        }
        let generator = match generator.spawn() {
            Ok(handle) => handle,
            Err(err) => {
                handles.iter().for_each(ActorHandle::kill);
                self.shared.retired.lock().extend(handles);
                return Err(err);
            }
        };

        Ok(Run {
            id: Uuid::new_v4(),
            config,
            manager,
            cashiers: handles,
            generator,
            progress,
            state: RunState::Running,
        })
    }

    fn announce_kill(&self, run: &Run) {
        let summary = run.summary();
        self.shared
            .log(LogLevel::Info, "controller.run.killed", &summary);
        self.shared.event("simulation.killed", summary);
    }

    fn ensure_tick(&self) -> Result<(), SimulationError> {
        let mut tick = self.tick_thread.lock();
        self.shared.tick.resume();
        if tick.is_none() {
            let shared = Arc::clone(&self.shared);
            *tick = Some(ActorHandle::spawn(
                TICK_THREAD,
                Arc::clone(&self.shared.tick),
                move || shared.tick_loop(),
            )?);
        }
        Ok(())
    }

    fn stop_tick(&self) {
        if let Some(mut handle) = self.tick_thread.lock().take() {
            handle.kill();
            let _ = handle.join();
        }
    }
}

impl Default for SimulationController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        self.kill();
        self.stop_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::MemoryEventBus;

    const LONG: Duration = Duration::from_secs(20);

    fn controller() -> SimulationController {
        SimulationController::with_settings(ControllerSettings::default().with_seed(17), None)
    }

    fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn single_cashier_run_serves_every_customer() {
        let controller = controller();
        let outcome = controller.start(SimulationConfig::new(1, 1, 1, 10)).unwrap();
        assert_eq!(outcome, StartOutcome::Rebuilt);
        assert!(controller.wait_until_complete(LONG));
        assert!(controller.is_finished());
        assert_eq!(controller.aggregate_statistics().customers_served, 10);
        assert_eq!(controller.generated_count(), 10);
        assert_eq!(controller.queue_length(0).unwrap(), 0);
    }

    #[test]
    fn invalid_config_leaves_run_untouched() {
        let controller = controller();
        let config = SimulationConfig::new(2, 5, 5, 1_000_000);
        controller.start(config).unwrap();

        let err = controller
            .start(SimulationConfig::new(3, 5, 5, 0))
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
        assert_eq!(controller.config(), Some(config));
        assert_eq!(controller.queue_count(), 2);
        assert_eq!(controller.run_state(), Some(RunState::Running));
    }

    #[test]
    fn invalid_config_before_any_run() {
        let controller = controller();
        assert!(controller.start(SimulationConfig::new(3, 5, 5, 0)).is_err());
        assert_eq!(controller.run_state(), None);
        assert_eq!(controller.queue_count(), 0);
        assert!(!controller.is_finished());
    }

    #[test]
    fn kill_before_first_customer_then_restart() {
        let controller = controller();
        controller
            .start(SimulationConfig::new(1, 1, 200, 5))
            .unwrap();
        controller.kill();
        controller.kill();
        assert_eq!(controller.run_state(), Some(RunState::Killed));

        let outcome = controller.start(SimulationConfig::new(2, 1, 1, 10)).unwrap();
        assert_eq!(outcome, StartOutcome::Rebuilt);
        assert_eq!(controller.queue_count(), 2);
        assert!(controller.wait_until_complete(LONG));
        assert_eq!(controller.aggregate_statistics().customers_served, 10);
    }

    #[test]
    fn rebuild_starts_from_zero_counters() {
        let controller = controller();
        controller.start(SimulationConfig::new(1, 1, 1, 10)).unwrap();
        assert!(controller.wait_until_complete(LONG));

        controller.start(SimulationConfig::new(3, 1, 1, 15)).unwrap();
        assert!(controller.wait_until_complete(LONG));
        let aggregate = controller.aggregate_statistics();
        assert_eq!(aggregate.customers_served, 15);
        let per_queue: u64 = (0..controller.queue_count())
            .map(|i| controller.queue_statistics(i).unwrap().customers_served)
            .sum();
        assert_eq!(per_queue, aggregate.customers_served);
    }

    #[test]
    fn completed_run_with_same_config_rebuilds() {
        let controller = controller();
        let config = SimulationConfig::new(2, 1, 1, 6);
        controller.start(config).unwrap();
        assert!(controller.wait_until_complete(LONG));
        assert_eq!(controller.start(config).unwrap(), StartOutcome::Rebuilt);
        assert!(controller.wait_until_complete(LONG));
        assert_eq!(controller.aggregate_statistics().customers_served, 6);
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let controller = controller();
        let config = SimulationConfig::new(2, 3, 3, 1_000_000);
        controller.start(config).unwrap();
        assert!(wait_for(LONG, || controller.generated_count() > 0));

        controller.pause();
        controller.pause();
        assert_eq!(controller.run_state(), Some(RunState::Paused));
        thread::sleep(Duration::from_millis(30));
        let generated = controller.generated_count();
        let served = controller.aggregate_statistics().customers_served;
        thread::sleep(Duration::from_millis(30));
        assert_eq!(controller.generated_count(), generated);
        assert_eq!(controller.aggregate_statistics().customers_served, served);

        controller.resume();
        controller.resume();
        assert_eq!(controller.run_state(), Some(RunState::Running));
        assert!(wait_for(LONG, || controller.generated_count() > generated));
    }

    #[test]
    fn start_with_same_config_resumes() {
        let controller = controller();
        let config = SimulationConfig::new(2, 3, 3, 1_000_000);
        controller.start(config).unwrap();
        controller.pause();
        assert_eq!(controller.start(config).unwrap(), StartOutcome::Resumed);
        assert_eq!(controller.run_state(), Some(RunState::Running));

        let changed = SimulationConfig::new(3, 3, 3, 1_000_000);
        assert_eq!(controller.start(changed).unwrap(), StartOutcome::Rebuilt);
        assert_eq!(controller.queue_count(), 3);
    }

    #[test]
    fn inspection_selects_valid_queues_only() {
        let controller = controller();
        assert!(controller.select_queue_for_inspection(0).is_err());
        controller
            .start(SimulationConfig::new(2, 3, 3, 1_000_000))
            .unwrap();
        assert!(matches!(
            controller.select_queue_for_inspection(2),
            Err(SimulationError::QueueIndexOutOfRange { index: 2, count: 2 })
        ));
        controller.select_queue_for_inspection(1).unwrap();
        assert_eq!(controller.inspected_queue(), 1);
        assert_eq!(controller.snapshot().inspected_queue, 1);
        assert!(controller.inspected_statistics().is_some());

        controller
            .start(SimulationConfig::new(1, 3, 3, 1_000_000))
            .unwrap();
        assert_eq!(controller.inspected_queue(), 0);
    }

    #[test]
    fn out_of_range_accessors_fail() {
        let controller = controller();
        assert!(controller.queue_length(0).is_err());
        assert!(controller.queue_statistics(0).is_err());
        assert_eq!(controller.aggregate_statistics(), Statistics::default());
        controller
            .start(SimulationConfig::new(2, 3, 3, 1_000_000))
            .unwrap();
        assert!(controller.queue_length(1).is_ok());
        assert!(controller.queue_length(2).is_err());
    }

    #[test]
    fn snapshot_reflects_completion() {
        let controller = controller();
        controller.start(SimulationConfig::new(3, 1, 1, 12)).unwrap();
        assert!(controller.wait_until_complete(LONG));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, Some(RunState::Completed));
        assert!(snapshot.finished);
        assert_eq!(snapshot.generated, 12);
        assert_eq!(snapshot.queues.len(), 3);
        assert_eq!(snapshot.aggregate.customers_served, 12);
        assert!(snapshot.queues.iter().all(|queue| queue.length == 0));
    }

    #[test]
    fn completion_totals_include_the_last_services() {
        let bus = Arc::new(MemoryEventBus::new(32));
        let telemetry = SimulationTelemetry::builder("controller")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let controller = SimulationController::with_settings(
            ControllerSettings::default().with_seed(11),
            Some(telemetry),
        );
        controller.start(SimulationConfig::new(3, 200, 1, 3)).unwrap();
        assert!(controller.wait_until_complete(LONG));
        let at_completion = controller.snapshot().aggregate;

        thread::sleep(Duration::from_millis(300));
        let settled = controller.aggregate_statistics();
        assert_eq!(at_completion, settled);
        assert_eq!(settled.customers_served, 3);

        let completed = bus
            .snapshot()
            .into_iter()
            .find(|event| event.event_type == "simulation.completed")
            .unwrap();
        let published: Statistics =
            serde_json::from_value(completed.payload["statistics"].clone()).unwrap();
        assert_eq!(published, settled);
    }

    #[test]
    fn rebuild_retires_previous_actors() {
        let controller = controller();
        controller
            .start(SimulationConfig::new(2, 1, 1, 1_000_000))
            .unwrap();
        let next = SimulationConfig::new(1, 1, 1, 1_000_000);
        assert_eq!(controller.start(next).unwrap(), StartOutcome::Rebuilt);
        assert_eq!(controller.config(), Some(next));
        assert_eq!(controller.run_state(), Some(RunState::Running));
        assert!(wait_for(LONG, || controller
            .shared
            .retired
            .lock()
            .iter()
            .all(ActorHandle::is_finished)));
    }

    #[test]
    fn lifecycle_events_are_published() {
        let bus = Arc::new(MemoryEventBus::new(32));
        let telemetry = SimulationTelemetry::builder("controller")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let controller = SimulationController::with_settings(
            ControllerSettings::default().with_seed(5),
            Some(telemetry),
        );
        controller.start(SimulationConfig::new(2, 1, 1, 8)).unwrap();
        assert!(controller.wait_until_complete(LONG));
        controller.kill();

        let kinds = bus.event_types();
        assert_eq!(kinds.first().map(String::as_str), Some("simulation.started"));
        assert!(kinds.iter().any(|kind| kind == "simulation.completed"));
        assert_eq!(kinds.last().map(String::as_str), Some("simulation.killed"));
        let completed = bus
            .snapshot()
            .into_iter()
            .find(|event| event.event_type == "simulation.completed")
            .unwrap();
        assert_eq!(completed.payload["statistics"]["customers_served"], 8);
    }

    #[test]
    fn shutdown_joins_everything() {
        let controller = controller();
        controller
            .start(SimulationConfig::new(5, 2, 2, 1_000_000))
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        controller.shutdown();
        assert_eq!(controller.run_state(), None);
        assert!(controller.shared.retired.lock().is_empty());
    }
}
