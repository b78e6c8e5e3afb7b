use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};

use crate::error::SimulationError;

/// Suspend/resume gate plus one-way kill flag shared between an actor and its owner.
///
/// The actor calls [`ActorControl::wait_while_suspended`] at the top of every loop
/// iteration; that is the only point where suspension and kill are observed.
#[derive(Debug, Default)]
pub struct ActorControl {
    flags: Mutex<ControlFlags>,
    resumed: Condvar,
}

#[derive(Debug, Default, Clone, Copy)]
struct ControlFlags {
    suspended: bool,
    killed: bool,
}

impl ActorControl {
    /// Creates a running, live control.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the actor to block at its next loop boundary. Does not wait for it.
    pub fn suspend(&self) {
        self.flags.lock().suspended = true;
    }

    /// Clears the suspension and wakes the actor blocked on this control.
    pub fn resume(&self) {
        let mut flags = self.flags.lock();
        flags.suspended = false;
        self.resumed.notify_all();
    }

    /// Sets the kill flag, force-resuming a suspended actor so it can exit.
    pub fn kill(&self) {
        let mut flags = self.flags.lock();
        flags.killed = true;
        if flags.suspended {
            flags.suspended = false;
            self.resumed.notify_all();
        }
    }

    /// Whether a suspension is requested.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.flags.lock().suspended
    }

    /// Whether the kill flag is set.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.flags.lock().killed
    }

    /// Blocks while suspended. Returns `false` once the actor has been killed.
    ///
    /// The predicate is re-checked after every wakeup, so spurious wakeups only cost a
    /// loop iteration. `on_wakeup` runs for each wakeup that found the actor still
    /// suspended.
    #[must_use]
    pub fn wait_while_suspended_with(&self, mut on_wakeup: impl FnMut()) -> bool {
        let mut flags = self.flags.lock();
        while flags.suspended {
            self.resumed.wait(&mut flags);
            if flags.suspended {
                on_wakeup();
            }
        }
        !flags.killed
    }

    /// [`ActorControl::wait_while_suspended_with`] without a wakeup hook.
    #[must_use]
    pub fn wait_while_suspended(&self) -> bool {
        self.wait_while_suspended_with(|| {})
    }
}

/// Owner's handle on a running actor thread.
pub struct ActorHandle {
    name: String,
    control: Arc<ActorControl>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("name", &self.name)
            .field("control", &self.control)
            .field("joined", &self.thread.is_none())
            .finish()
    }
}

impl ActorHandle {
    /// Spawns `body` on a named thread gated by `control`.
    pub fn spawn(
        name: impl Into<String>,
        control: Arc<ActorControl>,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<Self, SimulationError> {
        let name = name.into();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| SimulationError::Spawn {
                actor: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            control,
            thread: Some(thread),
        })
    }

    /// See [`ActorControl::suspend`].
    pub fn suspend(&self) {
        self.control.suspend();
    }

    /// See [`ActorControl::resume`].
    pub fn resume(&self) {
        self.control.resume();
    }

    /// See [`ActorControl::kill`].
    pub fn kill(&self) {
        self.control.kill();
    }

    /// Whether the thread body has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the thread to exit. Returns `false` if it panicked.
    ///
    /// Only returns promptly after [`ActorHandle::kill`] or natural completion; an
    /// in-flight simulated delay always runs to its end first.
    #[must_use]
    pub fn join(&mut self) -> bool {
        self.thread.take().map_or(true, |thread| thread.join().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::{Duration, Instant},
    };

    fn counting_actor(control: &Arc<ActorControl>, counter: &Arc<AtomicU64>) -> ActorHandle {
        let gate = Arc::clone(control);
        let counter = Arc::clone(counter);
        ActorHandle::spawn("counter", Arc::clone(control), move || {
            while gate.wait_while_suspended() {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap()
    }

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn suspend_and_resume_are_idempotent() {
        let control = ActorControl::new();
        control.suspend();
        control.suspend();
        assert!(control.is_suspended());
        control.resume();
        control.resume();
        assert!(!control.is_suspended());
        assert!(control.wait_while_suspended());
    }

    #[test]
    fn kill_force_resumes() {
        let control = ActorControl::new();
        control.suspend();
        control.kill();
        assert!(!control.is_suspended());
        assert!(control.is_killed());
        assert!(!control.wait_while_suspended());
    }

    #[test]
    fn suspended_actor_stops_counting() {
        let control = Arc::new(ActorControl::new());
        let counter = Arc::new(AtomicU64::new(0));
        let mut handle = counting_actor(&control, &counter);
        assert!(wait_until(Duration::from_secs(2), || counter.load(Ordering::SeqCst) > 0));

        handle.suspend();
        thread::sleep(Duration::from_millis(20));
        let frozen = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        handle.resume();
        assert!(wait_until(Duration::from_secs(2), || counter.load(Ordering::SeqCst) > frozen));

        handle.kill();
        assert!(handle.join());
        assert!(handle.is_finished());
    }

    #[test]
    fn killing_a_suspended_actor_lets_it_exit() {
        let control = Arc::new(ActorControl::new());
        let counter = Arc::new(AtomicU64::new(0));
        control.suspend();
        let mut handle = counting_actor(&control, &counter);
        thread::sleep(Duration::from_millis(10));
        handle.kill();
        assert!(handle.join());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
