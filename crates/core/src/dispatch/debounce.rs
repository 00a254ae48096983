//! Restartable delayed action

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Action = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Timer {
    deadline: Option<Instant>,
    sleeping: bool,
}

struct Shared {
    timer: Mutex<Timer>,
    wakeup: Condvar,
    action: Action,
}

/// Runs an action once a quiet period has passed since the last
/// [`schedule`](Debouncer::schedule) call.
///
/// Rescheduling moves the deadline instead of stacking another run. A single
/// sleeper thread exists while the debouncer is armed.
pub struct Debouncer {
    delay: Duration,
    name: String,
    shared: Arc<Shared>,
}

impl Debouncer {
    pub fn new<F>(name: &str, delay: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            delay,
            name: name.to_string(),
            shared: Arc::new(Shared {
                timer: Mutex::new(Timer::default()),
                wakeup: Condvar::new(),
                action: Arc::new(action),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_armed(&self) -> bool {
        self.shared.timer.lock().deadline.is_some()
    }

    /// Arm the debouncer, or push the deadline back if already armed.
    pub fn schedule(&self) {
        let mut timer = self.shared.timer.lock();
        timer.deadline = Some(Instant::now() + self.delay);
        if timer.sleeping {
            self.shared.wakeup.notify_one();
            return;
        }
        timer.sleeping = true;
        drop(timer);

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || Self::sleep_until_due(&shared));
        if let Err(e) = spawned {
            tracing::error!("Failed to start debounce thread {}: {}", self.name, e);
            self.shared.timer.lock().sleeping = false;
        }
    }

    fn sleep_until_due(shared: &Shared) {
        let mut timer = shared.timer.lock();
        loop {
            let Some(deadline) = timer.deadline else {
                timer.sleeping = false;
                return;
            };
            let now = Instant::now();
            if now >= deadline {
                timer.deadline = None;
                timer.sleeping = false;
                drop(timer);
                (shared.action)();
                return;
            }
            shared.wakeup.wait_for(&mut timer, deadline - now);
        }
    }

    /// Run the action right away if armed. Returns whether it ran.
    pub fn flush(&self) -> bool {
        let armed = {
            let mut timer = self.shared.timer.lock();
            let armed = timer.deadline.take().is_some();
            self.shared.wakeup.notify_one();
            armed
        };
        if armed {
            (self.shared.action)();
        }
        armed
    }

    /// Disarm without running the action.
    pub fn cancel(&self) {
        self.shared.timer.lock().deadline = None;
        self.shared.wakeup.notify_one();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
