use super::{Executor, Task};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::thread::{self, ThreadId};

/// Single-threaded executor pumped explicitly by the thread that created it.
///
/// Nothing runs until the owner calls [`ManualExecutor::run_pending`] or
/// [`ManualExecutor::run_until_idle`], which makes delivery order fully
/// deterministic.
pub struct ManualExecutor {
    owner: ThreadId,
    tasks: Mutex<VecDeque<Task>>,
}

impl Default for ManualExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run the tasks queued so far. Tasks they post wait for the next call.
    pub fn run_pending(&self) -> usize {
        assert!(
            self.is_delivery_thread(),
            "ManualExecutor pumped from a thread that does not own it"
        );
        let batch: Vec<Task> = self.tasks.lock().drain(..).collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Run tasks until the queue stays empty.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Executor for ManualExecutor {
    fn post(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }

    fn is_delivery_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}
