use super::{Executor, Task};
use crate::error::Result;
use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

/// Executor backed by one dedicated, named thread.
///
/// A panicking task is logged and does not take the thread down. Dropping the
/// executor closes the channel and joins the thread after it finished the
/// tasks already queued.
pub struct WorkerExecutor {
    sender: Mutex<Option<Sender<Task>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerExecutor {
    pub fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
            tracing::debug!("Delivery thread {} started", thread_name);
            for task in receiver.iter() {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!("Task panicked on delivery thread {}", thread_name);
                }
            }
            tracing::debug!("Delivery thread {} stopped", thread_name);
        })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }
}

impl Executor for WorkerExecutor {
    fn post(&self, task: Task) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(task).is_err() {
                    tracing::warn!("Delivery thread is gone; dropping task");
                }
            }
            None => tracing::warn!("Executor shut down; dropping task"),
        }
    }

    fn is_delivery_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for WorkerExecutor {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tasks_run_in_order_on_named_thread() {
        let executor = WorkerExecutor::new("worker-order").unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..5 {
            let tx = tx.clone();
            executor.post(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send((i, name)).unwrap();
            }));
        }
        drop(executor);

        let received: Vec<(i32, Option<String>)> = rx.try_iter().collect();
        assert_eq!(received.len(), 5);
        for (expected, (i, name)) in received.into_iter().enumerate() {
            assert_eq!(i, expected as i32);
            assert_eq!(name.as_deref(), Some("worker-order"));
        }
    }

    #[test]
    fn test_panicking_task_does_not_stop_thread() {
        let executor = Arc::new(WorkerExecutor::new("worker-panic").unwrap());
        executor.post(Box::new(|| panic!("boom")));
        let (tx, rx) = crossbeam_channel::bounded(1);
        executor.post(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv().unwrap(), 42);
        assert!(!executor.is_delivery_thread());
    }
}
