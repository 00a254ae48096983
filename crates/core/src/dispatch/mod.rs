//! Delivery thread abstraction
//!
//! Every visible mutation of the visualizer layer and every listener callback
//! happens on one logical thread. An [`Executor`] names that thread and
//! accepts work for it from anywhere.

pub mod debounce;
pub mod manual;
pub mod worker;

pub use debounce::Debouncer;
pub use manual::ManualExecutor;
pub use worker::WorkerExecutor;

use crate::error::{Error, Result};
use std::sync::Arc;

/// Unit of work for the delivery thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Queue `task` to run on the delivery thread, after everything posted
    /// before it.
    fn post(&self, task: Task);

    /// Whether the calling thread is the delivery thread.
    fn is_delivery_thread(&self) -> bool;
}

/// Run `f` now when already on the delivery thread, otherwise post it.
pub fn post_or_run<F>(executor: &Arc<dyn Executor>, f: F)
where
    F: FnOnce() + Send + 'static,
{
    if executor.is_delivery_thread() {
        f();
    } else {
        executor.post(Box::new(f));
    }
}

/// Run `f` on the delivery thread and wait for its result.
pub fn invoke_and_wait<F, R>(executor: &Arc<dyn Executor>, f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if executor.is_delivery_thread() {
        return Ok(f());
    }
    let (tx, rx) = crossbeam_channel::bounded(1);
    executor.post(Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.recv()
        .map_err(|_| Error::Delivery("task dropped before it ran".to_string()))
}
