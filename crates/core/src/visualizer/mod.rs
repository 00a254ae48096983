//! Visualizer layer
//!
//! A [`VisualizerNode`] mirrors one domain node for the views. Mirrors are
//! unique per live domain node, children are materialized lazily, and every
//! structural notification coming from the domain, whatever thread raised it,
//! is turned into a [`VisualizerEvent`] and applied in raise order on the
//! delivery thread.

mod cache;
pub mod children;
pub mod event;
pub mod listener;
pub mod node;

pub use children::VisualizerChildren;
pub use event::{Added, Removed, Reordered, VisualizerEvent};
pub use listener::NodeModel;
pub use node::VisualizerNode;

use crate::config::ExplorerConfig;
use crate::dispatch::{Executor, WorkerExecutor, invoke_and_wait};
use crate::error::Result;
use crate::node::{NodeId, NodeRef};
use cache::VisualizerCache;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Work item of the ordered delivery queue.
pub(crate) enum Delivery {
    Structural(VisualizerEvent),
    /// Display attributes changed.
    Refresh(Arc<VisualizerNode>),
    /// Leaf flag changed; children must be rebuilt.
    Restructure(Arc<VisualizerNode>),
}

#[derive(Default)]
struct DeliveryQueue {
    pending: VecDeque<Delivery>,
    scheduled: bool,
    draining: bool,
}

/// Owner of one mirror cache and one ordered delivery queue.
///
/// Views sharing a context share mirrors; an application normally creates a
/// single context.
pub struct VisualizerContext {
    executor: Arc<dyn Executor>,
    cache: VisualizerCache,
    queue: Mutex<DeliveryQueue>,
    self_ref: Weak<VisualizerContext>,
}

impl VisualizerContext {
    pub fn new(executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            executor,
            cache: VisualizerCache::default(),
            queue: Mutex::new(DeliveryQueue::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// Context delivering on a dedicated thread named after the config.
    pub fn with_worker(config: &ExplorerConfig) -> Result<Arc<Self>> {
        let executor = WorkerExecutor::new(&config.delivery_thread_name)?;
        Ok(Self::new(Arc::new(executor)))
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }

    /// The unique mirror of `node`.
    pub fn visualizer(self: &Arc<Self>, node: &NodeRef) -> Arc<VisualizerNode> {
        self.get_or_create(None, node)
    }

    pub(crate) fn get_or_create(
        self: &Arc<Self>,
        parent: Option<&Arc<VisualizerChildren>>,
        node: &NodeRef,
    ) -> Arc<VisualizerNode> {
        let visualizer = self
            .cache
            .get_or_insert_with(node.id(), || VisualizerNode::create(self.clone(), node.clone()));
        if let Some(parent) = parent {
            visualizer.attach_parent(parent);
        }
        visualizer
    }

    /// Mirror of the node with `id`, if one is alive.
    pub fn cached(&self, id: NodeId) -> Option<Arc<VisualizerNode>> {
        self.cache.get(id)
    }

    /// Number of live mirrors.
    pub fn live_visualizers(&self) -> usize {
        self.cache.live_len()
    }

    /// Deliveries queued but not yet applied.
    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    pub(crate) fn cache(&self) -> &VisualizerCache {
        &self.cache
    }

    pub(crate) fn enqueue(&self, delivery: Delivery) {
        let schedule = {
            let mut queue = self.queue.lock();
            queue.pending.push_back(delivery);
            !std::mem::replace(&mut queue.scheduled, true)
        };
        if schedule {
            let context = self.self_ref.clone();
            self.executor.post(Box::new(move || {
                if let Some(context) = context.upgrade() {
                    context.drain();
                }
            }));
        }
    }

    /// Apply everything queued so far before returning.
    ///
    /// On the delivery thread this drains inline, unless a drain is already
    /// running further up the stack (a listener reading the mirror during a
    /// callback sees the state as of the event being delivered). Elsewhere it
    /// waits for the delivery thread to drain.
    pub fn flush(self: &Arc<Self>) {
        if self.executor.is_delivery_thread() {
            self.drain();
            return;
        }
        let context = self.clone();
        if let Err(e) = invoke_and_wait(&self.executor, move || context.drain()) {
            tracing::warn!("Could not flush visualizer queue: {}", e);
        }
    }

    fn drain(self: &Arc<Self>) {
        {
            let mut queue = self.queue.lock();
            if queue.draining {
                return;
            }
            queue.draining = true;
        }
        let guard = DrainGuard { context: self };
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        queue.draining = false;
                        queue.scheduled = false;
                        break;
                    }
                }
            };
            self.deliver(next);
        }
        std::mem::forget(guard);
    }

    fn deliver(self: &Arc<Self>, delivery: Delivery) {
        match delivery {
            Delivery::Structural(event) => {
                if let Err(e) = event.apply(self) {
                    tracing::error!("Discarding structural event that cannot be applied: {}", e);
                }
            }
            Delivery::Refresh(visualizer) => visualizer.refresh(),
            Delivery::Restructure(visualizer) => visualizer.restructure(),
        }
    }
}

/// Leaves the queue drainable again if a delivery panics.
struct DrainGuard<'a> {
    context: &'a Arc<VisualizerContext>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let reschedule = {
            let mut queue = self.context.queue.lock();
            queue.draining = false;
            queue.scheduled = !queue.pending.is_empty();
            queue.scheduled
        };
        tracing::error!("Delivery panicked; queue released");
        if reschedule {
            let context = self.context.self_ref.clone();
            self.context.executor.post(Box::new(move || {
                if let Some(context) = context.upgrade() {
                    context.drain();
                }
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualExecutor;
    use crate::node::MemoryNode;

    fn context() -> (Arc<ManualExecutor>, Arc<VisualizerContext>) {
        let executor = Arc::new(ManualExecutor::new());
        let context = VisualizerContext::new(executor.clone());
        (executor, context)
    }

    #[test]
    fn test_mirror_is_unique_per_node() {
        let (_executor, context) = context();
        let root = MemoryNode::root("R");
        let node: NodeRef = root.clone();

        let first = context.visualizer(&node);
        let second = context.visualizer(&node);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(context.live_visualizers(), 1);
        assert!(context.cached(node.id()).is_some());
    }

    #[test]
    fn test_dropped_mirror_is_evicted() {
        let (_executor, context) = context();
        let root = MemoryNode::root("R");
        let node: NodeRef = root.clone();

        let visualizer = context.visualizer(&node);
        assert_eq!(root.listener_count(), 1);
        drop(visualizer);
        assert_eq!(context.live_visualizers(), 0);
        assert!(context.cached(node.id()).is_none());
        assert_eq!(root.listener_count(), 0);
    }

    #[test]
    fn test_single_drain_is_scheduled_per_burst() {
        let (executor, context) = context();
        let root = MemoryNode::root("R");
        let node: NodeRef = root.clone();
        let visualizer = context.visualizer(&node);
        let children = visualizer.children();
        assert!(children.is_empty());

        root.add_child("A");
        root.add_child("B");
        root.add_child("C");
        assert_eq!(context.pending(), 3);
        assert_eq!(executor.pending(), 1);

        executor.run_until_idle();
        assert_eq!(context.pending(), 0);
        let names: Vec<String> = visualizer.children().snapshot().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_flush_applies_pending_inline() {
        let (executor, context) = context();
        let root = MemoryNode::root("R");
        let node: NodeRef = root.clone();
        let visualizer = context.visualizer(&node);
        let _children = visualizer.children();

        root.add_leaf("A");
        assert_eq!(visualizer.children().len(), 0);
        context.flush();
        assert_eq!(visualizer.children().len(), 1);

        // the posted drain finds nothing left to do
        executor.run_until_idle();
        assert_eq!(visualizer.children().len(), 1);
    }
}
