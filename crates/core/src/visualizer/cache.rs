use super::VisualizerNode;
use crate::node::NodeId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Identity-keyed map of live mirrors. Holds no mirror alive.
#[derive(Default)]
pub(crate) struct VisualizerCache {
    entries: Mutex<HashMap<NodeId, Weak<VisualizerNode>>>,
}

impl VisualizerCache {
    pub(crate) fn get(&self, id: NodeId) -> Option<Arc<VisualizerNode>> {
        self.entries.lock().get(&id).and_then(Weak::upgrade)
    }

    pub(crate) fn get_or_insert_with<F>(&self, id: NodeId, create: F) -> Arc<VisualizerNode>
    where
        F: FnOnce() -> Arc<VisualizerNode>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&id).and_then(Weak::upgrade) {
            return existing;
        }
        let created = create();
        entries.insert(id, Arc::downgrade(&created));
        tracing::trace!("Created visualizer for {} ({} cached)", id, entries.len());
        created
    }

    /// Forget `id`, unless the entry has since been replaced by another mirror.
    pub(crate) fn evict(&self, id: NodeId, expected: &Weak<VisualizerNode>) {
        let mut entries = self.entries.lock();
        if entries.get(&id).is_some_and(|entry| Weak::ptr_eq(entry, expected)) {
            entries.remove(&id);
        }
    }

    pub(crate) fn live_len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}
