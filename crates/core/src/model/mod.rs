//! View model adapters
//!
//! Translate visualizer events into the notifications a tree or list widget
//! consumes. Both adapters keep the children lists they have handed out alive,
//! so the mirrors they show keep receiving structural events.

pub mod list;
pub mod tree;

pub use list::{ListDataEvent, ListDataKind, ListDataListener, NodeListModel};
pub use tree::{NodeTreeModel, TreeModelEvent, TreeModelListener};

use crate::node::NodeId;
use crate::visualizer::{VisualizerChildren, VisualizerNode};
use std::collections::HashMap;
use std::sync::Arc;

/// Children lists a model keeps materialized, keyed by their parent.
pub(crate) type Retained = HashMap<NodeId, Arc<VisualizerChildren>>;

/// Stop retaining the list of `node` and every retained list below it.
pub(crate) fn release_subtree(retained: &mut Retained, node: &VisualizerNode) -> Vec<Arc<VisualizerChildren>> {
    let mut released = Vec::new();
    let mut stack = vec![node.id()];
    while let Some(id) = stack.pop() {
        if let Some(list) = retained.remove(&id) {
            stack.extend(list.snapshot().iter().map(|child| child.id()));
            released.push(list);
        }
    }
    released
}
