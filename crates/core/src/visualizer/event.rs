//! Structural events
//!
//! Each event is created when the domain reports a change, waits in the
//! delivery queue, then applies itself to the children list it targets and
//! notifies the models of the owning mirror and its ancestors.

use super::{NodeModel, VisualizerChildren, VisualizerContext, VisualizerNode};
use crate::error::Result;
use crate::node::NodeRef;
use std::sync::Arc;

/// Children were inserted.
pub struct Added {
    children: Arc<VisualizerChildren>,
    indices: Vec<usize>,
    nodes: Vec<NodeRef>,
    added: Vec<Arc<VisualizerNode>>,
}

impl Added {
    pub fn children(&self) -> &Arc<VisualizerChildren> {
        &self.children
    }

    /// Mirror whose children changed.
    pub fn parent(&self) -> Option<Arc<VisualizerNode>> {
        self.children.parent()
    }

    /// Final positions of the inserted children, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    /// Mirrors of the inserted children, in `indices` order.
    pub fn added(&self) -> &[Arc<VisualizerNode>] {
        &self.added
    }
}

/// Children were removed.
///
/// The domain reports which nodes went away; positions are only known once the
/// event is applied to the current list.
pub struct Removed {
    children: Arc<VisualizerChildren>,
    nodes: Vec<NodeRef>,
    indices: Vec<usize>,
    removed: Vec<Arc<VisualizerNode>>,
}

impl Removed {
    pub fn children(&self) -> &Arc<VisualizerChildren> {
        &self.children
    }

    pub fn parent(&self) -> Option<Arc<VisualizerNode>> {
        self.children.parent()
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    /// Former positions of the removed children, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Removed mirrors, in `indices` order.
    pub fn removed(&self) -> &[Arc<VisualizerNode>] {
        &self.removed
    }
}

/// Children changed order.
pub struct Reordered {
    children: Arc<VisualizerChildren>,
    permutation: Vec<usize>,
}

impl Reordered {
    pub fn children(&self) -> &Arc<VisualizerChildren> {
        &self.children
    }

    pub fn parent(&self) -> Option<Arc<VisualizerNode>> {
        self.children.parent()
    }

    /// `permutation()[i]` is the new position of the child formerly at `i`.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }
}

pub enum VisualizerEvent {
    Added(Added),
    Removed(Removed),
    Reordered(Reordered),
}

impl VisualizerEvent {
    pub(crate) fn added(children: Arc<VisualizerChildren>, indices: Vec<usize>, nodes: Vec<NodeRef>) -> Self {
        VisualizerEvent::Added(Added {
            children,
            indices,
            nodes,
            added: Vec::new(),
        })
    }

    pub(crate) fn removed(children: Arc<VisualizerChildren>, nodes: Vec<NodeRef>) -> Self {
        VisualizerEvent::Removed(Removed {
            children,
            nodes,
            indices: Vec::new(),
            removed: Vec::new(),
        })
    }

    pub(crate) fn reordered(children: Arc<VisualizerChildren>, permutation: Vec<usize>) -> Self {
        VisualizerEvent::Reordered(Reordered {
            children,
            permutation,
        })
    }

    pub fn children(&self) -> &Arc<VisualizerChildren> {
        match self {
            VisualizerEvent::Added(event) => &event.children,
            VisualizerEvent::Removed(event) => &event.children,
            VisualizerEvent::Reordered(event) => &event.children,
        }
    }

    /// Apply to the target list, then notify. Listeners never see a
    /// partially applied list; a malformed event leaves the list untouched.
    pub(crate) fn apply(mut self, context: &Arc<VisualizerContext>) -> Result<()> {
        match &mut self {
            VisualizerEvent::Added(event) => {
                event.added = event.children.apply_added(context, &event.indices, &event.nodes)?;
                let mut order: Vec<usize> = (0..event.indices.len()).collect();
                order.sort_by_key(|&i| event.indices[i]);
                event.indices = order.iter().map(|&i| event.indices[i]).collect();
                event.nodes = order.iter().map(|&i| event.nodes[i].clone()).collect();
            }
            VisualizerEvent::Removed(event) => {
                let (indices, removed) = event.children.apply_removed(&event.nodes);
                event.indices = indices;
                event.removed = removed;
                if event.removed.is_empty() {
                    return Ok(());
                }
            }
            VisualizerEvent::Reordered(event) => {
                event.children.apply_reordered(&event.permutation)?;
            }
        }

        let Some(parent) = self.children().parent() else {
            return Ok(());
        };
        parent.refresh_ownership(self.children());
        if !parent.is_current_children(self.children()) {
            // a newer list replaced this one; it already reflects the change
            return Ok(());
        }
        parent.for_self_and_ancestors(|model: &Arc<dyn NodeModel>| match &self {
            VisualizerEvent::Added(event) => model.added(event),
            VisualizerEvent::Removed(event) => model.removed(event),
            VisualizerEvent::Reordered(event) => model.reordered(event),
        });
        Ok(())
    }
}
