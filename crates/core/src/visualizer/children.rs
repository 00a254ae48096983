use super::{VisualizerContext, VisualizerNode};
use crate::error::{Error, Result};
use crate::node::memory::is_permutation;
use crate::node::{NodeId, NodeRef};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Ordered mirror of one node's child list.
///
/// Owned by its parent mirror; the list in turn owns the child mirrors.
pub struct VisualizerChildren {
    parent: Weak<VisualizerNode>,
    parent_id: NodeId,
    nodes: RwLock<Vec<Arc<VisualizerNode>>>,
}

impl VisualizerChildren {
    pub(crate) fn empty(parent: &Arc<VisualizerNode>) -> Arc<Self> {
        Arc::new(Self {
            parent: Arc::downgrade(parent),
            parent_id: parent.id(),
            nodes: RwLock::new(Vec::new()),
        })
    }

    pub(crate) fn from_snapshot(
        context: &Arc<VisualizerContext>,
        parent: &Arc<VisualizerNode>,
        snapshot: &[NodeRef],
    ) -> Arc<Self> {
        let children = Self::empty(parent);
        let mirrors: Vec<Arc<VisualizerNode>> = snapshot
            .iter()
            .map(|node| context.get_or_create(Some(&children), node))
            .collect();
        *children.nodes.write() = mirrors;
        children
    }

    /// Owning mirror, while it is alive.
    pub fn parent(&self) -> Option<Arc<VisualizerNode>> {
        self.parent.upgrade()
    }

    pub fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<VisualizerNode>> {
        self.nodes.read().get(index).cloned()
    }

    pub fn index_of(&self, child: &VisualizerNode) -> Option<usize> {
        self.nodes.read().iter().position(|c| c.id() == child.id())
    }

    pub fn snapshot(&self) -> Vec<Arc<VisualizerNode>> {
        self.nodes.read().clone()
    }

    /// Insert mirrors of `nodes` at `indices` (final positions). Returns the
    /// inserted mirrors in ascending index order.
    pub(crate) fn apply_added(
        self: &Arc<Self>,
        context: &Arc<VisualizerContext>,
        indices: &[usize],
        nodes: &[NodeRef],
    ) -> Result<Vec<Arc<VisualizerNode>>> {
        if indices.len() != nodes.len() {
            return Err(Error::Node(format!(
                "added event carries {} indices for {} nodes",
                indices.len(),
                nodes.len()
            )));
        }
        let mut order: Vec<usize> = (0..indices.len()).collect();
        order.sort_by_key(|&i| indices[i]);

        let len = self.len();
        for (inserted, &i) in order.iter().enumerate() {
            if indices[i] > len + inserted {
                return Err(Error::InvalidIndex {
                    index: indices[i],
                    len: len + inserted,
                });
            }
        }

        let mirrors: Vec<Arc<VisualizerNode>> = order
            .iter()
            .map(|&i| context.get_or_create(Some(self), &nodes[i]))
            .collect();

        let mut list = self.nodes.write();
        for (mirror, &i) in mirrors.iter().zip(order.iter()) {
            list.insert(indices[i], mirror.clone());
        }
        Ok(mirrors)
    }

    /// Remove the mirrors of `nodes` that are present, matching by identity.
    /// Returns their former positions and the removed mirrors.
    pub(crate) fn apply_removed(self: &Arc<Self>, nodes: &[NodeRef]) -> (Vec<usize>, Vec<Arc<VisualizerNode>>) {
        let mut list = self.nodes.write();
        let mut indices = Vec::new();
        let mut removed = Vec::new();
        for (index, mirror) in list.iter().enumerate() {
            if nodes.iter().any(|node| node.id() == mirror.id()) {
                indices.push(index);
                removed.push(mirror.clone());
            }
        }
        list.retain(|mirror| !nodes.iter().any(|node| node.id() == mirror.id()));
        drop(list);

        for mirror in &removed {
            mirror.detach_parent(self);
        }
        (indices, removed)
    }

    pub(crate) fn apply_reordered(&self, permutation: &[usize]) -> Result<()> {
        let mut list = self.nodes.write();
        if !is_permutation(permutation, list.len()) {
            return Err(Error::InvalidPermutation {
                len: list.len(),
                permutation: permutation.to_vec(),
            });
        }
        let mut reordered: Vec<Option<Arc<VisualizerNode>>> = vec![None; list.len()];
        for (old, mirror) in list.drain(..).enumerate() {
            reordered[permutation[old]] = Some(mirror);
        }
        *list = reordered.into_iter().flatten().collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualExecutor;
    use crate::node::{MemoryNode, Node};

    fn names(children: &VisualizerChildren) -> Vec<String> {
        children.snapshot().iter().map(|v| v.name()).collect()
    }

    fn fixture() -> (Arc<VisualizerContext>, Arc<MemoryNode>, Arc<VisualizerNode>) {
        let context = VisualizerContext::new(Arc::new(ManualExecutor::new()));
        let root = MemoryNode::root("R");
        root.add_children(&["A", "B", "C"]);
        let node: NodeRef = root.clone();
        let mirror = context.visualizer(&node);
        (context, root, mirror)
    }

    #[test]
    fn test_snapshot_links_parent() {
        let (_context, _root, mirror) = fixture();
        let children = mirror.children();
        assert_eq!(names(&children), vec!["A", "B", "C"]);
        assert_eq!(children.parent_id(), mirror.id());
        let first = children.get(0).unwrap();
        assert!(Arc::ptr_eq(&first.parent().unwrap(), &mirror));
        assert_eq!(children.index_of(&children.get(2).unwrap()), Some(2));
    }

    #[test]
    fn test_apply_added_validates_positions() {
        let (context, _root, mirror) = fixture();
        let children = mirror.children();
        let extra: NodeRef = MemoryNode::root("X");

        let err = children
            .apply_added(&context, &[7], std::slice::from_ref(&extra))
            .err().unwrap();
        assert!(matches!(err, Error::InvalidIndex { index: 7, len: 3 }));
        assert_eq!(children.len(), 3);

        let added = children.apply_added(&context, &[3], &[extra]).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(names(&children), vec!["A", "B", "C", "X"]);
    }

    #[test]
    fn test_apply_removed_reports_current_positions() {
        let (_context, root, mirror) = fixture();
        let children = mirror.children();
        let domain: Vec<NodeRef> = root.children();

        children.apply_reordered(&[2, 1, 0]).unwrap();
        let (indices, removed) = children.apply_removed(&[domain[0].clone()]);
        assert_eq!(indices, vec![2]);
        assert_eq!(removed[0].name(), "A");
        assert!(removed[0].parent().is_none());
        assert_eq!(names(&children), vec!["C", "B"]);
    }

    #[test]
    fn test_malformed_permutation_is_rejected() {
        let (_context, _root, mirror) = fixture();
        let children = mirror.children();
        for bad in [vec![0, 1], vec![0, 0, 1], vec![0, 1, 3]] {
            assert!(matches!(
                children.apply_reordered(&bad),
                Err(Error::InvalidPermutation { len: 3, .. })
            ));
        }
        assert_eq!(names(&children), vec!["A", "B", "C"]);
    }
}
