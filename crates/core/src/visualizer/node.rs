use super::listener::same_model;
use super::{Delivery, NodeModel, VisualizerChildren, VisualizerContext, VisualizerEvent};
use crate::node::{NodeEvent, NodeId, NodeListener, NodeProperty, NodeRef};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

/// How a mirror holds its children list.
enum ChildrenSlot {
    Unmaterialized,
    /// Empty lists are kept, so an expanded empty folder is not queried again.
    Cached(Arc<VisualizerChildren>),
    /// Populated lists live only as long as a view holds them.
    Lazy(Weak<VisualizerChildren>),
}

/// Display attributes read from the domain on first use and dropped when the
/// domain reports a change.
#[derive(Default)]
struct Labels {
    name: Option<String>,
    display_name: Option<String>,
    short_description: Option<String>,
}

/// Mirror of one domain node.
pub struct VisualizerNode {
    context: Arc<VisualizerContext>,
    node: NodeRef,
    id: NodeId,
    self_ref: Weak<VisualizerNode>,
    parent: Mutex<Weak<VisualizerChildren>>,
    labels: Mutex<Labels>,
    children: Mutex<ChildrenSlot>,
    models: Mutex<Vec<Arc<dyn NodeModel>>>,
}

impl VisualizerNode {
    pub(crate) fn create(context: Arc<VisualizerContext>, node: NodeRef) -> Arc<Self> {
        let id = node.id();
        let mirror = Arc::new_cyclic(|self_ref| Self {
            context,
            node,
            id,
            self_ref: self_ref.clone(),
            parent: Mutex::new(Weak::new()),
            labels: Mutex::new(Labels::default()),
            children: Mutex::new(ChildrenSlot::Unmaterialized),
            models: Mutex::new(Vec::new()),
        });
        let listener: Weak<dyn NodeListener> = Arc::downgrade(&mirror) as Weak<dyn NodeListener>;
        mirror.node.add_listener(listener);
        mirror
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The mirrored domain node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn name(&self) -> String {
        self.label(|labels| &mut labels.name, |node| node.name())
    }

    pub fn display_name(&self) -> String {
        self.label(|labels| &mut labels.display_name, |node| node.display_name())
    }

    pub fn short_description(&self) -> String {
        self.label(|labels| &mut labels.short_description, |node| node.short_description())
    }

    pub fn icon(&self) -> Option<String> {
        self.node.icon()
    }

    fn label(
        &self,
        slot: impl Fn(&mut Labels) -> &mut Option<String>,
        fetch: impl FnOnce(&NodeRef) -> String,
    ) -> String {
        if let Some(cached) = slot(&mut *self.labels.lock()).clone() {
            return cached;
        }
        let fresh = fetch(&self.node);
        *slot(&mut *self.labels.lock()) = Some(fresh.clone());
        fresh
    }

    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    /// Mirror of the parent, found through the owning children list.
    pub fn parent(&self) -> Option<Arc<VisualizerNode>> {
        self.parent.lock().upgrade().and_then(|children| children.parent())
    }

    /// Children list, materialized from the domain on first access.
    pub fn children(self: &Arc<Self>) -> Arc<VisualizerChildren> {
        if let Some(current) = self.current_children() {
            return current;
        }
        if self.node.is_leaf() {
            let empty = VisualizerChildren::empty(self);
            *self.children.lock() = ChildrenSlot::Cached(empty.clone());
            return empty;
        }

        // computing children can be slow; do it before blocking writers
        let _warm = self.node.children();

        let mut built: Option<Arc<VisualizerChildren>> = None;
        self.node.read_access(&mut || {
            if let Some(current) = self.current_children() {
                built = Some(current);
                return;
            }
            let snapshot = self.node.children();
            let children = VisualizerChildren::from_snapshot(&self.context, self, &snapshot);
            self.install_children(&children);
            built = Some(children);
        });

        match built {
            Some(children) => children,
            None => {
                tracing::warn!("{} did not grant read access; using an empty list", self.id);
                VisualizerChildren::empty(self)
            }
        }
    }

    pub fn child_count(self: &Arc<Self>) -> usize {
        if self.is_leaf() {
            return 0;
        }
        self.children().len()
    }

    pub fn child_at(self: &Arc<Self>, index: usize) -> Option<Arc<VisualizerNode>> {
        self.children().get(index)
    }

    pub fn index_of(self: &Arc<Self>, child: &VisualizerNode) -> Option<usize> {
        self.children().index_of(child)
    }

    /// Mirrors from `root` down to this one, or `None` if not below `root`.
    pub fn path_from(self: &Arc<Self>, root: &Arc<VisualizerNode>) -> Option<Vec<Arc<VisualizerNode>>> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(self.clone());
        while let Some(mirror) = current {
            if !seen.insert(mirror.id) {
                return None;
            }
            let reached = mirror.id == root.id;
            path.push(mirror.clone());
            if reached {
                path.reverse();
                return Some(path);
            }
            current = mirror.parent();
        }
        None
    }

    pub fn add_node_model(&self, model: Arc<dyn NodeModel>) {
        self.models.lock().push(model);
    }

    pub fn remove_node_model(&self, model: &Arc<dyn NodeModel>) {
        self.models.lock().retain(|existing| !same_model(existing, model));
    }

    pub(crate) fn current_children(&self) -> Option<Arc<VisualizerChildren>> {
        match &*self.children.lock() {
            ChildrenSlot::Cached(children) => Some(children.clone()),
            ChildrenSlot::Lazy(children) => children.upgrade(),
            ChildrenSlot::Unmaterialized => None,
        }
    }

    pub(crate) fn is_current_children(&self, children: &Arc<VisualizerChildren>) -> bool {
        self.current_children()
            .is_some_and(|current| Arc::ptr_eq(&current, children))
    }

    fn install_children(&self, children: &Arc<VisualizerChildren>) {
        *self.children.lock() = Self::slot_for(children);
    }

    /// Re-apply the ownership policy after `children` changed size.
    pub(crate) fn refresh_ownership(&self, children: &Arc<VisualizerChildren>) {
        let mut slot = self.children.lock();
        let current = match &*slot {
            ChildrenSlot::Cached(existing) => Arc::ptr_eq(existing, children),
            ChildrenSlot::Lazy(existing) => std::ptr::eq(existing.as_ptr(), Arc::as_ptr(children)),
            ChildrenSlot::Unmaterialized => false,
        };
        if current {
            *slot = Self::slot_for(children);
        }
    }

    fn slot_for(children: &Arc<VisualizerChildren>) -> ChildrenSlot {
        if children.is_empty() {
            ChildrenSlot::Cached(children.clone())
        } else {
            ChildrenSlot::Lazy(Arc::downgrade(children))
        }
    }

    /// Link this mirror under `children`.
    ///
    /// Domain graphs are trees: a mirror keeps its first live parent, and a
    /// second parent is refused. A fresh list of the same parent replaces the
    /// old link.
    pub(crate) fn attach_parent(&self, children: &Arc<VisualizerChildren>) {
        let mut link = self.parent.lock();
        match link.upgrade() {
            Some(existing) if Arc::ptr_eq(&existing, children) => {}
            Some(existing) if existing.parent_id() != children.parent_id() => {
                tracing::warn!(
                    "{} is already a child of {}; refusing second parent {}",
                    self.id,
                    existing.parent_id(),
                    children.parent_id()
                );
            }
            _ => *link = Arc::downgrade(children),
        }
    }

    pub(crate) fn detach_parent(&self, children: &Arc<VisualizerChildren>) {
        let mut link = self.parent.lock();
        if std::ptr::eq(link.as_ptr(), Arc::as_ptr(children)) {
            *link = Weak::new();
        }
    }

    /// Visit the models of this mirror, then of each ancestor.
    pub(crate) fn for_self_and_ancestors(self: &Arc<Self>, mut visit: impl FnMut(&Arc<dyn NodeModel>)) {
        let mut seen = HashSet::new();
        let mut current = Some(self.clone());
        while let Some(mirror) = current {
            if !seen.insert(mirror.id) {
                tracing::warn!("Cycle in mirror ancestry at {}", mirror.id);
                return;
            }
            let models = mirror.models.lock().clone();
            for model in &models {
                visit(model);
            }
            current = mirror.parent();
        }
    }

    /// Reload display attributes and tell the models.
    pub(crate) fn refresh(self: &Arc<Self>) {
        let name = self.node.name();
        let display_name = self.node.display_name();
        {
            let mut labels = self.labels.lock();
            labels.name = Some(name);
            labels.display_name = Some(display_name);
            labels.short_description = None;
        }
        self.for_self_and_ancestors(|model| model.update(self));
    }

    /// Forget the children list after the leaf flag flipped.
    pub(crate) fn restructure(self: &Arc<Self>) {
        *self.children.lock() = ChildrenSlot::Unmaterialized;
        self.for_self_and_ancestors(|model| model.structural_change(self));
    }
}

impl NodeListener for VisualizerNode {
    fn node_event(&self, _source: &NodeRef, event: &NodeEvent) {
        match event {
            NodeEvent::ChildrenAdded { indices, nodes } => {
                if let Some(children) = self.current_children() {
                    self.context.enqueue(Delivery::Structural(VisualizerEvent::added(
                        children,
                        indices.clone(),
                        nodes.clone(),
                    )));
                }
            }
            NodeEvent::ChildrenRemoved { nodes, .. } => {
                if let Some(children) = self.current_children() {
                    self.context.enqueue(Delivery::Structural(VisualizerEvent::removed(
                        children,
                        nodes.clone(),
                    )));
                }
            }
            NodeEvent::ChildrenReordered { permutation } => {
                if let Some(children) = self.current_children() {
                    self.context.enqueue(Delivery::Structural(VisualizerEvent::reordered(
                        children,
                        permutation.clone(),
                    )));
                }
            }
            NodeEvent::PropertyChanged { property, .. } => {
                let Some(me) = self.self_ref.upgrade() else {
                    return;
                };
                if *property == NodeProperty::Leaf {
                    self.context.enqueue(Delivery::Restructure(me));
                } else if property.is_visual() {
                    self.context.enqueue(Delivery::Refresh(me));
                }
            }
            NodeEvent::Destroyed => {}
        }
    }
}

impl Drop for VisualizerNode {
    fn drop(&mut self) {
        let listener: Weak<dyn NodeListener> = self.self_ref.clone() as Weak<dyn NodeListener>;
        self.node.remove_listener(&listener);
        self.context.cache().evict(self.id, &self.self_ref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualExecutor;
    use crate::node::{MemoryNode, Node};
    use crate::visualizer::{Added, Removed, Reordered};

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
    }

    impl NodeModel for Journal {
        fn added(&self, event: &Added) {
            let parent = event.parent().map(|p| p.name()).unwrap_or_default();
            self.entries.lock().push(format!("added {parent} {:?}", event.indices()));
        }

        fn removed(&self, event: &Removed) {
            let parent = event.parent().map(|p| p.name()).unwrap_or_default();
            self.entries.lock().push(format!("removed {parent} {:?}", event.indices()));
        }

        fn reordered(&self, event: &Reordered) {
            self.entries.lock().push(format!("reordered {:?}", event.permutation()));
        }

        fn update(&self, node: &Arc<VisualizerNode>) {
            self.entries.lock().push(format!("update {}", node.display_name()));
        }

        fn structural_change(&self, node: &Arc<VisualizerNode>) {
            self.entries.lock().push(format!("structure {}", node.name()));
        }
    }

    struct Fixture {
        executor: Arc<ManualExecutor>,
        context: Arc<VisualizerContext>,
        root: Arc<MemoryNode>,
        folder: Arc<MemoryNode>,
        mirror: Arc<VisualizerNode>,
        journal: Arc<Journal>,
    }

    fn fixture() -> Fixture {
        let executor = Arc::new(ManualExecutor::new());
        let context = VisualizerContext::new(executor.clone());
        let root = MemoryNode::root("R");
        let folder = root.add_child("F1");
        folder.add_leaf("L1");
        root.add_child("F2");
        let node: NodeRef = root.clone();
        let mirror = context.visualizer(&node);
        let journal = Arc::new(Journal::default());
        mirror.add_node_model(journal.clone());
        Fixture {
            executor,
            context,
            root,
            folder,
            mirror,
            journal,
        }
    }

    #[test]
    fn test_children_are_lazy_and_shared() {
        let f = fixture();
        assert!(f.mirror.current_children().is_none());

        let children = f.mirror.children();
        assert_eq!(children.len(), 2);
        let again = f.mirror.children();
        assert!(Arc::ptr_eq(&children, &again));

        let folder_ref: NodeRef = f.folder.clone();
        let folder_mirror = f.context.visualizer(&folder_ref);
        assert!(Arc::ptr_eq(&folder_mirror, &children.get(0).unwrap()));
        assert!(Arc::ptr_eq(&folder_mirror.parent().unwrap(), &f.mirror));
    }

    #[test]
    fn test_populated_list_is_reclaimed_when_unused() {
        let f = fixture();
        let children = f.mirror.children();
        assert_eq!(f.context.live_visualizers(), 3);
        drop(children);
        assert!(f.mirror.current_children().is_none());
        assert_eq!(f.context.live_visualizers(), 1);
        assert_eq!(f.mirror.child_count(), 2);
    }

    #[test]
    fn test_empty_list_is_kept() {
        let f = fixture();
        let leaf_parent = f.root.add_child("Empty");
        let node: NodeRef = leaf_parent.clone();
        let mirror = f.context.visualizer(&node);
        drop(mirror.children());
        assert!(mirror.current_children().is_some());
    }

    #[test]
    fn test_events_reach_ancestor_models() {
        let f = fixture();
        let children = f.mirror.children();
        let folder_mirror = children.get(0).unwrap();
        let _folder_children = folder_mirror.children();

        f.folder.add_leaf("L2");
        f.root.reorder(&[1, 0]).unwrap();
        f.executor.run_until_idle();

        assert_eq!(
            *f.journal.entries.lock(),
            vec!["added F1 [1]", "reordered [1, 0]"]
        );
        assert_eq!(children.get(1).unwrap().name(), "F1");
        assert_eq!(folder_mirror.child_count(), 2);
    }

    #[test]
    fn test_events_for_unmaterialized_children_are_ignored() {
        let f = fixture();
        f.folder.add_leaf("L2");
        assert_eq!(f.context.pending(), 0);
        assert!(f.journal.entries.lock().is_empty());
    }

    #[test]
    fn test_property_change_refreshes_labels() {
        let f = fixture();
        assert_eq!(f.mirror.display_name(), "R");
        f.root.set_display_name("Root");
        assert_eq!(f.mirror.display_name(), "R");

        f.executor.run_until_idle();
        assert_eq!(f.mirror.display_name(), "Root");
        assert_eq!(*f.journal.entries.lock(), vec!["update Root"]);

        f.root.set_short_description("tip");
        f.executor.run_until_idle();
        assert_eq!(f.mirror.short_description(), "tip");
    }

    #[test]
    fn test_leaf_flip_forces_rebuild() {
        let f = fixture();
        let children = f.mirror.children();
        let folder_mirror = children.get(0).unwrap();
        assert_eq!(folder_mirror.child_count(), 1);

        f.folder.set_leaf(true);
        f.executor.run_until_idle();
        assert_eq!(*f.journal.entries.lock(), vec!["structure F1"]);
        assert!(folder_mirror.current_children().is_none());
        assert_eq!(folder_mirror.child_count(), 0);
    }

    #[test]
    fn test_malformed_reorder_is_discarded() {
        let f = fixture();
        let children = f.mirror.children();
        let source: NodeRef = f.root.clone();
        f.mirror.node_event(
            &source,
            &NodeEvent::ChildrenReordered {
                permutation: vec![0, 0],
            },
        );
        f.executor.run_until_idle();
        assert_eq!(children.get(0).unwrap().name(), "F1");
        assert!(f.journal.entries.lock().is_empty());
    }

    #[test]
    fn test_second_parent_is_refused() {
        let f = fixture();
        let children = f.mirror.children();
        let folder_mirror = children.get(0).unwrap();

        let other = MemoryNode::root("Other");
        let other_ref: NodeRef = other.clone();
        let other_mirror = f.context.visualizer(&other_ref);
        let foreign = VisualizerChildren::empty(&other_mirror);
        folder_mirror.attach_parent(&foreign);

        assert!(Arc::ptr_eq(&folder_mirror.parent().unwrap(), &f.mirror));
        assert_eq!(folder_mirror.path_from(&f.mirror).unwrap().len(), 2);
        assert!(folder_mirror.path_from(&other_mirror).is_none());
        assert_eq!(f.mirror.node().id(), f.root.id());
    }
}
