use super::{Retained, release_subtree};
use crate::dispatch::invoke_and_wait;
use crate::error::Result;
use crate::node::NodeRef;
use crate::visualizer::{
    Added, NodeModel, Removed, Reordered, VisualizerChildren, VisualizerContext, VisualizerNode,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Change below one tree path.
///
/// `path` runs from the model root to the parent of `children`. For changes
/// to the root itself `path` is just the root and the index lists are empty.
#[derive(Clone)]
pub struct TreeModelEvent {
    pub path: Vec<Arc<VisualizerNode>>,
    pub child_indices: Vec<usize>,
    pub children: Vec<Arc<VisualizerNode>>,
}

impl TreeModelEvent {
    fn structure(path: Vec<Arc<VisualizerNode>>) -> Self {
        Self {
            path,
            child_indices: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Names along `path`, for diagnostics.
    pub fn path_names(&self) -> Vec<String> {
        self.path.iter().map(|node| node.name()).collect()
    }
}

pub trait TreeModelListener: Send + Sync {
    fn tree_nodes_inserted(&self, event: &TreeModelEvent);

    /// `children` holds the removed mirrors; they are no longer in the tree.
    fn tree_nodes_removed(&self, event: &TreeModelEvent);

    fn tree_nodes_changed(&self, event: &TreeModelEvent);

    /// Everything below the last node of `path` must be re-read.
    fn tree_structure_changed(&self, event: &TreeModelEvent);
}

struct TreeState {
    root: Arc<VisualizerNode>,
    retained: Retained,
}

/// Tree model over one root mirror.
pub struct NodeTreeModel {
    context: Arc<VisualizerContext>,
    bridge: Arc<dyn NodeModel>,
    state: Mutex<TreeState>,
    listeners: Mutex<Vec<Arc<dyn TreeModelListener>>>,
}

/// Receives visualizer events for the whole tree through the root mirror.
struct TreeBridge {
    model: Weak<NodeTreeModel>,
}

impl NodeModel for TreeBridge {
    fn added(&self, event: &Added) {
        if let Some(model) = self.model.upgrade() {
            model.on_added(event);
        }
    }

    fn removed(&self, event: &Removed) {
        if let Some(model) = self.model.upgrade() {
            model.on_removed(event);
        }
    }

    fn reordered(&self, event: &Reordered) {
        if let Some(model) = self.model.upgrade() {
            model.on_reordered(event);
        }
    }

    fn update(&self, node: &Arc<VisualizerNode>) {
        if let Some(model) = self.model.upgrade() {
            model.on_update(node);
        }
    }

    fn structural_change(&self, node: &Arc<VisualizerNode>) {
        if let Some(model) = self.model.upgrade() {
            model.on_structural_change(node);
        }
    }
}

impl NodeTreeModel {
    pub fn new(context: Arc<VisualizerContext>, root: &NodeRef) -> Arc<Self> {
        let root = context.visualizer(root);
        let model = Arc::new_cyclic(|model: &Weak<NodeTreeModel>| Self {
            context,
            bridge: Arc::new(TreeBridge { model: model.clone() }),
            state: Mutex::new(TreeState {
                root: root.clone(),
                retained: Retained::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        });
        root.add_node_model(model.bridge.clone());
        model
    }

    pub fn add_tree_model_listener(&self, listener: Arc<dyn TreeModelListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove_tree_model_listener(&self, listener: &Arc<dyn TreeModelListener>) {
        self.listeners
            .lock()
            .retain(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(listener)));
    }

    pub fn root(&self) -> Arc<VisualizerNode> {
        self.state.lock().root.clone()
    }

    /// Show `node` as the new root. Runs on the delivery thread, after every
    /// event already queued for the old root.
    pub fn set_node(self: &Arc<Self>, node: &NodeRef) -> Result<()> {
        let model = self.clone();
        let node = node.clone();
        invoke_and_wait(&self.context.executor(), move || model.swap_root(&node))
    }

    fn swap_root(&self, node: &NodeRef) {
        self.context.flush();
        let root = self.context.visualizer(node);
        let (old, released) = {
            let mut state = self.state.lock();
            let released = std::mem::take(&mut state.retained);
            (std::mem::replace(&mut state.root, root.clone()), released)
        };
        old.remove_node_model(&self.bridge);
        root.add_node_model(self.bridge.clone());
        drop(released);
        tracing::debug!("Tree model root changed from {} to {}", old.id(), root.id());
        self.fire(TreeModelEvent::structure(vec![root]), |l, e| l.tree_structure_changed(e));
    }

    pub fn child(&self, parent: &Arc<VisualizerNode>, index: usize) -> Option<Arc<VisualizerNode>> {
        self.context.flush();
        self.retain(parent).and_then(|children| children.get(index))
    }

    pub fn child_count(&self, parent: &Arc<VisualizerNode>) -> usize {
        self.context.flush();
        self.retain(parent).map_or(0, |children| children.len())
    }

    pub fn is_leaf(&self, node: &Arc<VisualizerNode>) -> bool {
        node.is_leaf()
    }

    pub fn index_of_child(&self, parent: &Arc<VisualizerNode>, child: &Arc<VisualizerNode>) -> Option<usize> {
        self.context.flush();
        self.retain(parent).and_then(|children| children.index_of(child))
    }

    /// Mirrors from the root down to `node`, if it is shown by this model.
    pub fn path_to_root(&self, node: &Arc<VisualizerNode>) -> Option<Vec<Arc<VisualizerNode>>> {
        let root = self.root();
        node.path_from(&root)
    }

    fn retain(&self, parent: &Arc<VisualizerNode>) -> Option<Arc<VisualizerChildren>> {
        if parent.is_leaf() {
            return None;
        }
        let children = parent.children();
        self.state
            .lock()
            .retained
            .insert(parent.id(), children.clone());
        Some(children)
    }

    fn on_added(&self, event: &Added) {
        let Some(path) = event.parent().and_then(|parent| self.path_to_root(&parent)) else {
            return;
        };
        self.fire(
            TreeModelEvent {
                path,
                child_indices: event.indices().to_vec(),
                children: event.added().to_vec(),
            },
            |l, e| l.tree_nodes_inserted(e),
        );
    }

    fn on_removed(&self, event: &Removed) {
        let released: Vec<_> = {
            let mut state = self.state.lock();
            event
                .removed()
                .iter()
                .flat_map(|child| release_subtree(&mut state.retained, child))
                .collect()
        };
        drop(released);
        let Some(path) = event.parent().and_then(|parent| self.path_to_root(&parent)) else {
            return;
        };
        self.fire(
            TreeModelEvent {
                path,
                child_indices: event.indices().to_vec(),
                children: event.removed().to_vec(),
            },
            |l, e| l.tree_nodes_removed(e),
        );
    }

    fn on_reordered(&self, event: &Reordered) {
        let Some(path) = event.parent().and_then(|parent| self.path_to_root(&parent)) else {
            return;
        };
        self.fire(TreeModelEvent::structure(path), |l, e| l.tree_structure_changed(e));
    }

    fn on_update(&self, node: &Arc<VisualizerNode>) {
        let Some(mut path) = self.path_to_root(node) else {
            return;
        };
        let event = if path.len() == 1 {
            TreeModelEvent::structure(path)
        } else {
            path.pop();
            let index = path
                .last()
                .and_then(|parent| parent.current_children())
                .and_then(|children| children.index_of(node));
            let Some(index) = index else {
                return;
            };
            TreeModelEvent {
                path,
                child_indices: vec![index],
                children: vec![node.clone()],
            }
        };
        self.fire(event, |l, e| l.tree_nodes_changed(e));
    }

    fn on_structural_change(&self, node: &Arc<VisualizerNode>) {
        let released = release_subtree(&mut self.state.lock().retained, node);
        drop(released);
        let Some(path) = self.path_to_root(node) else {
            return;
        };
        self.fire(TreeModelEvent::structure(path), |l, e| l.tree_structure_changed(e));
    }

    fn fire(&self, event: TreeModelEvent, notify: impl Fn(&dyn TreeModelListener, &TreeModelEvent)) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            notify(listener.as_ref(), &event);
        }
    }
}

impl Drop for NodeTreeModel {
    fn drop(&mut self) {
        self.state.get_mut().root.remove_node_model(&self.bridge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualExecutor;
    use crate::node::{MemoryNode, Node};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, kind: &str, event: &TreeModelEvent) {
            let children: Vec<String> = event.children.iter().map(|c| c.name()).collect();
            self.events.lock().push(format!(
                "{kind} {} {:?} {:?}",
                event.path_names().join("/"),
                event.child_indices,
                children
            ));
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl TreeModelListener for Recorder {
        fn tree_nodes_inserted(&self, event: &TreeModelEvent) {
            self.record("inserted", event);
        }

        fn tree_nodes_removed(&self, event: &TreeModelEvent) {
            self.record("removed", event);
        }

        fn tree_nodes_changed(&self, event: &TreeModelEvent) {
            self.record("changed", event);
        }

        fn tree_structure_changed(&self, event: &TreeModelEvent) {
            self.record("structure", event);
        }
    }

    struct Fixture {
        executor: Arc<ManualExecutor>,
        context: Arc<VisualizerContext>,
        root: Arc<MemoryNode>,
        folder: Arc<MemoryNode>,
        model: Arc<NodeTreeModel>,
        recorder: Arc<Recorder>,
    }

    fn fixture() -> Fixture {
        let executor = Arc::new(ManualExecutor::new());
        let context = VisualizerContext::new(executor.clone());
        let root = MemoryNode::root("R");
        let folder = root.add_child("F1");
        folder.add_children(&["L1", "L2"]);
        root.add_child("F2");
        let node: NodeRef = root.clone();
        let model = NodeTreeModel::new(context.clone(), &node);
        let recorder = Arc::new(Recorder::default());
        model.add_tree_model_listener(recorder.clone());
        Fixture {
            executor,
            context,
            root,
            folder,
            model,
            recorder,
        }
    }

    #[test]
    fn test_read_api() {
        let f = fixture();
        let root = f.model.root();
        assert_eq!(f.model.child_count(&root), 2);
        let folder = f.model.child(&root, 0).unwrap();
        assert_eq!(folder.name(), "F1");
        assert!(!f.model.is_leaf(&folder));
        let leaf = f.model.child(&folder, 1).unwrap();
        assert!(f.model.child(&folder, 2).is_none());
        assert_eq!(f.model.index_of_child(&folder, &leaf), Some(1));
        let path: Vec<String> = f.model.path_to_root(&leaf).unwrap().iter().map(|n| n.name()).collect();
        assert_eq!(path, vec!["R", "F1", "L2"]);
    }

    #[test]
    fn test_expanded_lists_stay_alive() {
        let f = fixture();
        let root = f.model.root();
        let folder = f.model.child(&root, 0).unwrap();
        f.model.child_count(&folder);
        drop(folder);
        assert_eq!(f.context.live_visualizers(), 5);
    }

    #[test]
    fn test_structural_events_are_translated() {
        let f = fixture();
        let root = f.model.root();
        let folder = f.model.child(&root, 0).unwrap();
        f.model.child_count(&folder);

        f.folder.add_leaf("L3");
        let l1 = f.folder.child_nodes()[0].clone();
        f.folder.remove_child(&l1);
        f.root.reorder(&[1, 0]).unwrap();
        f.executor.run_until_idle();

        assert_eq!(
            f.recorder.take(),
            vec![
                "inserted R/F1 [2] [\"L3\"]",
                "removed R/F1 [0] [\"L1\"]",
                "structure R [] []",
            ]
        );
        assert_eq!(f.model.index_of_child(&root, &folder), Some(1));
    }

    #[test]
    fn test_property_changes_map_to_nodes_changed() {
        let f = fixture();
        let root = f.model.root();
        let folder = f.model.child(&root, 0).unwrap();
        f.model.child_count(&folder);

        f.folder.child_nodes()[1].set_display_name("Second");
        f.root.set_display_name("Top");
        f.executor.run_until_idle();

        assert_eq!(
            f.recorder.take(),
            vec!["changed R/F1 [1] [\"L2\"]", "changed R [] []"]
        );
    }

    #[test]
    fn test_leaf_flip_is_a_structure_change() {
        let f = fixture();
        let root = f.model.root();
        let folder = f.model.child(&root, 0).unwrap();
        assert_eq!(f.model.child_count(&folder), 2);

        f.folder.set_leaf(true);
        f.executor.run_until_idle();
        assert_eq!(f.recorder.take(), vec!["structure R/F1 [] []"]);
        assert_eq!(f.model.child_count(&folder), 0);
    }

    #[test]
    fn test_set_node_moves_listening() {
        let f = fixture();
        let other = MemoryNode::root("Other");
        other.add_leaf("X");
        let other_ref: NodeRef = other.clone();

        f.model.set_node(&other_ref).unwrap();
        assert_eq!(f.recorder.take(), vec!["structure Other [] []"]);
        assert_eq!(f.model.root().node().id(), other.id());
        let new_root = f.model.root();
        assert_eq!(f.model.child_count(&new_root), 1);

        // the old tree is no longer observed
        f.root.set_display_name("Old");
        other.add_leaf("Y");
        f.executor.run_until_idle();
        assert_eq!(f.recorder.take(), vec!["inserted Other [1] [\"Y\"]"]);
    }
}
