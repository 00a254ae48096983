use super::Retained;
use crate::dispatch::invoke_and_wait;
use crate::error::{Error, Result};
use crate::node::{NodeId, NodeRef};
use crate::visualizer::{Added, NodeModel, Removed, Reordered, VisualizerContext, VisualizerNode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDataKind {
    IntervalAdded,
    IntervalRemoved,
    ContentsChanged,
}

/// Inclusive index range of a list change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListDataEvent {
    pub kind: ListDataKind,
    pub index0: usize,
    pub index1: usize,
}

pub trait ListDataListener: Send + Sync {
    fn interval_added(&self, event: &ListDataEvent);

    fn interval_removed(&self, event: &ListDataEvent);

    fn contents_changed(&self, event: &ListDataEvent);
}

/// Position of one mirror in the flattened list.
#[derive(Debug, Clone, Copy)]
struct Info {
    /// Flat index; the root sits at -1.
    index: isize,
    /// Levels still expanded below this node.
    depth: usize,
    /// Number of flattened entries below this node.
    subtree: usize,
}

struct ListState {
    root: Arc<VisualizerNode>,
    depth: usize,
    memo: Option<HashMap<NodeId, Info>>,
    retained: Retained,
}

/// Flattening of a tree up to a fixed depth.
///
/// Depth 1 lists the root's children, depth 2 adds their children after each
/// of them, and so on. The root itself is never listed.
pub struct NodeListModel {
    context: Arc<VisualizerContext>,
    bridge: Arc<dyn NodeModel>,
    state: Mutex<ListState>,
    listeners: Mutex<Vec<Arc<dyn ListDataListener>>>,
}

struct ListBridge {
    model: Weak<NodeListModel>,
}

impl NodeModel for ListBridge {
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

impl NodeListModel {
    pub fn new(context: Arc<VisualizerContext>, root: &NodeRef, depth: usize) -> Result<Arc<Self>> {
        if depth == 0 {
            return Err(Error::InvalidDepth(depth));
        }
        let root = context.visualizer(root);
        let model = Arc::new_cyclic(|model: &Weak<NodeListModel>| Self {
            context,
            bridge: Arc::new(ListBridge { model: model.clone() }),
            state: Mutex::new(ListState {
                root: root.clone(),
                depth,
                memo: None,
                retained: Retained::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        });
        root.add_node_model(model.bridge.clone());
        Ok(model)
    }

    pub fn add_list_data_listener(&self, listener: Arc<dyn ListDataListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove_list_data_listener(&self, listener: &Arc<dyn ListDataListener>) {
        self.listeners
            .lock()
            .retain(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(listener)));
    }

    pub fn root(&self) -> Arc<VisualizerNode> {
        self.state.lock().root.clone()
    }

    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Show the subtree of `node` instead.
    pub fn set_node(self: &Arc<Self>, node: &NodeRef) -> Result<()> {
        let model = self.clone();
        let node = node.clone();
        invoke_and_wait(&self.context.executor(), move || {
            model.context.flush();
            let root = model.context.visualizer(&node);
            let old_size = model.known_size();
            let old = {
                let mut state = model.state.lock();
                std::mem::replace(&mut state.root, root.clone())
            };
            old.remove_node_model(&model.bridge);
            root.add_node_model(model.bridge.clone());
            tracing::debug!("List model root changed from {} to {}", old.id(), root.id());
            model.reset(old_size);
        })
    }

    pub fn set_depth(self: &Arc<Self>, depth: usize) -> Result<()> {
        if depth == 0 {
            return Err(Error::InvalidDepth(depth));
        }
        let model = self.clone();
        invoke_and_wait(&self.context.executor(), move || {
            model.context.flush();
            let old_size = model.known_size();
            let changed = {
                let mut state = model.state.lock();
                std::mem::replace(&mut state.depth, depth) != depth
            };
            if changed {
                model.reset(old_size);
            }
        })
    }

    /// Number of flattened entries.
    pub fn size(&self) -> usize {
        self.context.flush();
        let mut state = self.state.lock();
        let root = state.root.clone();
        Self::memo(&mut state)
            .get(&root.id())
            .map_or(0, |info| info.subtree)
    }

    pub fn element_at(&self, index: usize) -> Option<Arc<VisualizerNode>> {
        self.context.flush();
        let mut state = self.state.lock();
        let root = state.root.clone();
        let depth = state.depth;
        let memo = Self::memo(&mut state);
        find_element_at(memo, &root, index, depth)
    }

    /// Flat index of `node`, if it is listed.
    pub fn index_of(&self, node: &VisualizerNode) -> Option<usize> {
        self.context.flush();
        let mut state = self.state.lock();
        Self::memo(&mut state)
            .get(&node.id())
            .and_then(|info| usize::try_from(info.index).ok())
    }

    /// Memoized positions, computed on demand.
    fn memo(state: &mut ListState) -> &HashMap<NodeId, Info> {
        if state.memo.is_none() {
            let mut memo = HashMap::new();
            let mut retained = Retained::new();
            find_size(&mut memo, &mut retained, &state.root, -1, state.depth);
            // the old lists are released only after the new ones are held
            let _previous = std::mem::replace(&mut state.retained, retained);
            state.memo = Some(memo);
        }
        state.memo.get_or_insert_with(HashMap::new)
    }

    /// Memo entry of `node` as of the last computation.
    fn known(&self, node: &VisualizerNode) -> Option<Info> {
        let state = self.state.lock();
        state.memo.as_ref().and_then(|memo| memo.get(&node.id()).copied())
    }

    fn known_size(&self) -> usize {
        let state = self.state.lock();
        let root = state.root.id();
        state
            .memo
            .as_ref()
            .and_then(|memo| memo.get(&root))
            .map_or(0, |info| info.subtree)
    }

    fn recompute(&self) -> usize {
        let mut state = self.state.lock();
        state.memo = None;
        let root = state.root.id();
        Self::memo(&mut state).get(&root).map_or(0, |info| info.subtree)
    }

    /// Memo entry of `parent` if its children are listed.
    fn expanded(&self, parent: Option<Arc<VisualizerNode>>) -> Option<Info> {
        parent
            .and_then(|parent| self.known(&parent))
            .filter(|info| info.depth > 0)
    }

    fn range_of(&self, node: &VisualizerNode) -> Option<(usize, usize)> {
        let info = self.known(node)?;
        let start = usize::try_from(info.index).ok()?;
        Some((start, start + info.subtree))
    }

    /// Replace the whole list after the root, the depth or a leaf flag changed.
    fn reset(&self, old_size: usize) {
        let new_size = self.recompute();
        if old_size > 0 {
            self.fire(ListDataKind::IntervalRemoved, 0, old_size - 1);
        }
        if new_size > 0 {
            self.fire(ListDataKind::IntervalAdded, 0, new_size - 1);
        }
    }

    fn on_added(&self, event: &Added) {
        if self.expanded(event.parent()).is_none() {
            return;
        }
        self.recompute();
        let ranges: Vec<(usize, usize)> = event
            .added()
            .iter()
            .filter_map(|child| self.range_of(child))
            .collect();
        for (start, end) in ranges {
            self.fire(ListDataKind::IntervalAdded, start, end);
        }
    }

    fn on_removed(&self, event: &Removed) {
        if self.expanded(event.parent()).is_none() {
            return;
        }
        let mut ranges: Vec<(usize, usize)> = event
            .removed()
            .iter()
            .filter_map(|child| self.range_of(child))
            .collect();
        self.recompute();

        // highest first, so earlier ranges keep their positions
        ranges.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (start, end) in ranges {
            self.fire(ListDataKind::IntervalRemoved, start, end);
        }
    }

    fn on_reordered(&self, event: &Reordered) {
        let Some(info) = self
            .expanded(event.parent())
            .filter(|info| info.subtree > 0)
        else {
            return;
        };
        self.recompute();
        let start = usize::try_from(info.index + 1).unwrap_or(0);
        self.fire(ListDataKind::ContentsChanged, start, start + info.subtree - 1);
    }

    fn on_update(&self, node: &Arc<VisualizerNode>) {
        if let Some(index) = self
            .known(node)
            .and_then(|info| usize::try_from(info.index).ok())
        {
            self.fire(ListDataKind::ContentsChanged, index, index);
        }
    }

    fn on_structural_change(&self, node: &Arc<VisualizerNode>) {
        if self.known(node).is_none() {
            return;
        }
        let old_size = self.known_size();
        self.reset(old_size);
    }

    fn fire(&self, kind: ListDataKind, index0: usize, index1: usize) {
        let event = ListDataEvent { kind, index0, index1 };
        tracing::trace!("List model fires {:?}", event);
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            match kind {
                ListDataKind::IntervalAdded => listener.interval_added(&event),
                ListDataKind::IntervalRemoved => listener.interval_removed(&event),
                ListDataKind::ContentsChanged => listener.contents_changed(&event),
            }
        }
    }
}

impl Drop for NodeListModel {
    fn drop(&mut self) {
        self.state.get_mut().root.remove_node_model(&self.bridge);
    }
}

/// Record `node` at flat `index` and return the number of entries below it
/// within `depth` levels.
fn find_size(
    memo: &mut HashMap<NodeId, Info>,
    retained: &mut Retained,
    node: &Arc<VisualizerNode>,
    index: isize,
    depth: usize,
) -> usize {
    if let Some(info) = memo.get(&node.id()) {
        return info.subtree;
    }
    let mut size = 0;
    if depth > 0 && !node.is_leaf() {
        let children = node.children();
        for child in children.snapshot() {
            size += 1;
            size += find_size(memo, retained, &child, index + size as isize, depth - 1);
        }
        retained.insert(node.id(), children);
    }
    memo.insert(
        node.id(),
        Info {
            index,
            depth,
            subtree: size,
        },
    );
    size
}

/// Inverse of [`find_size`]: the entry at `index` below `node`.
fn find_element_at(
    memo: &HashMap<NodeId, Info>,
    node: &Arc<VisualizerNode>,
    mut index: usize,
    depth: usize,
) -> Option<Arc<VisualizerNode>> {
    if depth == 0 {
        return None;
    }
    let children = node.current_children()?;
    for child in children.snapshot() {
        if index == 0 {
            return Some(child);
        }
        index -= 1;
        let below = memo.get(&child.id()).map_or(0, |info| info.subtree);
        if index < below {
            return find_element_at(memo, &child, index, depth - 1);
        }
        index -= below;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualExecutor;
    use crate::node::MemoryNode;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ListDataEvent>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<(ListDataKind, usize, usize)> {
            std::mem::take(&mut *self.events.lock())
                .into_iter()
                .map(|e| (e.kind, e.index0, e.index1))
                .collect()
        }
    }

    impl ListDataListener for Recorder {
        fn interval_added(&self, event: &ListDataEvent) {
            self.events.lock().push(*event);
        }

        fn interval_removed(&self, event: &ListDataEvent) {
            self.events.lock().push(*event);
        }

        fn contents_changed(&self, event: &ListDataEvent) {
            self.events.lock().push(*event);
        }
    }

    struct Fixture {
        executor: Arc<ManualExecutor>,
        root: Arc<MemoryNode>,
        folder: Arc<MemoryNode>,
        model: Arc<NodeListModel>,
        recorder: Arc<Recorder>,
    }

    fn fixture(depth: usize) -> Fixture {
        let executor = Arc::new(ManualExecutor::new());
        let context = VisualizerContext::new(executor.clone());
        let root = MemoryNode::root("R");
        let folder = root.add_child("F1");
        folder.add_children(&["L1", "L2"]);
        root.add_child("F2");
        let node: NodeRef = root.clone();
        let model = NodeListModel::new(context, &node, depth).unwrap();
        let recorder = Arc::new(Recorder::default());
        model.add_list_data_listener(recorder.clone());
        Fixture {
            executor,
            root,
            folder,
            model,
            recorder,
        }
    }

    fn names(model: &NodeListModel) -> Vec<String> {
        (0..model.size())
            .filter_map(|i| model.element_at(i))
            .map(|v| v.name())
            .collect()
    }

    #[test]
    fn test_flattening_by_depth() {
        let f = fixture(1);
        assert_eq!(names(&f.model), vec!["F1", "F2"]);

        f.model.set_depth(2).unwrap();
        assert_eq!(f.model.depth(), 2);
        assert_eq!(names(&f.model), vec!["F1", "L1", "L2", "F2"]);
        assert_eq!(
            f.recorder.take(),
            vec![
                (ListDataKind::IntervalRemoved, 0, 1),
                (ListDataKind::IntervalAdded, 0, 3),
            ]
        );
        assert!(f.model.element_at(4).is_none());
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let f = fixture(1);
        assert!(matches!(f.model.set_depth(0), Err(Error::InvalidDepth(0))));
        assert_eq!(f.model.depth(), 1);
    }

    #[test]
    fn test_index_of_inverts_element_at() {
        let f = fixture(3);
        for i in 0..f.model.size() {
            let element = f.model.element_at(i).unwrap();
            assert_eq!(f.model.index_of(&element), Some(i));
        }
        assert_eq!(f.model.index_of(&f.model.root()), None);
    }

    #[test]
    fn test_removal_fires_old_interval() {
        let f = fixture(2);
        assert_eq!(f.model.size(), 4);

        let l1 = f.folder.child_nodes()[0].clone();
        f.folder.remove_child(&l1);
        f.executor.run_until_idle();

        assert_eq!(f.recorder.take(), vec![(ListDataKind::IntervalRemoved, 1, 1)]);
        assert_eq!(names(&f.model), vec!["F1", "L2", "F2"]);
    }

    #[test]
    fn test_removing_a_folder_removes_its_entries() {
        let f = fixture(2);
        assert_eq!(f.model.size(), 4);

        f.root.remove_child(&f.folder);
        f.executor.run_until_idle();

        assert_eq!(f.recorder.take(), vec![(ListDataKind::IntervalRemoved, 0, 2)]);
        assert_eq!(names(&f.model), vec!["F2"]);
    }

    #[test]
    fn test_insertion_fires_new_interval() {
        let f = fixture(2);
        assert_eq!(f.model.size(), 4);

        f.folder.insert(0, "L0", true).unwrap();
        f.root.add_leaf("F3");
        f.executor.run_until_idle();

        assert_eq!(
            f.recorder.take(),
            vec![
                (ListDataKind::IntervalAdded, 1, 1),
                (ListDataKind::IntervalAdded, 5, 5),
            ]
        );
        assert_eq!(names(&f.model), vec!["F1", "L0", "L1", "L2", "F2", "F3"]);
    }

    #[test]
    fn test_changes_beyond_depth_are_ignored() {
        let f = fixture(1);
        assert_eq!(f.model.size(), 2);

        f.folder.add_leaf("L3");
        f.executor.run_until_idle();
        assert!(f.recorder.take().is_empty());
        assert_eq!(f.model.size(), 2);
    }

    #[test]
    fn test_reorder_and_rename() {
        let f = fixture(2);
        assert_eq!(f.model.size(), 4);

        f.folder.reorder(&[1, 0]).unwrap();
        f.executor.run_until_idle();
        assert_eq!(f.recorder.take(), vec![(ListDataKind::ContentsChanged, 1, 2)]);
        assert_eq!(names(&f.model), vec!["F1", "L2", "L1", "F2"]);

        f.root.child_nodes()[1].set_display_name("Second");
        f.executor.run_until_idle();
        assert_eq!(f.recorder.take(), vec![(ListDataKind::ContentsChanged, 3, 3)]);
    }
}
