//! Explorer manager
//!
//! Holds the root context, explored context and selection of one navigation
//! session and keeps them consistent: the selection and the explored context
//! always lie under the root, selection changes can be vetoed, and destroyed
//! nodes leave the selection after a short quiet period.

pub mod property;
pub mod session;

pub use property::{
    ManagerProperty, PROP_EXPLORED_CONTEXT, PROP_NODE_CHANGE, PROP_ROOT_CONTEXT, PROP_SELECTED_NODES,
    PropertyChangeEvent, PropertyChangeListener, PropertyValue, PropertyVetoError, VetoableChangeListener,
};
pub use session::{HandleResolver, PendingRestore, SessionRecord};

use crate::config::ExplorerConfig;
use crate::dispatch::{Debouncer, Executor, post_or_run};
use crate::error::{Error, Result};
use crate::node::{NodeEvent, NodeListener, NodeRef, empty_root, is_under, same_node};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashSet;
use std::sync::{Arc, Weak};

struct ManagerState {
    root: NodeRef,
    explored: Option<NodeRef>,
    selected: Vec<NodeRef>,
}

impl ManagerState {
    /// Nodes the manager listens to, without duplicates.
    fn watched(&self) -> Vec<NodeRef> {
        let mut seen = HashSet::new();
        std::iter::once(&self.root)
            .chain(self.explored.iter())
            .chain(self.selected.iter())
            .filter(|node| seen.insert(node.id()))
            .cloned()
            .collect()
    }
}

pub struct ExplorerManager {
    executor: Arc<dyn Executor>,
    config: ExplorerConfig,
    /// Serializes compound operations; reentrant so listeners may call back.
    op_lock: ReentrantMutex<()>,
    state: Mutex<ManagerState>,
    property_listeners: Mutex<Vec<Arc<dyn PropertyChangeListener>>>,
    vetoable_listeners: Mutex<Vec<Arc<dyn VetoableChangeListener>>>,
    pending_removals: Mutex<Vec<NodeRef>>,
    removal_sync: Debouncer,
    self_ref: Weak<ExplorerManager>,
}

impl ExplorerManager {
    /// A manager rooted at a fresh empty node.
    pub fn new(executor: Arc<dyn Executor>, config: &ExplorerConfig) -> Arc<Self> {
        let manager = Arc::new_cyclic(|self_ref: &Weak<ExplorerManager>| {
            let weak = self_ref.clone();
            let removal_sync = Debouncer::new(
                "explorer-selection-sync",
                config.selection_sync_delay(),
                move || {
                    if let Some(manager) = weak.upgrade() {
                        manager.remove_pending();
                    }
                },
            );
            Self {
                executor,
                config: config.clone(),
                op_lock: ReentrantMutex::new(()),
                state: Mutex::new(ManagerState {
                    root: empty_root(),
                    explored: None,
                    selected: Vec::new(),
                }),
                property_listeners: Mutex::new(Vec::new()),
                vetoable_listeners: Mutex::new(Vec::new()),
                pending_removals: Mutex::new(Vec::new()),
                removal_sync,
                self_ref: self_ref.clone(),
            }
        });
        let watched = manager.state.lock().watched();
        manager.rewatch(&[], &watched);
        manager
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }

    pub fn add_property_change_listener(&self, listener: Arc<dyn PropertyChangeListener>) {
        self.property_listeners.lock().push(listener);
    }

    pub fn remove_property_change_listener(&self, listener: &Arc<dyn PropertyChangeListener>) {
        self.property_listeners
            .lock()
            .retain(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(listener)));
    }

    pub fn add_vetoable_change_listener(&self, listener: Arc<dyn VetoableChangeListener>) {
        self.vetoable_listeners.lock().push(listener);
    }

    pub fn remove_vetoable_change_listener(&self, listener: &Arc<dyn VetoableChangeListener>) {
        self.vetoable_listeners
            .lock()
            .retain(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(listener)));
    }

    pub fn root_context(&self) -> NodeRef {
        self.state.lock().root.clone()
    }

    pub fn explored_context(&self) -> Option<NodeRef> {
        self.state.lock().explored.clone()
    }

    pub fn selected_nodes(&self) -> Vec<NodeRef> {
        self.state.lock().selected.clone()
    }

    /// Whether `node` is the root context or lies below it.
    pub fn is_under_root(&self, node: &NodeRef) -> bool {
        let root = self.root_context();
        is_under(node, &root)
    }

    /// Replace the root. The explored context moves to the new root; the
    /// selection survives only if all of it lies under the new root.
    pub fn set_root_context(&self, root: NodeRef) {
        let _op = self.op_lock.lock();
        let (old_root, old_selection) = {
            let state = self.state.lock();
            (state.root.clone(), state.selected.clone())
        };
        if same_node(&old_root, &root) {
            return;
        }
        tracing::debug!("Root context {} -> {}", old_root.id(), root.id());
        self.update_state(|state| state.root = root.clone());
        self.fire(
            ManagerProperty::RootContext,
            PropertyValue::Node(old_root),
            PropertyValue::Node(root.clone()),
        );

        let selection = if old_selection.iter().all(|node| is_under(node, &root)) {
            old_selection
        } else {
            Vec::new()
        };
        if let Err(e) = self.set_explored_context_with_selection(Some(root), selection) {
            tracing::warn!("Could not reset explored context after root change: {}", e);
        }
    }

    /// Replace the selection.
    ///
    /// Fails without side effects when a node lies outside the root, appears
    /// twice, or a vetoable listener rejects the change. Selecting the same
    /// set again does nothing.
    pub fn set_selected_nodes(&self, nodes: Vec<NodeRef>) -> Result<()> {
        let _op = self.op_lock.lock();
        self.validate_selection(&nodes)?;
        self.change_selection(nodes)
    }

    /// Explore `node` with an empty selection.
    pub fn set_explored_context(&self, node: Option<NodeRef>) -> Result<()> {
        self.set_explored_context_with_selection(node, Vec::new())
    }

    /// Explore `node` and select `selection`. A veto of the selection is
    /// logged and leaves a valid selection in place instead of failing.
    pub fn set_explored_context_with_selection(&self, node: Option<NodeRef>, selection: Vec<NodeRef>) -> Result<()> {
        let _op = self.op_lock.lock();
        self.validate_explored(node.as_ref())?;
        self.validate_selection(&selection)?;
        match self.change_selection(selection) {
            Err(Error::Vetoed(veto)) => {
                tracing::warn!("Ignoring vetoed selection: {}", veto);
                self.drop_invalid_selection();
            }
            other => other?,
        }
        self.change_explored(node);
        Ok(())
    }

    /// Like [`set_explored_context_with_selection`](Self::set_explored_context_with_selection),
    /// but a vetoed selection fails the whole call.
    pub fn set_explored_context_and_selection(&self, node: Option<NodeRef>, selection: Vec<NodeRef>) -> Result<()> {
        let _op = self.op_lock.lock();
        self.validate_explored(node.as_ref())?;
        self.validate_selection(&selection)?;
        self.change_selection(selection)?;
        self.change_explored(node);
        Ok(())
    }

    /// Apply pending removals of destroyed nodes now instead of waiting for
    /// the quiet period. Waits for a reconciliation already in progress, and
    /// drops selected nodes that are no longer under the root.
    pub fn flush_pending_removals(&self) {
        if !self.removal_sync.flush() {
            self.remove_pending();
        }
    }

    fn validate_explored(&self, node: Option<&NodeRef>) -> Result<()> {
        match node {
            Some(node) if !self.is_under_root(node) => Err(Error::NotUnderRoot(node.name())),
            _ => Ok(()),
        }
    }

    fn validate_selection(&self, nodes: &[NodeRef]) -> Result<()> {
        let root = self.root_context();
        let mut seen = HashSet::new();
        for node in nodes {
            if !seen.insert(node.id()) {
                return Err(Error::DuplicateSelection(node.name()));
            }
            if !is_under(node, &root) {
                return Err(Error::NotUnderRoot(node.name()));
            }
        }
        Ok(())
    }

    /// Offer, commit and announce a validated selection.
    fn change_selection(&self, nodes: Vec<NodeRef>) -> Result<()> {
        let old = self.selected_nodes();
        if same_set(&old, &nodes) {
            return Ok(());
        }
        if !nodes.is_empty() {
            let event = PropertyChangeEvent {
                property: ManagerProperty::SelectedNodes,
                old: PropertyValue::Nodes(old.clone()),
                new: PropertyValue::Nodes(nodes.clone()),
            };
            let vetoable = self.vetoable_listeners.lock().clone();
            for listener in &vetoable {
                listener.vetoable_change(&event)?;
            }
        }
        self.update_state(|state| state.selected = nodes.clone());
        self.fire(
            ManagerProperty::SelectedNodes,
            PropertyValue::Nodes(old),
            PropertyValue::Nodes(nodes),
        );
        Ok(())
    }

    /// Clear the selection if it no longer lies under the root. Emptying is
    /// never offered for veto.
    fn drop_invalid_selection(&self) {
        let root = self.root_context();
        let valid = self.selected_nodes().iter().all(|node| is_under(node, &root));
        if !valid {
            if let Err(e) = self.change_selection(Vec::new()) {
                tracing::error!("Could not clear selection: {}", e);
            }
        }
    }

    fn change_explored(&self, node: Option<NodeRef>) {
        let old = self.explored_context();
        let unchanged = match (&old, &node) {
            (Some(a), Some(b)) => same_node(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.update_state(|state| state.explored = node.clone());
        self.fire(
            ManagerProperty::ExploredContext,
            PropertyValue::from_option(old),
            PropertyValue::from_option(node),
        );
    }

    fn update_state(&self, change: impl FnOnce(&mut ManagerState)) {
        let (before, after) = {
            let mut state = self.state.lock();
            let before = state.watched();
            change(&mut state);
            (before, state.watched())
        };
        self.rewatch(&before, &after);
    }

    fn rewatch(&self, before: &[NodeRef], after: &[NodeRef]) {
        let listener: Weak<dyn NodeListener> = self.self_ref.clone() as Weak<dyn NodeListener>;
        for node in before {
            if !after.iter().any(|n| same_node(n, node)) {
                node.remove_listener(&listener);
            }
        }
        for node in after {
            if !before.iter().any(|n| same_node(n, node)) {
                node.add_listener(listener.clone());
            }
        }
    }

    fn fire(&self, property: ManagerProperty, old: PropertyValue, new: PropertyValue) {
        let listeners = self.property_listeners.lock().clone();
        if listeners.is_empty() {
            return;
        }
        let event = PropertyChangeEvent { property, old, new };
        tracing::debug!("Firing {} {:?} -> {:?}", property, event.old, event.new);
        post_or_run(&self.executor, move || {
            for listener in &listeners {
                listener.property_change(&event);
            }
        });
    }

    fn node_destroyed(&self, node: &NodeRef) {
        if same_node(node, &self.root_context()) {
            tracing::debug!("Root context {} destroyed", node.id());
            self.set_root_context(empty_root());
            return;
        }
        self.pending_removals.lock().push(node.clone());
        self.removal_sync.schedule();
    }

    fn remove_pending(&self) {
        let _op = self.op_lock.lock();
        let destroyed = std::mem::take(&mut *self.pending_removals.lock());
        let root = self.root_context();
        let is_gone = |node: &NodeRef| destroyed.iter().any(|d| same_node(d, node)) || !is_under(node, &root);

        let selected = self.selected_nodes();
        let remaining: Vec<NodeRef> = selected.iter().filter(|node| !is_gone(node)).cloned().collect();
        if remaining.len() != selected.len() {
            tracing::debug!(
                "Dropping {} destroyed or detached nodes from the selection",
                selected.len() - remaining.len()
            );
            if let Err(e) = self.change_selection(remaining) {
                tracing::warn!("Vetoed removal of destroyed nodes: {}", e);
                self.drop_invalid_selection();
            }
        }

        if self.explored_context().is_some_and(|explored| is_gone(&explored)) {
            self.change_explored(Some(root));
        }
    }
}

impl NodeListener for ExplorerManager {
    fn node_event(&self, source: &NodeRef, event: &NodeEvent) {
        match event {
            NodeEvent::Destroyed => self.node_destroyed(source),
            NodeEvent::PropertyChanged { .. } => {
                let selected = self.selected_nodes().iter().any(|node| same_node(node, source));
                if selected {
                    self.fire(
                        ManagerProperty::NodeChange,
                        PropertyValue::None,
                        PropertyValue::Node(source.clone()),
                    );
                }
            }
            _ => {}
        }
    }
}

impl Drop for ExplorerManager {
    fn drop(&mut self) {
        let watched = self.state.get_mut().watched();
        self.rewatch(&watched, &[]);
    }
}

/// Equal as sets of node identities.
fn same_set(a: &[NodeRef], b: &[NodeRef]) -> bool {
    a.len() == b.len() && a.iter().all(|node| b.iter().any(|other| same_node(node, other)))
}
