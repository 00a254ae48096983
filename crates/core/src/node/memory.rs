//! In-memory domain tree
//!
//! A thread-safe [`Node`] implementation used by the CLI and the tests. All
//! nodes of one tree share a single read/write lock: structural mutations hold
//! the write side while they notify listeners, and [`Node::read_access`] takes
//! the read side. Listeners must not call `read_access` from a notification.

use super::{Node, NodeCapabilities, NodeEvent, NodeId, NodeListener, NodeProperty, NodeRef};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Serializable description of a memory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// `None` makes the node a leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeSpec>>,
}

impl NodeSpec {
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

struct MemoryState {
    name: String,
    display_name: Option<String>,
    short_description: Option<String>,
    icon: Option<String>,
    leaf: bool,
    parent: Weak<MemoryNode>,
    children: Vec<Arc<MemoryNode>>,
    destroyed: bool,
}

pub struct MemoryNode {
    id: NodeId,
    tree: Arc<RwLock<()>>,
    self_ref: Weak<MemoryNode>,
    capabilities: NodeCapabilities,
    handle: Mutex<Option<String>>,
    state: Mutex<MemoryState>,
    listeners: Mutex<Vec<Weak<dyn NodeListener>>>,
}

impl MemoryNode {
    /// Create the root of a new tree.
    pub fn root(name: &str) -> Arc<Self> {
        Self::create(Arc::new(RwLock::new(())), name, false, Weak::new())
    }

    pub fn from_spec(spec: &NodeSpec) -> Arc<Self> {
        let root = Self::create(
            Arc::new(RwLock::new(())),
            &spec.name,
            spec.children.is_none(),
            Weak::new(),
        );
        root.apply_spec(spec);
        root
    }

    fn apply_spec(&self, spec: &NodeSpec) {
        {
            let mut state = self.state.lock();
            state.display_name = spec.display_name.clone();
            state.short_description = spec.description.clone();
            state.icon = spec.icon.clone();
        }
        *self.handle.lock() = spec.handle.clone();

        if let Some(children) = &spec.children {
            let built: Vec<Arc<MemoryNode>> = children
                .iter()
                .map(|child_spec| {
                    let child = Self::create(
                        self.tree.clone(),
                        &child_spec.name,
                        child_spec.children.is_none(),
                        self.self_ref.clone(),
                    );
                    child.apply_spec(child_spec);
                    child
                })
                .collect();
            self.state.lock().children = built;
        }
    }

    fn create(tree: Arc<RwLock<()>>, name: &str, leaf: bool, parent: Weak<MemoryNode>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| MemoryNode {
            id: NodeId::next(),
            tree,
            self_ref: self_ref.clone(),
            capabilities: NodeCapabilities::all(),
            handle: Mutex::new(None),
            state: Mutex::new(MemoryState {
                name: name.to_string(),
                display_name: None,
                short_description: None,
                icon: None,
                leaf,
                parent,
                children: Vec::new(),
                destroyed: false,
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn as_node_ref(&self) -> Option<NodeRef> {
        self.self_ref.upgrade().map(|node| node as NodeRef)
    }

    /// Append a folder child.
    pub fn add_child(&self, name: &str) -> Arc<Self> {
        self.append(name, false)
    }

    /// Append a leaf child.
    pub fn add_leaf(&self, name: &str) -> Arc<Self> {
        self.append(name, true)
    }

    fn append(&self, name: &str, leaf: bool) -> Arc<Self> {
        let _write = self.tree.write();
        let child = Self::create(self.tree.clone(), name, leaf, self.self_ref.clone());
        let index = {
            let mut state = self.state.lock();
            state.children.push(child.clone());
            state.leaf = false;
            state.children.len() - 1
        };
        self.fire(NodeEvent::ChildrenAdded {
            indices: vec![index],
            nodes: vec![child.clone() as NodeRef],
        });
        child
    }

    /// Append several folder children in one notification.
    pub fn add_children(&self, names: &[&str]) -> Vec<Arc<Self>> {
        let _write = self.tree.write();
        let created: Vec<Arc<Self>> = names
            .iter()
            .map(|name| Self::create(self.tree.clone(), name, false, self.self_ref.clone()))
            .collect();
        let indices = {
            let mut state = self.state.lock();
            let start = state.children.len();
            state.children.extend(created.iter().cloned());
            (start..state.children.len()).collect()
        };
        self.fire(NodeEvent::ChildrenAdded {
            indices,
            nodes: created.iter().map(|c| c.clone() as NodeRef).collect(),
        });
        created
    }

    /// Insert a child at `index`.
    pub fn insert(&self, index: usize, name: &str, leaf: bool) -> Result<Arc<Self>> {
        let _write = self.tree.write();
        let child = Self::create(self.tree.clone(), name, leaf, self.self_ref.clone());
        {
            let mut state = self.state.lock();
            let len = state.children.len();
            if index > len {
                return Err(Error::InvalidIndex { index, len });
            }
            state.children.insert(index, child.clone());
        }
        self.fire(NodeEvent::ChildrenAdded {
            indices: vec![index],
            nodes: vec![child.clone() as NodeRef],
        });
        Ok(child)
    }

    pub fn remove_child(&self, child: &Arc<MemoryNode>) -> bool {
        self.remove_children(std::slice::from_ref(child)) == 1
    }

    /// Remove the given children in one notification. Returns how many were
    /// actually children of this node.
    pub fn remove_children(&self, children: &[Arc<MemoryNode>]) -> usize {
        let _write = self.tree.write();
        self.remove_children_locked(children)
    }

    fn remove_children_locked(&self, children: &[Arc<MemoryNode>]) -> usize {
        let (indices, removed) = {
            let mut state = self.state.lock();
            let mut indices = Vec::new();
            let mut removed = Vec::new();
            for (index, existing) in state.children.iter().enumerate() {
                if children.iter().any(|c| c.id == existing.id) {
                    indices.push(index);
                    removed.push(existing.clone());
                }
            }
            state.children.retain(|existing| !children.iter().any(|c| c.id == existing.id));
            (indices, removed)
        };
        if removed.is_empty() {
            return 0;
        }
        for child in &removed {
            child.state.lock().parent = Weak::new();
        }
        let count = removed.len();
        self.fire(NodeEvent::ChildrenRemoved {
            indices,
            nodes: removed.into_iter().map(|c| c as NodeRef).collect(),
        });
        count
    }

    /// Reorder children; `permutation[i]` is the new position of child `i`.
    pub fn reorder(&self, permutation: &[usize]) -> Result<()> {
        let _write = self.tree.write();
        {
            let mut state = self.state.lock();
            let len = state.children.len();
            if !is_permutation(permutation, len) {
                return Err(Error::InvalidPermutation {
                    len,
                    permutation: permutation.to_vec(),
                });
            }
            let mut reordered: Vec<Option<Arc<MemoryNode>>> = vec![None; len];
            for (old, child) in state.children.drain(..).enumerate() {
                reordered[permutation[old]] = Some(child);
            }
            state.children = reordered.into_iter().flatten().collect();
        }
        self.fire(NodeEvent::ChildrenReordered {
            permutation: permutation.to_vec(),
        });
        Ok(())
    }

    pub fn set_display_name(&self, display_name: &str) {
        let old = {
            let mut state = self.state.lock();
            let old = state.display_name.clone().unwrap_or_else(|| state.name.clone());
            state.display_name = Some(display_name.to_string());
            old
        };
        self.fire_property(NodeProperty::DisplayName, Some(old), Some(display_name.to_string()));
    }

    pub fn set_short_description(&self, description: &str) {
        let old = self.state.lock().short_description.replace(description.to_string());
        self.fire_property(NodeProperty::ShortDescription, old, Some(description.to_string()));
    }

    pub fn set_icon(&self, icon: Option<&str>) {
        let new = icon.map(str::to_string);
        let old = std::mem::replace(&mut self.state.lock().icon, new.clone());
        self.fire_property(NodeProperty::Icon, old, new);
    }

    /// Toggle the leaf flag; turning a node into a leaf drops its children.
    pub fn set_leaf(&self, leaf: bool) {
        let _write = self.tree.write();
        let changed = {
            let mut state = self.state.lock();
            let changed = state.leaf != leaf;
            state.leaf = leaf;
            if leaf {
                state.children.clear();
            }
            changed
        };
        if changed {
            self.fire(NodeEvent::PropertyChanged {
                property: NodeProperty::Leaf,
                old: Some((!leaf).to_string()),
                new: Some(leaf.to_string()),
            });
        }
    }

    pub fn set_handle(&self, handle: Option<&str>) {
        *self.handle.lock() = handle.map(str::to_string);
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Number of listeners that are still alive.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|l| l.strong_count() > 0);
        listeners.len()
    }

    pub fn child_nodes(&self) -> Vec<Arc<MemoryNode>> {
        self.state.lock().children.clone()
    }

    fn fire_property(&self, property: NodeProperty, old: Option<String>, new: Option<String>) {
        self.fire(NodeEvent::PropertyChanged { property, old, new });
    }

    fn fire(&self, event: NodeEvent) {
        let Some(source) = self.as_node_ref() else {
            return;
        };
        let listeners: Vec<Arc<dyn NodeListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        tracing::trace!("{} fires {:?} to {} listeners", self.id, event, listeners.len());
        for listener in listeners {
            listener.node_event(&source, &event);
        }
    }

    fn mark_destroyed(&self) {
        let children = {
            let mut state = self.state.lock();
            state.destroyed = true;
            state.children.clone()
        };
        self.fire(NodeEvent::Destroyed);
        for child in children {
            child.mark_destroyed();
        }
    }
}

impl Node for MemoryNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    fn display_name(&self) -> String {
        let state = self.state.lock();
        state.display_name.clone().unwrap_or_else(|| state.name.clone())
    }

    fn short_description(&self) -> String {
        let state = self.state.lock();
        state
            .short_description
            .clone()
            .or_else(|| state.display_name.clone())
            .unwrap_or_else(|| state.name.clone())
    }

    fn icon(&self) -> Option<String> {
        self.state.lock().icon.clone()
    }

    fn is_leaf(&self) -> bool {
        self.state.lock().leaf
    }

    fn parent(&self) -> Option<NodeRef> {
        self.state.lock().parent.upgrade().map(|parent| parent as NodeRef)
    }

    fn children(&self) -> Vec<NodeRef> {
        self.state
            .lock()
            .children
            .iter()
            .map(|child| child.clone() as NodeRef)
            .collect()
    }

    fn capabilities(&self) -> NodeCapabilities {
        self.capabilities
    }

    fn set_name(&self, name: &str) -> Result<()> {
        let old = std::mem::replace(&mut self.state.lock().name, name.to_string());
        self.fire_property(NodeProperty::Name, Some(old), Some(name.to_string()));
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        let _write = self.tree.write();
        if self.state.lock().destroyed {
            return Ok(());
        }
        let parent = self.state.lock().parent.upgrade();
        if let (Some(parent), Some(me)) = (parent, self.self_ref.upgrade()) {
            parent.remove_children_locked(&[me]);
        }
        tracing::debug!("Destroying memory node {} ({})", self.id, self.name());
        self.mark_destroyed();
        Ok(())
    }

    fn handle(&self) -> Option<String> {
        self.handle.lock().clone()
    }

    fn read_access(&self, action: &mut dyn FnMut()) {
        let _read = self.tree.read();
        action()
    }

    fn add_listener(&self, listener: Weak<dyn NodeListener>) {
        self.listeners.lock().push(listener);
    }

    fn remove_listener(&self, listener: &Weak<dyn NodeListener>) {
        self.listeners.lock().retain(|l| !Weak::ptr_eq(l, listener));
    }
}

/// Whether `permutation` is a bijection over `0..len`.
pub(crate) fn is_permutation(permutation: &[usize], len: usize) -> bool {
    if permutation.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &target in permutation {
        if target >= len || seen[target] {
            return false;
        }
        seen[target] = true;
    }
    true
}
