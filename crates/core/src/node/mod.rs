//! Domain node contract
//!
//! The explorer never owns the object model it displays. Hosts implement
//! [`Node`] for their own types and report changes through
//! [`NodeListener`] callbacks, from any thread.

pub mod memory;
pub mod path;

pub use memory::{MemoryNode, NodeSpec};
pub use path::{create_path, find_path, is_under};

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Shared handle to a domain node.
pub type NodeRef = Arc<dyn Node>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a domain node, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags::bitflags! {
    /// Clipboard and lifecycle operations a node allows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeCapabilities: u8 {
        const CUT = 1;
        const COPY = 1 << 1;
        const DESTROY = 1 << 2;
        const RENAME = 1 << 3;
    }
}

/// Properties a node reports changes for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeProperty {
    Name,
    DisplayName,
    ShortDescription,
    Icon,
    Leaf,
    Other(String),
}

impl NodeProperty {
    /// Whether a change of this property alters how a node is presented.
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            NodeProperty::Name
                | NodeProperty::DisplayName
                | NodeProperty::ShortDescription
                | NodeProperty::Icon
        )
    }
}

/// Notification delivered to node listeners.
///
/// Member events are raised on the parent whose children changed.
#[derive(Clone)]
pub enum NodeEvent {
    ChildrenAdded {
        indices: Vec<usize>,
        nodes: Vec<NodeRef>,
    },
    ChildrenRemoved {
        indices: Vec<usize>,
        nodes: Vec<NodeRef>,
    },
    /// `permutation[i]` is the new position of the child formerly at `i`.
    ChildrenReordered { permutation: Vec<usize> },
    PropertyChanged {
        property: NodeProperty,
        old: Option<String>,
        new: Option<String>,
    },
    Destroyed,
}

impl fmt::Debug for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::ChildrenAdded { indices, nodes } => f
                .debug_struct("ChildrenAdded")
                .field("indices", indices)
                .field("nodes", &nodes.iter().map(|n| n.name()).collect::<Vec<_>>())
                .finish(),
            NodeEvent::ChildrenRemoved { indices, nodes } => f
                .debug_struct("ChildrenRemoved")
                .field("indices", indices)
                .field("nodes", &nodes.iter().map(|n| n.name()).collect::<Vec<_>>())
                .finish(),
            NodeEvent::ChildrenReordered { permutation } => f
                .debug_struct("ChildrenReordered")
                .field("permutation", permutation)
                .finish(),
            NodeEvent::PropertyChanged { property, old, new } => f
                .debug_struct("PropertyChanged")
                .field("property", property)
                .field("old", old)
                .field("new", new)
                .finish(),
            NodeEvent::Destroyed => f.write_str("Destroyed"),
        }
    }
}

/// Observer of a single domain node.
///
/// Nodes hold their listeners weakly, so registering never keeps the
/// listener alive.
pub trait NodeListener: Send + Sync {
    fn node_event(&self, source: &NodeRef, event: &NodeEvent);
}

/// A polymorphic, possibly concurrently mutated tree node.
pub trait Node: Send + Sync + 'static {
    fn id(&self) -> NodeId;

    fn name(&self) -> String;

    fn display_name(&self) -> String {
        self.name()
    }

    fn short_description(&self) -> String {
        self.display_name()
    }

    /// Icon key, if the node has one.
    fn icon(&self) -> Option<String> {
        None
    }

    fn is_leaf(&self) -> bool;

    fn parent(&self) -> Option<NodeRef>;

    /// Current children. May be slow; never called with explorer locks held.
    fn children(&self) -> Vec<NodeRef>;

    fn find_child(&self, name: &str) -> Option<NodeRef> {
        self.children().into_iter().find(|child| child.name() == name)
    }

    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::empty()
    }

    fn can_cut(&self) -> bool {
        self.capabilities().contains(NodeCapabilities::CUT)
    }

    fn can_copy(&self) -> bool {
        self.capabilities().contains(NodeCapabilities::COPY)
    }

    fn can_destroy(&self) -> bool {
        self.capabilities().contains(NodeCapabilities::DESTROY)
    }

    fn can_rename(&self) -> bool {
        self.capabilities().contains(NodeCapabilities::RENAME)
    }

    fn set_name(&self, name: &str) -> Result<()> {
        let _ = name;
        Err(Error::Node(format!("{} cannot be renamed", self.name())))
    }

    fn destroy(&self) -> Result<()> {
        Err(Error::Node(format!("{} cannot be destroyed", self.name())))
    }

    /// Persistent handle that can be resolved back to this node in a later
    /// session, if the node supports it.
    fn handle(&self) -> Option<String> {
        None
    }

    /// Run `action` while structural changes to this node's tree are held
    /// off. Listener notifications for member changes are never delivered
    /// while `action` runs.
    fn read_access(&self, action: &mut dyn FnMut()) {
        action()
    }

    fn add_listener(&self, listener: Weak<dyn NodeListener>);

    fn remove_listener(&self, listener: &Weak<dyn NodeListener>);
}

/// Identity comparison used throughout the explorer.
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    a.id() == b.id()
}

/// Leaf node with no name, standing in for a missing root.
pub struct EmptyNode {
    id: NodeId,
}

impl Node for EmptyNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> String {
        String::new()
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn parent(&self) -> Option<NodeRef> {
        None
    }

    fn children(&self) -> Vec<NodeRef> {
        Vec::new()
    }

    fn add_listener(&self, _listener: Weak<dyn NodeListener>) {}

    fn remove_listener(&self, _listener: &Weak<dyn NodeListener>) {}
}

/// A fresh sentinel root.
pub fn empty_root() -> NodeRef {
    Arc::new(EmptyNode { id: NodeId::next() })
}
