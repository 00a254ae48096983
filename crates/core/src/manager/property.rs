use crate::node::NodeRef;
use std::fmt;

pub const PROP_ROOT_CONTEXT: &str = "rootContext";
pub const PROP_EXPLORED_CONTEXT: &str = "exploredContext";
pub const PROP_SELECTED_NODES: &str = "selectedNodes";
pub const PROP_NODE_CHANGE: &str = "nodeChange";

/// Observable properties of an [`ExplorerManager`](super::ExplorerManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerProperty {
    RootContext,
    ExploredContext,
    SelectedNodes,
    /// A selected node changed one of its own properties.
    NodeChange,
}

impl ManagerProperty {
    pub fn name(&self) -> &'static str {
        match self {
            ManagerProperty::RootContext => PROP_ROOT_CONTEXT,
            ManagerProperty::ExploredContext => PROP_EXPLORED_CONTEXT,
            ManagerProperty::SelectedNodes => PROP_SELECTED_NODES,
            ManagerProperty::NodeChange => PROP_NODE_CHANGE,
        }
    }
}

impl fmt::Display for ManagerProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
pub enum PropertyValue {
    None,
    Node(NodeRef),
    Nodes(Vec<NodeRef>),
}

impl PropertyValue {
    pub fn from_option(node: Option<NodeRef>) -> Self {
        node.map_or(PropertyValue::None, PropertyValue::Node)
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            PropertyValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_nodes(&self) -> &[NodeRef] {
        match self {
            PropertyValue::Nodes(nodes) => nodes,
            _ => &[],
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::None => f.write_str("None"),
            PropertyValue::Node(node) => write!(f, "{}", node.name()),
            PropertyValue::Nodes(nodes) => f
                .debug_list()
                .entries(nodes.iter().map(|node| node.name()))
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyChangeEvent {
    pub property: ManagerProperty,
    pub old: PropertyValue,
    pub new: PropertyValue,
}

/// Rejection of a proposed selection by a [`VetoableChangeListener`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{property} change rejected: {message}")]
pub struct PropertyVetoError {
    pub property: ManagerProperty,
    pub message: String,
}

impl PropertyVetoError {
    pub fn new(property: ManagerProperty, message: impl Into<String>) -> Self {
        Self {
            property,
            message: message.into(),
        }
    }
}

pub trait PropertyChangeListener: Send + Sync {
    fn property_change(&self, event: &PropertyChangeEvent);
}

/// Consulted before a non-empty selection is committed. Emptying the
/// selection is never offered.
pub trait VetoableChangeListener: Send + Sync {
    fn vetoable_change(&self, event: &PropertyChangeEvent) -> Result<(), PropertyVetoError>;
}
