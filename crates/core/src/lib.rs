//! explorer-core - Live mirrors of a mutable node tree for explorer views
//!
//! This crate provides functionality to:
//! - Mirror a concurrently mutated domain tree and deliver its changes in
//!   order on a single delivery thread
//! - Adapt the mirror to tree and depth-flattened list view models
//! - Manage root, explored context and selection of a navigation session,
//!   with vetoable selection changes and path-based session persistence
pub mod config;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod model;
pub mod node;
pub mod visualizer;

// Re-export commonly used types and traits
pub use error::{Error, Result};

pub use config::ExplorerConfig;
pub use dispatch::{Debouncer, Executor, ManualExecutor, WorkerExecutor, invoke_and_wait, post_or_run};
pub use manager::{
    ExplorerManager, HandleResolver, ManagerProperty, PendingRestore, PropertyChangeEvent, PropertyChangeListener,
    PropertyValue, PropertyVetoError, SessionRecord, VetoableChangeListener,
};
pub use model::{ListDataEvent, ListDataKind, ListDataListener, NodeListModel, NodeTreeModel, TreeModelEvent, TreeModelListener};
pub use node::{EmptyNode, MemoryNode, Node, NodeCapabilities, NodeEvent, NodeId, NodeListener, NodeProperty, NodeRef, NodeSpec, empty_root};
pub use visualizer::{NodeModel, VisualizerChildren, VisualizerContext, VisualizerEvent, VisualizerNode};
