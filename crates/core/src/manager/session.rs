//! Session persistence by name path
//!
//! Nodes are not stored by identity. A session records the root's persistent
//! handle and, for the explored context and each selected node, the names
//! leading to it from the root. Restoring resolves the root first and fails
//! if it is gone; the paths are resolved afterwards on a background thread,
//! and paths that no longer lead anywhere are dropped.

use super::ExplorerManager;
use crate::config::ExplorerConfig;
use crate::dispatch::Executor;
use crate::error::{Error, Result};
use crate::node::{NodeRef, create_path, find_path, same_node};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    pub root_handle: String,
    /// Root display name, kept for diagnostics only.
    pub root_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explored: Option<Vec<String>>,
    #[serde(default)]
    pub selected: Vec<Vec<String>>,
}

impl SessionRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Turns a persisted root handle back into a node.
pub trait HandleResolver: Send + Sync {
    fn resolve(&self, handle: &str) -> Option<NodeRef>;
}

impl<F> HandleResolver for F
where
    F: Fn(&str) -> Option<NodeRef> + Send + Sync,
{
    fn resolve(&self, handle: &str) -> Option<NodeRef> {
        self(handle)
    }
}

/// A manager whose root is restored and whose paths are still resolving.
pub struct PendingRestore {
    manager: Arc<ExplorerManager>,
    join: JoinHandle<()>,
}

impl PendingRestore {
    /// The restored manager. Explored context and selection appear once the
    /// background resolution finishes.
    pub fn manager(&self) -> &Arc<ExplorerManager> {
        &self.manager
    }

    /// Wait for path resolution to finish.
    pub fn wait(self) -> Result<Arc<ExplorerManager>> {
        self.join
            .join()
            .map_err(|_| Error::Delivery("session restore thread panicked".to_string()))?;
        Ok(self.manager)
    }
}

impl ExplorerManager {
    /// Record the current state by name path.
    ///
    /// Fails if the root has no persistent handle. Selected nodes that are
    /// no longer under the root are left out.
    pub fn session(&self) -> Result<SessionRecord> {
        let root = self.root_context();
        let root_handle = root
            .handle()
            .ok_or_else(|| Error::Node(format!("Root {} has no persistent handle", root.display_name())))?;
        let explored = self
            .explored_context()
            .and_then(|explored| create_path(&explored, &root));
        let selected = self
            .selected_nodes()
            .iter()
            .filter_map(|node| create_path(node, &root))
            .collect();
        Ok(SessionRecord {
            root_handle,
            root_name: root.display_name(),
            explored,
            selected,
        })
    }

    /// Rebuild a manager from `record`.
    ///
    /// The root is resolved before returning and an unresolvable root fails
    /// with [`Error::RootUnresolvable`]. Paths are resolved on a thread named
    /// by `config.restore_thread_name`.
    pub fn restore(
        record: &SessionRecord,
        resolver: &dyn HandleResolver,
        executor: Arc<dyn Executor>,
        config: &ExplorerConfig,
    ) -> Result<PendingRestore> {
        let root = resolver
            .resolve(&record.root_handle)
            .ok_or_else(|| Error::RootUnresolvable(record.root_handle.clone()))?;
        let manager = ExplorerManager::new(executor, config);
        manager.set_root_context(root.clone());
        tracing::debug!("Restored root {} for session of {}", root.id(), record.root_name);

        let target = manager.clone();
        let record = record.clone();
        let join = thread::Builder::new()
            .name(config.restore_thread_name.clone())
            .spawn(move || target.apply_paths(&root, &record))?;
        Ok(PendingRestore { manager, join })
    }

    fn apply_paths(&self, root: &NodeRef, record: &SessionRecord) {
        let explored = match &record.explored {
            Some(path) => match find_path(root, path) {
                Ok(node) => Some(node),
                Err(e) => {
                    tracing::debug!("Dropping explored context: {}", e);
                    Some(root.clone())
                }
            },
            None => None,
        };
        let selected: Vec<NodeRef> = record
            .selected
            .iter()
            .filter_map(|path| match find_path(root, path) {
                Ok(node) => Some(node),
                Err(e) => {
                    tracing::debug!("Dropping selected node: {}", e);
                    None
                }
            })
            .collect();

        if !same_node(&self.root_context(), root) {
            tracing::warn!("Root changed while restoring; ignoring restored paths");
            return;
        }
        if let Err(e) = self.set_explored_context_and_selection(explored, selected) {
            tracing::warn!("Could not apply restored session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualExecutor;
    use crate::node::{MemoryNode, Node};

    fn tree() -> Arc<MemoryNode> {
        let root = MemoryNode::root("R");
        root.set_handle(Some("workspace:R"));
        let folder = root.add_child("F1");
        folder.add_children(&["L1", "L2"]);
        root.add_child("F2");
        root
    }

    fn resolver_for(root: &Arc<MemoryNode>) -> impl HandleResolver {
        let root: NodeRef = root.clone();
        move |handle: &str| (root.handle().as_deref() == Some(handle)).then(|| root.clone())
    }

    #[test]
    fn test_session_records_paths() {
        let executor = Arc::new(ManualExecutor::new());
        let manager = ExplorerManager::new(executor, &ExplorerConfig::default());
        let root = tree();
        manager.set_root_context(root.clone());
        let folder: NodeRef = root.child_nodes()[0].clone();
        let leaf: NodeRef = root.child_nodes()[0].child_nodes()[1].clone();
        manager
            .set_explored_context_and_selection(Some(folder), vec![leaf])
            .unwrap();

        let record = manager.session().unwrap();
        assert_eq!(record.root_handle, "workspace:R");
        assert_eq!(record.explored, Some(vec!["F1".to_string()]));
        assert_eq!(record.selected, vec![vec!["F1".to_string(), "L2".to_string()]]);
        assert_eq!(SessionRecord::from_json(&record.to_json().unwrap()).unwrap(), record);
    }

    #[test]
    fn test_session_requires_root_handle() {
        let executor = Arc::new(ManualExecutor::new());
        let manager = ExplorerManager::new(executor, &ExplorerConfig::default());
        assert!(matches!(manager.session(), Err(Error::Node(_))));
    }

    #[test]
    fn test_unresolvable_root_is_a_safe_failure() {
        let record = SessionRecord {
            root_handle: "workspace:gone".to_string(),
            root_name: "gone".to_string(),
            explored: None,
            selected: Vec::new(),
        };
        let root = tree();
        let err = ExplorerManager::restore(
            &record,
            &resolver_for(&root),
            Arc::new(ManualExecutor::new()),
            &ExplorerConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::RootUnresolvable(_)));
        assert!(err.is_safe());
    }

    #[test]
    fn test_stale_paths_are_dropped() {
        let record = SessionRecord {
            root_handle: "workspace:R".to_string(),
            root_name: "R".to_string(),
            explored: Some(vec!["Missing".to_string()]),
            selected: vec![
                vec!["F1".to_string(), "Renamed".to_string()],
                vec!["F2".to_string()],
            ],
        };
        let root = tree();
        let pending = ExplorerManager::restore(
            &record,
            &resolver_for(&root),
            Arc::new(ManualExecutor::new()),
            &ExplorerConfig::default(),
        )
        .unwrap();
        let manager = pending.wait().unwrap();

        assert_eq!(manager.explored_context().unwrap().name(), "R");
        let selected: Vec<String> = manager.selected_nodes().iter().map(|n| n.name()).collect();
        assert_eq!(selected, vec!["F2"]);
    }

    #[test]
    fn test_record_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let record = SessionRecord {
            root_handle: "h".to_string(),
            root_name: "R".to_string(),
            explored: None,
            selected: vec![vec!["A".to_string()]],
        };
        record.save_to_file(&path).unwrap();
        assert_eq!(SessionRecord::load_from_file(&path).unwrap(), record);
    }
}
