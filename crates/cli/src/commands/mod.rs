pub mod restore;
pub mod select;
pub mod tree;

pub use restore::restore_command;
pub use select::select_command;
pub use tree::tree_command;

use anyhow::{Context, Result};
use explorer_core::node::{NodeSpec, create_path, find_path};
use explorer_core::{MemoryNode, Node, NodeRef};
use std::path::Path;
use std::sync::Arc;

pub(crate) fn load_tree(path: &Path) -> Result<Arc<MemoryNode>> {
    let spec = NodeSpec::load_from_file(path)
        .with_context(|| format!("Failed to load tree from {}", path.display()))?;
    Ok(MemoryNode::from_spec(&spec))
}

/// Split `F1/L2` into its names. An empty path names the root.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|name| !name.is_empty()).collect()
}

pub(crate) fn resolve(root: &NodeRef, path: &str) -> Result<NodeRef> {
    find_path(root, &split_path(path)).with_context(|| format!("No node at '{path}'"))
}

pub(crate) fn display_path(node: &NodeRef, root: &NodeRef) -> String {
    match create_path(node, root) {
        Some(names) if names.is_empty() => "/".to_string(),
        Some(names) => names.join("/"),
        None => format!("<{}>", node.display_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("F1/L2"), vec!["F1", "L2"]);
        assert_eq!(split_path("/F1//L2/"), vec!["F1", "L2"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_resolve_and_display() {
        let root = MemoryNode::root("R");
        root.add_child("F1").add_leaf("L2");
        let root: NodeRef = root;
        let leaf = resolve(&root, "F1/L2").unwrap();
        assert_eq!(display_path(&leaf, &root), "F1/L2");
        assert_eq!(display_path(&root, &root), "/");
        assert!(resolve(&root, "F1/missing").is_err());
    }
}
