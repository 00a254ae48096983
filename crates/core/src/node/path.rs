//! Name paths between nodes

use super::{NodeRef, same_node};
use crate::error::{Error, Result};

/// Whether `node` is `root` or one of its descendants.
pub fn is_under(node: &NodeRef, root: &NodeRef) -> bool {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if same_node(&candidate, root) {
            return true;
        }
        current = candidate.parent();
    }
    false
}

/// Names leading from `root` (exclusive) down to `node` (inclusive).
///
/// Returns `None` when `node` is not under `root`.
pub fn create_path(node: &NodeRef, root: &NodeRef) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut current = node.clone();
    loop {
        if same_node(&current, root) {
            names.reverse();
            return Some(names);
        }
        names.push(current.name());
        current = current.parent()?;
    }
}

/// Resolve a name path produced by [`create_path`] against `root`.
pub fn find_path<S: AsRef<str>>(root: &NodeRef, names: &[S]) -> Result<NodeRef> {
    let mut current = root.clone();
    for (depth, name) in names.iter().enumerate() {
        let name = name.as_ref();
        current = current.find_child(name).ok_or_else(|| {
            let walked: Vec<&str> = names[..=depth].iter().map(|s| s.as_ref()).collect();
            Error::Node(format!("No node at path {}", walked.join("/")))
        })?;
    }
    Ok(current)
}
