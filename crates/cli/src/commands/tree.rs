use anyhow::{Context, Result};
use explorer_core::{ExplorerConfig, Node, NodeListModel, NodeRef, VisualizerContext};
use std::path::Path;
use tracing::debug;

use super::load_tree;

pub fn tree_command(tree: &Path, depth: Option<usize>, config: &ExplorerConfig) -> Result<()> {
    let root: NodeRef = load_tree(tree)?;
    let depth = depth.unwrap_or(config.list_depth);
    debug!("Flattening {} to depth {}", root.display_name(), depth);

    let context = VisualizerContext::with_worker(config).context("Failed to start delivery thread")?;
    let model = NodeListModel::new(context, &root, depth)?;
    let mirror_root = model.root();

    println!("{}", root.display_name());
    for index in 0..model.size() {
        let Some(node) = model.element_at(index) else {
            continue;
        };
        let level = node.path_from(&mirror_root).map_or(1, |path| path.len() - 1);
        let marker = if node.is_leaf() { "" } else { "/" };
        println!("{}{}{}", "  ".repeat(level), node.display_name(), marker);
    }
    Ok(())
}
