use anyhow::{Context, Result};
use explorer_core::{
    ExplorerConfig, ExplorerManager, ManualExecutor, NodeRef, PropertyChangeEvent, PropertyChangeListener,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{display_path, load_tree, resolve};

/// Prints every property change the manager announces.
pub(crate) struct ChangePrinter;

impl PropertyChangeListener for ChangePrinter {
    fn property_change(&self, event: &PropertyChangeEvent) {
        println!("{}: {:?} -> {:?}", event.property, event.old, event.new);
    }
}

pub fn select_command(
    tree: &Path,
    paths: &[String],
    explored: Option<&str>,
    save: Option<&Path>,
    config: &ExplorerConfig,
) -> Result<()> {
    let root: NodeRef = load_tree(tree)?;
    let executor = Arc::new(ManualExecutor::new());
    let manager = ExplorerManager::new(executor.clone(), config);
    manager.set_root_context(root.clone());
    executor.run_until_idle();
    manager.add_property_change_listener(Arc::new(ChangePrinter));

    let explored = explored.map(|path| resolve(&root, path)).transpose()?;
    let selection = paths
        .iter()
        .map(|path| resolve(&root, path))
        .collect::<Result<Vec<_>>>()?;
    debug!("Selecting {} node(s)", selection.len());

    match explored {
        Some(node) => manager.set_explored_context_and_selection(Some(node), selection)?,
        None => manager.set_selected_nodes(selection)?,
    }
    executor.run_until_idle();

    for node in manager.selected_nodes() {
        println!("selected {}", display_path(&node, &root));
    }

    let record = manager.session().context("Tree root has no handle to record")?;
    match save {
        Some(path) => {
            record
                .save_to_file(path)
                .with_context(|| format!("Failed to write session to {}", path.display()))?;
            info!("Session saved to {}", path.display());
            println!("session saved to {}", path.display());
        }
        None => println!("{}", record.to_json()?),
    }
    Ok(())
}
