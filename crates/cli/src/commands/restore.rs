use anyhow::{Context, Result, bail};
use explorer_core::{ExplorerConfig, ExplorerManager, ManualExecutor, Node, NodeRef, SessionRecord};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::{display_path, load_tree};

pub fn restore_command(tree: &Path, session: &Path, config: &ExplorerConfig) -> Result<()> {
    let root: NodeRef = load_tree(tree)?;
    let record = SessionRecord::load_from_file(session)
        .with_context(|| format!("Failed to read session from {}", session.display()))?;

    let candidate = root.clone();
    let resolver = move |handle: &str| (candidate.handle().as_deref() == Some(handle)).then(|| candidate.clone());
    let executor = Arc::new(ManualExecutor::new());
    let pending = match ExplorerManager::restore(&record, &resolver, executor.clone(), config) {
        Ok(pending) => pending,
        Err(e) if e.is_safe() => {
            warn!("Session root {} is not available", record.root_name);
            bail!("Cannot restore session: {e}");
        }
        Err(e) => return Err(e.into()),
    };
    let manager = pending.wait()?;
    executor.run_until_idle();

    match manager.explored_context() {
        Some(node) => println!("explored {}", display_path(&node, &root)),
        None => println!("explored <none>"),
    }
    let selected = manager.selected_nodes();
    for node in &selected {
        println!("selected {}", display_path(node, &root));
    }
    let dropped = record.selected.len().saturating_sub(selected.len());
    if dropped > 0 {
        println!("dropped {dropped} stale selection path(s)");
    }
    Ok(())
}
