//! Configuration for explorer sessions

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ExplorerConfig {
    /// Debounce window for dropping destroyed nodes from the selection.
    pub selection_sync_delay_ms: u64,
    /// Initial flattening depth of list models.
    pub list_depth: usize,
    pub delivery_thread_name: String,
    pub restore_thread_name: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            selection_sync_delay_ms: 200,
            list_depth: 1,
            delivery_thread_name: "explorer-delivery".to_string(),
            restore_thread_name: "explorer-restore".to_string(),
        }
    }
}

impl ExplorerConfig {
    pub fn selection_sync_delay(&self) -> Duration {
        Duration::from_millis(self.selection_sync_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.list_depth == 0 {
            return Err(Error::Config("list_depth must be at least 1".to_string()));
        }
        if self.delivery_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "delivery_thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
        let mut current = start_path;

        loop {
            let config_path = current.join(".explorer.json");
            if config_path.exists() {
                return Some(config_path);
            }

            let config_path = current.join("explorer.json");
            if config_path.exists() {
                return Some(config_path);
            }

            current = current.parent()?;
        }
    }

    /// Load the nearest config file above the current directory, or defaults.
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        match Self::find_config_file(&cwd) {
            Some(path) => {
                tracing::debug!("Loading explorer config from {:?}", path);
                Self::load_from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }
}
