use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use explorer_core::ExplorerConfig;
use std::path::PathBuf;

use crate::commands::{restore_command, select_command, tree_command};

#[derive(Parser, Debug)]
#[command(name = "explorer")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging")]
pub struct Cli {
    /// Explorer config file (defaults to the nearest .explorer.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a tree file as a depth-flattened list
    #[command(visible_alias = "t")]
    Tree {
        /// JSON tree description
        tree: PathBuf,

        /// Flattening depth (defaults to the configured list depth)
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Select nodes by name path (e.g. F1/L2) and record the session
    #[command(visible_alias = "s")]
    Select {
        /// JSON tree description
        tree: PathBuf,

        /// Name paths of the nodes to select, relative to the root
        paths: Vec<String>,

        /// Name path of the explored context
        #[arg(short, long)]
        explored: Option<String>,

        /// Write the session record here instead of printing it
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Restore a recorded session against a tree file
    #[command(visible_alias = "r")]
    Restore {
        /// JSON tree description
        tree: PathBuf,

        /// Session record written by `select`
        session: PathBuf,
    },
}

impl Cli {
    pub fn load_config(&self) -> Result<ExplorerConfig> {
        let config = match &self.config {
            Some(path) => ExplorerConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ExplorerConfig::load().context("Failed to load explorer config")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Execute the command
    pub fn execute(self) -> Result<()> {
        let config = self.load_config()?;
        match self.command {
            Commands::Tree { tree, depth } => tree_command(&tree, depth, &config),
            Commands::Select {
                tree,
                paths,
                explored,
                save,
            } => select_command(&tree, &paths, explored.as_deref(), save.as_deref(), &config),
            Commands::Restore { tree, session } => restore_command(&tree, &session, &config),
        }
    }
}
