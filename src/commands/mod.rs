// src/commands/mod.rs
//! Command handlers for the npmkit CLI

mod npm;
mod provision;
mod versions;

pub use npm::{cmd_batch, cmd_npm, cmd_outdated};
pub use provision::{cmd_completions, cmd_detect, cmd_plan, cmd_provision};
pub use versions::{cmd_install, cmd_list, cmd_uninstall};

use anyhow::{Context, Result};
use npmkit::{Config, PackageManagerClient, PortableVersionManager, ProcessExecutor};
use std::path::{Path, PathBuf};

/// Name that selects the npm found on PATH instead of a portable version
pub const SYSTEM_VERSION: &str = "system";

/// Resolved configuration shared by every command
pub struct Session {
    pub config: Config,
    pub root: PathBuf,
}

impl Session {
    /// Load the config file and apply command-line overrides
    pub fn open(config_path: Option<&Path>, root: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::load_default().context("Failed to load configuration")?,
        };
        if let Some(root) = root {
            config = config.with_root(root);
        }
        let root = config
            .root_dir()
            .context("Failed to determine the npmkit data directory")?;
        Ok(Self { config, root })
    }

    pub fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(self.config.executor_config())
    }

    pub fn manager(&self) -> Result<PortableVersionManager> {
        let manager = PortableVersionManager::new(&self.root, self.config.portable_config())
            .context("Failed to set up the portable version manager")?;
        Ok(manager.with_executor(self.executor()))
    }

    /// Client for an installed portable version, or the system npm
    pub fn client(&self, version: &str) -> Result<PackageManagerClient> {
        if version == SYSTEM_VERSION {
            return PackageManagerClient::system(self.executor())
                .context("No system Node.js found; provision one first");
        }
        self.manager()?
            .create_client(version)
            .with_context(|| format!("Node.js {} is not available", version))
    }
}
