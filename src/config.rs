// src/config.rs

//! npmkit configuration
//!
//! Loaded from `{home}/config.toml`, where home is `$NPMKIT_HOME` or the
//! platform data directory plus `npmkit`. Every field is optional in the
//! file; a missing file yields the defaults.
//!
//! ```toml
//! mirror = "https://nodejs.org/dist"
//! default_timeout_secs = 600
//! concurrency = 4
//! use_sudo = true
//! ```

use crate::error::{Error, Result};
use crate::exec::{DEFAULT_KILL_GRACE, DEFAULT_TIMEOUT, ExecutorConfig, batch::DEFAULT_CONCURRENCY};
use crate::install::{DEFAULT_VERSION, ProvisionOptions};
use crate::portable::{DEFAULT_MIRROR, PortableConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "NPMKIT_HOME";

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

/// npmkit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for portable installs; defaults to the data directory
    pub root: Option<PathBuf>,

    /// Distribution mirror base URL
    pub mirror: String,

    /// Timeout for commands that do not set their own
    pub default_timeout_secs: u64,

    /// Wait between SIGTERM and SIGKILL
    pub kill_grace_secs: u64,

    /// Batch worker slots
    pub concurrency: usize,

    /// Check downloads against SHASUMS256.txt
    pub verify_checksums: bool,

    /// Prefix privileged installer steps with `sudo -n`
    pub use_sudo: bool,

    /// Version provisioned when none is given
    pub default_version: String,

    /// Draw download progress bars
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            mirror: DEFAULT_MIRROR.to_string(),
            default_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            kill_grace_secs: DEFAULT_KILL_GRACE.as_secs(),
            concurrency: DEFAULT_CONCURRENCY,
            verify_checksums: true,
            use_sudo: true,
            default_version: DEFAULT_VERSION.to_string(),
            show_progress: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// `$NPMKIT_HOME`, else `{data_local_dir}/npmkit`
    pub fn home_dir() -> Result<PathBuf> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home));
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("npmkit"))
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "cannot determine a data directory; set {}",
                    HOME_ENV
                ))
            })
    }

    /// Load `{home}/config.toml`
    pub fn load_default() -> Result<Self> {
        let home = Self::home_dir()?;
        let mut config = Self::load_or_default(&home.join(CONFIG_FILE))?;
        if config.root.is_none() {
            config.root = Some(home);
        }
        Ok(config)
    }

    /// Load `path`, or the defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load and validate `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as TOML, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| {
            Error::ConfigError(format!("failed to write {}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let mirror = url::Url::parse(&self.mirror)
            .map_err(|e| Error::ConfigError(format!("invalid mirror URL '{}': {}", self.mirror, e)))?;
        if !matches!(mirror.scheme(), "http" | "https") {
            return Err(Error::ConfigError(format!(
                "unsupported mirror scheme '{}'",
                mirror.scheme()
            )));
        }
        if self.default_timeout_secs == 0 {
            return Err(Error::ConfigError(
                "default_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.default_version.trim().is_empty() {
            return Err(Error::ConfigError("default_version is empty".to_string()));
        }
        Ok(())
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = mirror.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace_secs = grace.as_secs();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = version.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Portable install root, falling back to the data directory
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Self::home_dir(),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::new()
            .with_default_timeout(Duration::from_secs(self.default_timeout_secs))
            .with_kill_grace(Duration::from_secs(self.kill_grace_secs))
    }

    pub fn portable_config(&self) -> PortableConfig {
        PortableConfig::new()
            .with_mirror(self.mirror.clone())
            .with_verify_checksums(self.verify_checksums)
            .with_progress(self.show_progress)
    }

    /// Provisioning options for `version`, or the configured default
    pub fn provision_options(&self, version: Option<&str>) -> ProvisionOptions {
        ProvisionOptions::new(version.unwrap_or(&self.default_version))
            .with_mirror(self.mirror.clone())
            .with_sudo(self.use_sudo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mirror, DEFAULT_MIRROR);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "mirror = \"https://mirror.example/node\"\nconcurrency = 8\nuse_sudo = false\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.mirror, "https://mirror.example/node");
        assert_eq!(config.concurrency, 8);
        assert!(!config.use_sudo);
        assert!(config.verify_checksums);
        assert_eq!(config.default_version, DEFAULT_VERSION);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::new().with_mirror("not a url").validate().is_err());
        assert!(Config::new().with_mirror("ftp://x.example").validate().is_err());
        assert!(Config::new().with_mirror("file:///srv/node-dist").validate().is_err());
        assert!(Config::new().with_concurrency(0).validate().is_err());
        assert!(
            Config::new()
                .with_default_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config::new()
            .with_root(dir.path())
            .with_kill_grace(Duration::from_secs(5))
            .with_progress(false);
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_derived_configs() {
        let config = Config::new()
            .with_default_timeout(Duration::from_secs(30))
            .with_kill_grace(Duration::from_secs(1))
            .with_verify_checksums(false);

        let exec = config.executor_config();
        assert_eq!(exec.default_timeout, Duration::from_secs(30));
        assert_eq!(exec.kill_grace, Duration::from_secs(1));

        let portable = config.portable_config();
        assert!(!portable.verify_checksums);
        assert_eq!(portable.mirror, DEFAULT_MIRROR);

        let options = config.provision_options(None);
        assert_eq!(options.version, DEFAULT_VERSION);
    }
}
