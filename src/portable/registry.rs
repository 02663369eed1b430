// src/portable/registry.rs

//! On-disk registry of portable installs
//!
//! `registry.json` maps version → [`PortableInstallRecord`]. Fields this
//! version of npmkit does not know about are carried through unchanged on
//! rewrite, at both the top level and inside each record.
//!
//! Read-modify-write cycles are serialised across processes with an
//! exclusive `flock` on `registry.lock` ([`RegistryLock`]).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One installed portable version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableInstallRecord {
    /// Exact version without the leading `v`
    pub version: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    /// The `node` executable
    pub runtime_path: PathBuf,
    /// The `npm` executable
    pub package_manager_path: PathBuf,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PortableInstallRecord {
    /// Directory holding the runtime executable
    pub fn bin_dir(&self) -> &Path {
        self.runtime_path.parent().unwrap_or(&self.install_path)
    }
}

/// The registry file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionRegistry {
    #[serde(default)]
    versions: BTreeMap<String, PortableInstallRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl VersionRegistry {
    /// Load the registry; a missing file is an empty registry
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Error::RegistryError(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .map_err(|e| Error::RegistryError(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Atomically replace the registry file (temp file in the same directory, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(self)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".registry-")
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(|e| Error::RegistryError(format!("failed to create temp file: {}", e)))?;
        temp.write_all(json.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| {
            Error::RegistryError(format!("failed to replace {}: {}", path.display(), e.error))
        })?;

        debug!("Wrote registry with {} versions to {}", self.versions.len(), path.display());
        Ok(())
    }

    pub fn get(&self, version: &str) -> Option<&PortableInstallRecord> {
        self.versions.get(version)
    }

    /// Insert or replace the record for its version
    pub fn insert(&mut self, record: PortableInstallRecord) {
        self.versions.insert(record.version.clone(), record);
    }

    pub fn remove(&mut self, version: &str) -> Option<PortableInstallRecord> {
        self.versions.remove(version)
    }

    /// Records ordered by version string
    pub fn records(&self) -> impl Iterator<Item = &PortableInstallRecord> {
        self.versions.values()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Exclusive lock on the registry, released on drop
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Block until the lock is held
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| Error::RegistryError(format!("failed to open {}: {}", path.display(), e)))?;
        file.lock_exclusive().map_err(|e| {
            Error::RegistryError(format!("failed to lock {}: {}", path.display(), e))
        })?;

        debug!("Acquired registry lock at {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released registry lock at {}", self.path.display());
    }
}
