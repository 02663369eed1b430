// src/manifest.rs

//! `package.json` reading and editing
//!
//! Only the fields npmkit works with are typed; everything else in the
//! document is kept verbatim and written back on save.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Manifest file name inside a project
pub const MANIFEST_FILE: &str = "package.json";

/// Which dependency table an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// `dependencies`
    Runtime,
    /// `devDependencies`
    Dev,
}

/// A parsed `package.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Empty manifest with a name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: Some(version.into()),
            ..Self::default()
        }
    }

    /// Read `path`, or `{path}/package.json` when `path` is a directory
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_dir() {
            path.join(MANIFEST_FILE)
        } else {
            path.to_path_buf()
        };
        let content = fs::read_to_string(&file).map_err(|e| {
            Error::ManifestError(format!("failed to read {}: {}", file.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::ManifestError(format!("{}: {}", file.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ManifestError(format!("invalid package.json: {}", e)))
    }

    /// Write as two-space indented JSON with a trailing newline
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(path, json).map_err(|e| {
            Error::ManifestError(format!("failed to write {}: {}", path.display(), e))
        })?;
        debug!("Wrote manifest {}", path.display());
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    pub fn set_script(&mut self, name: impl Into<String>, command: impl Into<String>) {
        self.scripts.insert(name.into(), command.into());
    }

    fn table(&self, kind: DependencyKind) -> &BTreeMap<String, String> {
        match kind {
            DependencyKind::Runtime => &self.dependencies,
            DependencyKind::Dev => &self.dev_dependencies,
        }
    }

    fn table_mut(&mut self, kind: DependencyKind) -> &mut BTreeMap<String, String> {
        match kind {
            DependencyKind::Runtime => &mut self.dependencies,
            DependencyKind::Dev => &mut self.dev_dependencies,
        }
    }

    /// Add or replace a dependency, removing it from the other table
    pub fn add_dependency(
        &mut self,
        name: impl Into<String>,
        range: impl Into<String>,
        kind: DependencyKind,
    ) {
        let name = name.into();
        let other = match kind {
            DependencyKind::Runtime => DependencyKind::Dev,
            DependencyKind::Dev => DependencyKind::Runtime,
        };
        self.table_mut(other).remove(&name);
        self.table_mut(kind).insert(name, range.into());
    }

    /// Remove from both tables, returning the declared range if present
    pub fn remove_dependency(&mut self, name: &str) -> Option<String> {
        let runtime = self.dependencies.remove(name);
        let dev = self.dev_dependencies.remove(name);
        runtime.or(dev)
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }

    /// Declared range for `name`, runtime table first
    pub fn dependency_range(&self, name: &str) -> Option<&str> {
        self.dependencies
            .get(name)
            .or_else(|| self.dev_dependencies.get(name))
            .map(String::as_str)
    }

    pub fn dependency_names(&self, kind: DependencyKind) -> Vec<&str> {
        self.table(kind).keys().map(String::as_str).collect()
    }

    /// Every declared dependency as (name, range), runtime then dev
    pub fn all_dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .map(|(name, range)| (name.as_str(), range.as_str()))
    }
}

/// Whether `latest` is newer than the version named by `declared`
///
/// A leading `^`, `~` or `=` is stripped and the rest compared as a plain
/// version; ranges are not evaluated. Anything that does not parse (tags,
/// URLs, `*`) is never reported outdated.
pub fn is_outdated(declared: &str, latest: &str) -> bool {
    let declared = declared
        .trim()
        .trim_start_matches(['^', '~', '='])
        .trim_start_matches('v');
    match (
        semver::Version::parse(declared),
        semver::Version::parse(latest.trim().trim_start_matches('v')),
    ) {
        (Ok(declared), Ok(latest)) => latest > declared,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PACKAGE_JSON: &str = r#"{
  "name": "demo-app",
  "version": "1.0.0",
  "private": true,
  "scripts": { "test": "jest" },
  "dependencies": { "express": "^4.18.2" },
  "devDependencies": { "jest": "~29.7.0" },
  "engines": { "node": ">=18" }
}"#;

    #[test]
    fn test_parse_fields() {
        let manifest = Manifest::parse(PACKAGE_JSON).unwrap();
        assert_eq!(manifest.name(), Some("demo-app"));
        assert_eq!(manifest.script("test"), Some("jest"));
        assert_eq!(manifest.dependency_range("jest"), Some("~29.7.0"));
        assert_eq!(manifest.dependency_names(DependencyKind::Runtime), vec!["express"]);
        assert_eq!(manifest.all_dependencies().count(), 2);
    }

    #[test]
    fn test_save_preserves_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, PACKAGE_JSON).unwrap();

        let mut manifest = Manifest::load(dir.path()).unwrap();
        manifest.add_dependency("lodash", "^4.17.21", DependencyKind::Runtime);
        manifest.save(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("}\n"));
        let raw: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(raw["private"], true);
        assert_eq!(raw["engines"]["node"], ">=18");
        assert_eq!(raw["dependencies"]["lodash"], "^4.17.21");
    }

    #[test]
    fn test_add_moves_between_tables() {
        let mut manifest = Manifest::parse(PACKAGE_JSON).unwrap();
        manifest.add_dependency("jest", "^29.7.0", DependencyKind::Runtime);
        assert!(manifest.dev_dependencies.is_empty());
        assert_eq!(manifest.dependency_range("jest"), Some("^29.7.0"));

        assert_eq!(manifest.remove_dependency("jest").as_deref(), Some("^29.7.0"));
        assert!(!manifest.has_dependency("jest"));
        assert_eq!(manifest.remove_dependency("jest"), None);
    }

    #[test]
    fn test_new_manifest_serializes_minimally() {
        let manifest = Manifest::new("empty", "0.1.0");
        let raw: Value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(raw.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(matches!(
            Manifest::parse("[1, 2]"),
            Err(Error::ManifestError(_))
        ));
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::load(&dir.path().join("missing.json")),
            Err(Error::ManifestError(_))
        ));
    }

    #[test]
    fn test_is_outdated() {
        assert!(is_outdated("^4.18.2", "4.19.0"));
        assert!(is_outdated("~1.0.0", "2.0.0"));
        assert!(!is_outdated("4.19.0", "4.19.0"));
        assert!(!is_outdated("^5.0.0", "4.19.0"));
        assert!(!is_outdated("latest", "4.19.0"));
        assert!(!is_outdated("*", "1.0.0"));
    }
}
