// src/portable/mod.rs

//! Portable Node.js installations
//!
//! A portable install is an unpacked official distribution archive living
//! under the manager's root, outside any system package manager:
//!
//! ```text
//! {root}/
//!   registry.json        version -> PortableInstallRecord
//!   registry.lock        flock serialising registry updates
//!   tmp/                 in-flight downloads
//!   versions/
//!     v20.11.1/          one directory per installed version
//!     .partial-XXXX/     extraction staging (same filesystem)
//! ```
//!
//! Install pipeline: resolve URL, download (hashing while streaming),
//! verify against `SHASUMS256.txt`, extract into a staging directory,
//! locate the executables, then under the registry lock rename the tree
//! into place and record it. A crash at any point before the final rename
//! leaves no registry entry and no `v{version}` directory.

pub mod archive;
pub mod client;
pub mod fetch;
pub mod registry;

pub use archive::ArchiveFormat;
pub use client::{InstallOptions, PackageManagerClient, PublishOptions};
pub use fetch::{ArchiveFetcher, HttpFetcher, ReleaseEntry};
pub use registry::{PortableInstallRecord, RegistryLock, VersionRegistry};

use crate::error::{Error, Result};
use crate::exec::ProcessExecutor;
use crate::hash::{HashingWriter, digests_match, parse_shasums};
use crate::install::PortableInstaller;
use crate::platform::{self, OsFamily, PlatformInfo};
use chrono::Utc;
use serde_json::Map;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Official Node.js distribution mirror
pub const DEFAULT_MIRROR: &str = "https://nodejs.org/dist";

/// Default bound on a single archive download
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Staging directories older than this are assumed abandoned
const STALE_PARTIAL_AGE: Duration = Duration::from_secs(3600);

const PARTIAL_PREFIX: &str = ".partial-";

/// Which distribution build to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistTarget {
    /// Platform segment of the file name: "linux", "darwin" or "win"
    pub os: String,
    /// Architecture segment, e.g. "x64" or "arm64"
    pub arch: String,
    pub format: ArchiveFormat,
}

impl DistTarget {
    /// Build matching `platform`
    pub fn from_platform(platform: &PlatformInfo) -> Result<Self> {
        let (os, format) = match &platform.os {
            OsFamily::Linux => ("linux", ArchiveFormat::TarXz),
            OsFamily::MacOs => ("darwin", ArchiveFormat::TarGz),
            OsFamily::Windows => ("win", ArchiveFormat::Zip),
            OsFamily::Other(other) => {
                return Err(Error::UnsupportedPlatform(format!(
                    "no Node.js distribution for {}",
                    other
                )));
            }
        };
        let arch = platform.arch.dist_name().ok_or_else(|| {
            Error::UnsupportedPlatform(format!(
                "no Node.js distribution for architecture {}",
                platform.arch
            ))
        })?;
        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
            format,
        })
    }

    /// Build for the running host
    pub fn host() -> Result<Self> {
        Self::from_platform(&platform::detect()?)
    }

    /// `node-v{version}-{os}-{arch}`, the archive's top-level folder name
    pub fn stem(&self, version: &str) -> String {
        format!("node-v{}-{}-{}", version, self.os, self.arch)
    }

    pub fn file_name(&self, version: &str) -> String {
        format!("{}.{}", self.stem(version), self.format.extension())
    }

    fn is_windows(&self) -> bool {
        self.os == "win"
    }

    /// Expected runtime and npm locations relative to the extracted root
    fn executables(&self) -> (&'static str, &'static str) {
        if self.is_windows() {
            ("node.exe", "npm.cmd")
        } else {
            ("bin/node", "bin/npm")
        }
    }
}

/// Portable manager settings
#[derive(Debug, Clone)]
pub struct PortableConfig {
    /// Base URL of the distribution mirror
    pub mirror: String,
    /// Check archives against `SHASUMS256.txt`
    pub verify_checksums: bool,
    /// Draw a progress bar while downloading
    pub show_progress: bool,
    pub download_timeout: Duration,
    /// Distribution build to fetch instead of the host's
    pub target: Option<DistTarget>,
}

impl Default for PortableConfig {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
            verify_checksums: true,
            show_progress: false,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            target: None,
        }
    }
}

impl PortableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = mirror.into();
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_target(mut self, target: DistTarget) -> Self {
        self.target = Some(target);
        self
    }
}

/// Downloads, verifies, unpacks and tracks portable Node.js versions
pub struct PortableVersionManager {
    root: PathBuf,
    config: PortableConfig,
    /// Platform the distribution target is derived from; detected when unset
    platform: Option<PlatformInfo>,
    fetcher: Box<dyn ArchiveFetcher>,
    executor: ProcessExecutor,
}

impl PortableVersionManager {
    /// Manager rooted at `root`, fetching over HTTP
    pub fn new(root: impl Into<PathBuf>, config: PortableConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.download_timeout, config.show_progress)?;
        Ok(Self {
            root: root.into(),
            config,
            platform: None,
            fetcher: Box::new(fetcher),
            executor: ProcessExecutor::default(),
        })
    }

    /// Replace the artifact source
    pub fn with_fetcher(mut self, fetcher: Box<dyn ArchiveFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Derive the distribution target from an already detected platform
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Executor handed to clients created by this manager
    pub fn with_executor(mut self, executor: ProcessExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PortableConfig {
        &self.config
    }

    /// Distribution build this manager installs
    ///
    /// Resolved on use, so registry operations work on hosts without a
    /// published distribution.
    pub fn target(&self) -> Result<DistTarget> {
        if let Some(target) = &self.config.target {
            return Ok(target.clone());
        }
        match &self.platform {
            Some(platform) => DistTarget::from_platform(platform),
            None => DistTarget::host(),
        }
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.versions_dir().join(format!("v{}", version))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("registry.lock")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn mirror(&self) -> &str {
        self.config.mirror.trim_end_matches('/')
    }

    /// Archive URL for an exact version
    pub fn download_url(&self, version: &str) -> Result<String> {
        let version = normalize_version(version)?;
        Ok(format!(
            "{}/v{}/{}",
            self.mirror(),
            version,
            self.target()?.file_name(&version)
        ))
    }

    fn shasums_url(&self, version: &str) -> String {
        format!("{}/v{}/SHASUMS256.txt", self.mirror(), version)
    }

    /// Turn `lts`, `latest`, a partial or an exact version into an exact one
    ///
    /// Exact versions resolve without network access.
    pub fn resolve_version(&self, spec: &str) -> Result<String> {
        if let Ok(exact) = normalize_version(spec) {
            return Ok(exact);
        }

        let url = format!("{}/index.json", self.mirror());
        let index = self
            .fetcher
            .fetch_text(&url)?
            .ok_or_else(|| Error::DownloadError(format!("release index not found at {}", url)))?;
        let releases = fetch::parse_release_index(&index)?;
        let version = fetch::select_release(spec, &releases)?;
        info!("Resolved '{}' to {}", spec, version);
        Ok(version)
    }

    /// Record for `version`, if installed
    pub fn record(&self, version: &str) -> Result<Option<PortableInstallRecord>> {
        let version = normalize_version(version)?;
        let registry = VersionRegistry::load(&self.registry_path())?;
        Ok(registry.get(&version).cloned())
    }

    /// All installed versions, ordered by version string
    pub fn list_installed(&self) -> Result<Vec<PortableInstallRecord>> {
        let registry = VersionRegistry::load(&self.registry_path())?;
        Ok(registry.records().cloned().collect())
    }

    /// Install an exact version, or return the existing record
    pub fn install(&self, version: &str) -> Result<PortableInstallRecord> {
        let version = normalize_version(version)?;
        if let Some(existing) = self.record(&version)? {
            info!("Node.js {} is already installed", version);
            return Ok(existing);
        }
        let target = self.target()?;

        let tmp_dir = self.tmp_dir();
        let versions_dir = self.versions_dir();
        fs::create_dir_all(&tmp_dir)?;
        fs::create_dir_all(&versions_dir)?;

        // 1. Resolve
        let file_name = target.file_name(&version);
        let url = format!("{}/v{}/{}", self.mirror(), version, file_name);

        // 2. Download, hashing as it streams
        let mut download = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(&format!(".{}", target.format.extension()))
            .tempfile_in(&tmp_dir)?;
        let mut writer = HashingWriter::new(download.as_file_mut());
        self.fetcher.download(&url, &mut writer)?;
        let size = writer.written();
        let (_, digest) = writer.finish();
        debug!("Downloaded {} ({} bytes), sha256 {}", file_name, size, digest);

        // 3. Verify
        if self.config.verify_checksums {
            self.verify_checksum(&version, &file_name, &digest)?;
        }

        // 4. Extract into staging
        let staging = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempdir_in(&versions_dir)?;
        let unpacked = staging.path().join("tree");
        archive::extract(download.path(), target.format, &unpacked)?;
        drop(download);
        let tree = archive::content_root(&unpacked)?;

        // 5. Locate executables
        let (runtime_rel, npm_rel) = locate_executables(&target, &tree)?;

        // 6. Commit under the registry lock
        let _lock = RegistryLock::acquire(&self.lock_path())?;
        self.purge_stale_partials(staging.path());

        let mut registry = VersionRegistry::load(&self.registry_path())?;
        if let Some(existing) = registry.get(&version) {
            info!("Node.js {} was installed concurrently, keeping that copy", version);
            return Ok(existing.clone());
        }

        let final_dir = self.version_dir(&version);
        if final_dir.exists() {
            warn!(
                "Removing unregistered leftover {} before install",
                final_dir.display()
            );
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tree, &final_dir).map_err(|e| {
            Error::IoError(format!(
                "failed to move {} into {}: {}",
                tree.display(),
                final_dir.display(),
                e
            ))
        })?;

        let record = PortableInstallRecord {
            version: version.clone(),
            runtime_path: final_dir.join(runtime_rel),
            package_manager_path: final_dir.join(npm_rel),
            install_path: final_dir.clone(),
            installed_at: Utc::now(),
            extra: Map::new(),
        };
        registry.insert(record.clone());
        if let Err(e) = registry.save(&self.registry_path()) {
            // Keep the directory and registry in agreement
            let _ = fs::remove_dir_all(&final_dir);
            return Err(e);
        }

        info!("Installed Node.js {} to {}", version, final_dir.display());
        Ok(record)
    }

    /// Remove an installed version and its directory
    pub fn uninstall(&self, version: &str) -> Result<PortableInstallRecord> {
        let version = normalize_version(version)?;
        let _lock = RegistryLock::acquire(&self.lock_path())?;

        let mut registry = VersionRegistry::load(&self.registry_path())?;
        let record = registry
            .remove(&version)
            .ok_or_else(|| Error::VersionNotInstalled(version.clone()))?;
        registry.save(&self.registry_path())?;

        if record.install_path.exists() {
            fs::remove_dir_all(&record.install_path).map_err(|e| {
                Error::IoError(format!(
                    "removed {} from the registry but could not delete {}: {}",
                    version,
                    record.install_path.display(),
                    e
                ))
            })?;
        }

        info!("Uninstalled Node.js {}", version);
        Ok(record)
    }

    /// Client bound to an installed version
    pub fn create_client(&self, version: &str) -> Result<PackageManagerClient> {
        let version = normalize_version(version)?;
        let record = self
            .record(&version)?
            .ok_or_else(|| Error::VersionNotInstalled(version.clone()))?;
        Ok(PackageManagerClient::from_record(&record, self.executor.clone()))
    }

    fn verify_checksum(&self, version: &str, file_name: &str, digest: &str) -> Result<()> {
        let url = self.shasums_url(version);
        let Some(listing) = self.fetcher.fetch_text(&url)? else {
            warn!("No SHASUMS256.txt for {}, skipping checksum verification", version);
            return Ok(());
        };

        match parse_shasums(&listing).get(file_name) {
            None => {
                warn!("SHASUMS256.txt has no entry for {}, skipping checksum verification", file_name);
                Ok(())
            }
            Some(expected) if digests_match(expected, digest) => {
                debug!("Checksum verified for {}", file_name);
                Ok(())
            }
            Some(expected) => Err(Error::IntegrityError {
                file: file_name.to_string(),
                expected: expected.clone(),
                actual: digest.to_string(),
            }),
        }
    }

    /// Delete abandoned staging directories, except `keep`
    fn purge_stale_partials(&self, keep: &Path) {
        let Ok(entries) = fs::read_dir(self.versions_dir()) else {
            return;
        };
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PARTIAL_PREFIX));
            if !is_partial || path == keep {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= STALE_PARTIAL_AGE);
            if stale {
                debug!("Purging abandoned staging directory {}", path.display());
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

impl PortableInstaller for PortableVersionManager {
    fn install_portable(&self, version: &str) -> Result<PortableInstallRecord> {
        let version = self.resolve_version(version)?;
        self.install(&version)
    }
}

/// Exact version without the leading `v`
fn normalize_version(version: &str) -> Result<String> {
    let trimmed = version.trim().trim_start_matches('v');
    semver::Version::parse(trimmed)
        .map(|v| v.to_string())
        .map_err(|e| Error::InvalidRequest(format!("'{}' is not an exact version: {}", version, e)))
}

/// Runtime and npm paths relative to `tree`
fn locate_executables(target: &DistTarget, tree: &Path) -> Result<(PathBuf, PathBuf)> {
    let (runtime, npm) = target.executables();
    let runtime = find_executable(tree, runtime)
        .ok_or_else(|| Error::ArchiveError(format!("archive has no {} executable", runtime)))?;
    let npm = find_executable(tree, npm)
        .ok_or_else(|| Error::ArchiveError(format!("archive has no {} executable", npm)))?;
    Ok((runtime, npm))
}

/// `expected` (relative) if it exists, else the first file with the same name
fn find_executable(tree: &Path, expected: &str) -> Option<PathBuf> {
    if tree.join(expected).exists() {
        return Some(PathBuf::from(expected));
    }
    let name = Path::new(expected).file_name()?;
    WalkDir::new(tree)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name() == name && !e.file_type().is_dir())
        .and_then(|e| e.path().strip_prefix(tree).ok().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Arch;

    fn linux_x64() -> DistTarget {
        DistTarget::from_platform(&PlatformInfo::new(OsFamily::Linux, Arch::X64)).unwrap()
    }

    #[test]
    fn test_dist_target_names() {
        let linux = linux_x64();
        assert_eq!(linux.file_name("20.11.1"), "node-v20.11.1-linux-x64.tar.xz");

        let mac = DistTarget::from_platform(&PlatformInfo::new(OsFamily::MacOs, Arch::Arm64)).unwrap();
        assert_eq!(mac.file_name("20.11.1"), "node-v20.11.1-darwin-arm64.tar.gz");

        let win = DistTarget::from_platform(&PlatformInfo::new(OsFamily::Windows, Arch::X64)).unwrap();
        assert_eq!(win.file_name("20.11.1"), "node-v20.11.1-win-x64.zip");
        assert_eq!(win.executables(), ("node.exe", "npm.cmd"));
    }

    #[test]
    fn test_unsupported_platform() {
        let bsd = PlatformInfo::new(OsFamily::Other("freebsd".to_string()), Arch::X64);
        assert!(matches!(
            DistTarget::from_platform(&bsd),
            Err(Error::UnsupportedPlatform(_))
        ));
        let riscv = PlatformInfo::new(OsFamily::Linux, Arch::Other("riscv64".to_string()));
        assert!(DistTarget::from_platform(&riscv).is_err());
    }

    #[test]
    fn test_download_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PortableConfig::new()
            .with_mirror("https://mirror.example/node/")
            .with_target(linux_x64());
        let manager = PortableVersionManager::new(dir.path(), config).unwrap();
        assert_eq!(
            manager.download_url("v20.11.1").unwrap(),
            "https://mirror.example/node/v20.11.1/node-v20.11.1-linux-x64.tar.xz"
        );
        assert!(matches!(
            manager.download_url("twenty"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("v20.11.1").unwrap(), "20.11.1");
        assert_eq!(normalize_version(" 18.19.0 ").unwrap(), "18.19.0");
        assert!(normalize_version("lts").is_err());
        assert!(normalize_version("20").is_err());
    }

    #[test]
    fn test_create_client_requires_install() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager =
            PortableVersionManager::new(dir.path(), PortableConfig::new().with_target(linux_x64()))
                .unwrap();
        assert!(matches!(
            manager.create_client("20.11.1"),
            Err(Error::VersionNotInstalled(v)) if v == "20.11.1"
        ));
        assert!(manager.list_installed().unwrap().is_empty());
    }

    #[test]
    fn test_find_executable_searches_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested/bin")).unwrap();
        fs::write(dir.path().join("nested/bin/node"), b"").unwrap();
        assert_eq!(
            find_executable(dir.path(), "bin/node"),
            Some(PathBuf::from("nested/bin/node"))
        );
        assert_eq!(find_executable(dir.path(), "bin/npm"), None);
    }
}
