// src/platform/mod.rs

//! Host platform detection
//!
//! OS family and CPU architecture come from the compile-time target
//! (`std::env::consts`). On Linux the distribution is read from release
//! descriptor files, tried in order:
//!
//! 1. `etc/os-release`, then `usr/lib/os-release`
//! 2. `etc/lsb-release` (legacy)
//! 3. the kernel itself via `uname`, giving distribution "unknown"
//!
//! Every call to [`PlatformDetector::detect`] takes a fresh snapshot.

mod distro;

pub use distro::{Distro, PackageManagerFamily, family_for, parse_release_file};

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Operating system families
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    Other(String),
}

impl OsFamily {
    /// Map a `std::env::consts::OS` value
    pub fn from_target(os: &str) -> Self {
        match os {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("linux"),
            Self::MacOs => f.write_str("macos"),
            Self::Windows => f.write_str("windows"),
            Self::Other(os) => f.write_str(os),
        }
    }
}

/// CPU architectures
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    Arm64,
    Armv7l,
    X86,
    Ppc64le,
    S390x,
    Other(String),
}

impl Arch {
    /// Map a `std::env::consts::ARCH` value
    ///
    /// `powerpc64` is big-endian, for which no distribution is published;
    /// little-endian hosts are detected as `powerpc64le`.
    pub fn from_target(arch: &str) -> Self {
        match arch {
            "x86_64" => Self::X64,
            "aarch64" => Self::Arm64,
            "arm" => Self::Armv7l,
            "x86" => Self::X86,
            "powerpc64le" => Self::Ppc64le,
            "s390x" => Self::S390x,
            other => Self::Other(other.to_string()),
        }
    }

    /// Architecture name used in Node.js distribution file names
    pub fn dist_name(&self) -> Option<&'static str> {
        match self {
            Self::X64 => Some("x64"),
            Self::Arm64 => Some("arm64"),
            Self::Armv7l => Some("armv7l"),
            Self::X86 => Some("x86"),
            Self::Ppc64le => Some("ppc64le"),
            Self::S390x => Some("s390x"),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.dist_name()) {
            (_, Some(name)) => f.write_str(name),
            (Self::Other(arch), None) => f.write_str(arch),
            (_, None) => f.write_str("unknown"),
        }
    }
}

/// Where the Linux release information came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSource {
    OsRelease(PathBuf),
    LsbRelease(PathBuf),
    Kernel,
}

/// Linux distribution details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxRelease {
    pub distro: Distro,
    /// ID exactly as the descriptor spelled it
    pub id: String,
    pub id_like: Vec<String>,
    pub version: String,
    pub pretty_name: Option<String>,
    pub source: ReleaseSource,
}

impl LinuxRelease {
    pub fn package_manager_family(&self) -> PackageManagerFamily {
        family_for(&self.distro, &self.id_like)
    }
}

/// Snapshot of the host identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: OsFamily,
    pub arch: Arch,
    /// Present only on Linux
    pub linux: Option<LinuxRelease>,
    /// Whether the detecting process had root privileges
    pub elevated: bool,
}

impl PlatformInfo {
    /// Platform with no Linux release details, for non-Linux hosts and tests
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Self {
            os,
            arch,
            linux: None,
            elevated: false,
        }
    }

    pub fn with_linux(mut self, release: LinuxRelease) -> Self {
        self.linux = Some(release);
        self
    }

    pub fn is_windows(&self) -> bool {
        self.os == OsFamily::Windows
    }

    /// Executable suffix for this OS (`.exe` on Windows)
    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    pub fn distro(&self) -> Option<&Distro> {
        self.linux.as_ref().map(|r| &r.distro)
    }

    pub fn package_manager_family(&self) -> PackageManagerFamily {
        self.linux
            .as_ref()
            .map_or(PackageManagerFamily::None, LinuxRelease::package_manager_family)
    }

    /// Whether the detecting process ran with root privileges
    pub fn is_root_user(&self) -> bool {
        self.elevated
    }

    pub fn with_elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)?;
        if let Some(release) = &self.linux {
            write!(f, " ({} {})", release.distro, release.version)?;
        }
        Ok(())
    }
}

/// Detects the host platform
#[derive(Debug, Clone)]
pub struct PlatformDetector {
    root: PathBuf,
    os: String,
    arch: String,
}

/// `std::env::consts::ARCH`, with the byte order folded into `powerpc64`
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "powerpc64" if cfg!(target_endian = "little") => "powerpc64le",
        arch => arch,
    }
}

impl Default for PlatformDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformDetector {
    /// Detector for the running host
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
            os: std::env::consts::OS.to_string(),
            arch: host_arch().to_string(),
        }
    }

    /// Read release descriptors under `root` instead of `/`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::new()
        }
    }

    /// Report `os`/`arch` (in `std::env::consts` spelling) instead of the
    /// compile-time target
    pub fn with_target(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.os = os.into();
        self.arch = arch.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn detect(&self) -> Result<PlatformInfo> {
        if self.os.trim().is_empty() || self.arch.trim().is_empty() {
            return Err(Error::DetectionError(
                "operating system or architecture is unknown".to_string(),
            ));
        }

        let os = OsFamily::from_target(&self.os);
        let arch = Arch::from_target(&self.arch);
        let linux = match os {
            OsFamily::Linux => Some(self.detect_linux()?),
            _ => None,
        };

        let info = PlatformInfo {
            os,
            arch,
            linux,
            elevated: effective_root(),
        };
        debug!("Detected platform: {}", info);
        Ok(info)
    }

    fn detect_linux(&self) -> Result<LinuxRelease> {
        for relative in ["etc/os-release", "usr/lib/os-release"] {
            let path = self.root.join(relative);
            if let Some(content) = read_descriptor(&path) {
                return Ok(from_os_release(&content, path));
            }
        }

        let lsb = self.root.join("etc/lsb-release");
        if let Some(content) = read_descriptor(&lsb) {
            return Ok(from_lsb_release(&content, lsb));
        }

        debug!(
            "No release descriptor under {}, falling back to kernel identity",
            self.root.display()
        );
        from_kernel()
    }
}

/// Detect the running host
pub fn detect() -> Result<PlatformInfo> {
    PlatformDetector::new().detect()
}

/// Always false on non-Unix hosts
fn effective_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn read_descriptor(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

fn from_os_release(content: &str, path: PathBuf) -> LinuxRelease {
    let mut fields = parse_release_file(content);
    let id = fields.remove("ID").unwrap_or_default();
    let version = fields
        .remove("VERSION_ID")
        .or_else(|| fields.remove("BUILD_ID"))
        .unwrap_or_else(|| "unknown".to_string());
    let id_like = fields
        .remove("ID_LIKE")
        .map(|like| like.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    LinuxRelease {
        distro: Distro::from_id(&id),
        id,
        id_like,
        version,
        pretty_name: fields.remove("PRETTY_NAME"),
        source: ReleaseSource::OsRelease(path),
    }
}

fn from_lsb_release(content: &str, path: PathBuf) -> LinuxRelease {
    let mut fields = parse_release_file(content);
    let id = fields.remove("DISTRIB_ID").unwrap_or_default();

    LinuxRelease {
        distro: Distro::from_id(&id),
        id,
        id_like: Vec::new(),
        version: fields
            .remove("DISTRIB_RELEASE")
            .unwrap_or_else(|| "unknown".to_string()),
        pretty_name: fields.remove("DISTRIB_DESCRIPTION"),
        source: ReleaseSource::LsbRelease(path),
    }
}

#[cfg(unix)]
fn from_kernel() -> Result<LinuxRelease> {
    let uts = nix::sys::utsname::uname()
        .map_err(|e| Error::DetectionError(format!("no release descriptor and uname failed: {}", e)))?;

    Ok(LinuxRelease {
        distro: Distro::Unknown,
        id: "unknown".to_string(),
        id_like: Vec::new(),
        version: uts.release().to_string_lossy().into_owned(),
        pretty_name: Some(uts.sysname().to_string_lossy().into_owned()),
        source: ReleaseSource::Kernel,
    })
}

#[cfg(not(unix))]
fn from_kernel() -> Result<LinuxRelease> {
    Err(Error::DetectionError(
        "no release descriptor and no kernel identity available".to_string(),
    ))
}
