// src/platform/distro.rs

//! Linux distribution identification from release descriptor files

use std::collections::HashMap;
use std::fmt;

/// Known Linux distributions
///
/// Unrecognised IDs are kept verbatim in [`Distro::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Distro {
    Ubuntu,
    Debian,
    Fedora,
    Rhel,
    CentOs,
    Rocky,
    Alma,
    Amazon,
    Arch,
    Manjaro,
    Alpine,
    OpenSuse,
    Gentoo,
    Unknown,
    Other(String),
}

impl Distro {
    /// Map a release ID (`ID=` or `DISTRIB_ID=`) onto a known distribution
    ///
    /// Matching is case-insensitive; suffixed IDs such as `opensuse-leap`
    /// or `manjaro-arm` match by prefix.
    pub fn from_id(id: &str) -> Self {
        let trimmed = id.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "" | "unknown" => Self::Unknown,
            "ubuntu" => Self::Ubuntu,
            "debian" => Self::Debian,
            "fedora" => Self::Fedora,
            "rhel" | "redhat" | "redhatenterpriseserver" => Self::Rhel,
            "centos" => Self::CentOs,
            "rocky" => Self::Rocky,
            "almalinux" | "alma" => Self::Alma,
            "amzn" | "amazon" => Self::Amazon,
            "arch" | "archlinux" => Self::Arch,
            "alpine" => Self::Alpine,
            "gentoo" => Self::Gentoo,
            s if s.starts_with("manjaro") => Self::Manjaro,
            s if s.starts_with("opensuse") || s.starts_with("suse") || s == "sles" => {
                Self::OpenSuse
            }
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Package-manager family native to this distribution
    ///
    /// `Other` has no family of its own; see [`family_for`].
    pub fn native_family(&self) -> PackageManagerFamily {
        match self {
            Self::Ubuntu | Self::Debian => PackageManagerFamily::Apt,
            Self::Fedora | Self::Rhel | Self::Rocky | Self::Alma => PackageManagerFamily::Dnf,
            Self::CentOs | Self::Amazon => PackageManagerFamily::Yum,
            Self::Arch | Self::Manjaro => PackageManagerFamily::Pacman,
            Self::Alpine => PackageManagerFamily::Apk,
            Self::OpenSuse => PackageManagerFamily::Zypper,
            Self::Gentoo => PackageManagerFamily::Emerge,
            Self::Unknown | Self::Other(_) => PackageManagerFamily::None,
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ubuntu => "ubuntu",
            Self::Debian => "debian",
            Self::Fedora => "fedora",
            Self::Rhel => "rhel",
            Self::CentOs => "centos",
            Self::Rocky => "rocky",
            Self::Alma => "almalinux",
            Self::Amazon => "amzn",
            Self::Arch => "arch",
            Self::Manjaro => "manjaro",
            Self::Alpine => "alpine",
            Self::OpenSuse => "opensuse",
            Self::Gentoo => "gentoo",
            Self::Unknown => "unknown",
            Self::Other(id) => id,
        };
        f.write_str(name)
    }
}

/// System package manager families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerFamily {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Apk,
    Zypper,
    Emerge,
    None,
}

impl PackageManagerFamily {
    /// Executable that drives this family, if any
    pub fn program(self) -> Option<&'static str> {
        match self {
            Self::Apt => Some("apt-get"),
            Self::Dnf => Some("dnf"),
            Self::Yum => Some("yum"),
            Self::Pacman => Some("pacman"),
            Self::Apk => Some("apk"),
            Self::Zypper => Some("zypper"),
            Self::Emerge => Some("emerge"),
            Self::None => None,
        }
    }
}

impl fmt::Display for PackageManagerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.program() {
            Some(program) => f.write_str(program),
            None => f.write_str("none"),
        }
    }
}

/// Package-manager family for a distribution, falling back to `ID_LIKE`
pub fn family_for(distro: &Distro, id_like: &[String]) -> PackageManagerFamily {
    let native = distro.native_family();
    if native != PackageManagerFamily::None {
        return native;
    }
    id_like
        .iter()
        .map(|like| Distro::from_id(like).native_family())
        .find(|family| *family != PackageManagerFamily::None)
        .unwrap_or(PackageManagerFamily::None)
}

/// Parse `KEY=value` descriptor content (os-release and lsb-release format)
///
/// Blank lines and `#` comments are skipped; single or double quotes around
/// values are removed.
pub fn parse_release_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim())))
        .collect()
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        value[1..value.len() - 1].replace("\\\"", "\"")
    } else {
        value.to_string()
    }
}
