// src/portable/archive.rs

//! Distribution archive extraction
//!
//! Supports the three formats Node.js publishes: `.tar.xz` (Linux),
//! `.tar.gz` (macOS) and `.zip` (Windows). Entries that would land outside
//! the destination (absolute paths, `..` components) abort extraction.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use xz2::read::XzDecoder;

/// Archive formats used by Node.js distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    TarXz,
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// File extension without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarXz => "tar.xz",
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

/// Extract `archive` into `dest`, creating it if needed
pub fn extract(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let file = File::open(archive)
        .map_err(|e| Error::ArchiveError(format!("cannot open {}: {}", archive.display(), e)))?;
    let reader = BufReader::new(file);

    debug!("Extracting {} into {}", archive.display(), dest.display());
    match format {
        ArchiveFormat::TarXz => extract_tar(XzDecoder::new(reader), dest),
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(reader), dest),
        ArchiveFormat::Zip => extract_zip(reader, dest),
    }
}

/// The directory holding the extracted tree
///
/// Distribution archives wrap everything in one `node-v…` folder; when `dir`
/// contains exactly one directory and nothing else, that directory is the
/// root. Otherwise `dir` itself is.
pub fn content_root(dir: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() == 1 {
        let only = entries.remove(0);
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(dir.to_path_buf())
}

/// Reject paths that are absolute or climb out of the destination
fn check_entry_path(path: &Path) -> Result<()> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(Error::ArchiveError(format!(
            "refusing to extract entry outside destination: {}",
            path.display()
        )));
    }
    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| Error::ArchiveError(format!("cannot read tar entries: {}", e)))?;
    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ArchiveError(format!("corrupt tar entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::ArchiveError(format!("invalid tar entry path: {}", e)))?
            .into_owned();
        check_entry_path(&path)?;

        let unpacked = entry.unpack_in(dest).map_err(|e| {
            Error::ArchiveError(format!("failed to extract {}: {}", path.display(), e))
        })?;
        if !unpacked {
            return Err(Error::ArchiveError(format!(
                "refusing to extract entry outside destination: {}",
                path.display()
            )));
        }
        count += 1;
    }

    debug!("Extracted {} tar entries", count);
    Ok(())
}

fn extract_zip<R: Read + io::Seek>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| Error::ArchiveError(format!("invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::ArchiveError(format!("corrupt zip entry {}: {}", i, e)))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::ArchiveError(format!(
                "refusing to extract entry outside destination: {}",
                entry.name()
            )));
        };
        check_entry_path(&relative)?;

        let output = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&output)?;
            continue;
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&output)?;
        io::copy(&mut entry, &mut file).map_err(|e| {
            Error::ArchiveError(format!("failed to extract {}: {}", relative.display(), e))
        })?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&output, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    debug!("Extracted {} zip entries", archive.len());
    Ok(())
}
