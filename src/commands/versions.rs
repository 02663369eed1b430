// src/commands/versions.rs
//! Portable version management commands

use super::Session;
use anyhow::{Context, Result};

/// Resolve `version` and install it as a portable version
pub fn cmd_install(session: &Session, version: &str) -> Result<()> {
    let manager = session.manager()?;
    let exact = manager
        .resolve_version(version)
        .with_context(|| format!("Failed to resolve Node.js version '{}'", version))?;
    let record = manager
        .install(&exact)
        .with_context(|| format!("Failed to install Node.js {}", exact))?;

    println!("Node.js {} installed", record.version);
    println!("  node: {}", record.runtime_path.display());
    println!("  npm:  {}", record.package_manager_path.display());
    Ok(())
}

pub fn cmd_uninstall(session: &Session, version: &str) -> Result<()> {
    let record = session
        .manager()?
        .uninstall(version)
        .with_context(|| format!("Failed to uninstall Node.js {}", version))?;
    println!("Removed Node.js {} from {}", record.version, record.install_path.display());
    Ok(())
}

pub fn cmd_list(session: &Session) -> Result<()> {
    let records = session
        .manager()?
        .list_installed()
        .context("Failed to read the version registry")?;

    if records.is_empty() {
        println!("No portable Node.js versions installed");
        return Ok(());
    }

    println!("Installed Node.js versions ({}):", records.len());
    for record in records {
        println!(
            "  {:<12} {}  (installed {})",
            record.version,
            record.install_path.display(),
            record.installed_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
