// src/commands/provision.rs
//! Platform inspection and provisioning commands

use super::Session;
use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use npmkit::install::plan_strategies;
use npmkit::{Error, InstallStrategy, InstallationSelector, PlatformInfo};
use tracing::info;

fn detect_platform() -> Result<PlatformInfo> {
    npmkit::platform::detect().context("Failed to detect the host platform")
}

/// Print the detected platform
pub fn cmd_detect() -> Result<()> {
    let platform = detect_platform()?;

    println!("Platform: {}", platform);
    println!("  OS:           {}", platform.os);
    println!("  Architecture: {}", platform.arch);
    if let Some(release) = &platform.linux {
        println!("  Distribution: {}", release.distro);
        if !release.version.is_empty() {
            println!("  Version:      {}", release.version);
        }
        if !release.id_like.is_empty() {
            println!("  Like:         {}", release.id_like.join(", "));
        }
        println!("  Package mgr:  {}", platform.package_manager_family());
    }
    println!("  Elevated:     {}", platform.is_root_user());
    Ok(())
}

/// Print the ordered strategy list for this host
pub fn cmd_plan(session: &Session, version: Option<&str>, portable_only: bool) -> Result<()> {
    let platform = detect_platform()?;
    let options = session
        .config
        .provision_options(version)
        .portable_only(portable_only);
    let strategies = plan_strategies(&platform, &options);

    println!("Strategies for {} on {}:", options.version, platform);
    for (i, strategy) in strategies.iter().enumerate() {
        println!("{:>3}. {}", i + 1, strategy.label());
        match strategy {
            InstallStrategy::Manual { instructions } => {
                for line in instructions.lines() {
                    println!("       {}", line);
                }
            }
            _ => {
                for step in strategy.steps() {
                    println!("       [{}] {}", step.role, step.request.command_line());
                }
            }
        }
    }
    Ok(())
}

/// Install Node.js via the first strategy that succeeds
pub fn cmd_provision(
    session: &Session,
    version: Option<&str>,
    portable_only: bool,
    no_sudo: bool,
) -> Result<()> {
    let platform = detect_platform()?;
    let options = session
        .config
        .provision_options(version)
        .portable_only(portable_only)
        .with_sudo(session.config.use_sudo && !no_sudo);

    let manager = session.manager()?.with_platform(platform.clone());
    let selector = InstallationSelector::new(session.executor()).with_portable(&manager);

    match selector.provision(&platform, &options) {
        Ok(outcome) => {
            info!("Provisioned via {}", outcome.label);
            println!(
                "Node.js installed via {} after {} attempt(s)",
                outcome.label,
                outcome.attempts.len()
            );
            if let Some(record) = outcome.portable {
                println!("  Version: {}", record.version);
                println!("  Path:    {}", record.install_path.display());
                println!("  Add to PATH: {}", record.bin_dir().display());
            }
            Ok(())
        }
        Err(Error::StrategyExhausted { attempts }) => {
            eprintln!("Every installation strategy failed:");
            for attempt in &attempts {
                eprint!("{}", attempt);
            }
            Err(anyhow::anyhow!(
                "Could not provision Node.js {} ({} strategies tried)",
                options.version,
                attempts.len()
            ))
        }
        Err(e) => Err(e).context("Provisioning failed"),
    }
}

/// Write a completion script for `shell` to stdout
pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = crate::cli::Cli::command();
    clap_complete::generate(shell, &mut cmd, "npmkit", &mut std::io::stdout());
    Ok(())
}
