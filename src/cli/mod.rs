// src/cli/mod.rs
//! CLI definitions for npmkit
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `detect` / `plan` - Inspect the host and the strategies it would use
//! - `provision` - Install Node.js via the first strategy that works
//! - `install` / `uninstall` / `list` - Manage portable versions
//! - `npm` - Run npm from a portable version or the system
//! - `batch` - Run several commands with bounded concurrency
//! - `outdated` - Compare package.json against the registry

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "npmkit")]
#[command(author = "npmkit Contributors")]
#[command(version)]
#[command(about = "Provision Node.js and drive npm", long_about = None)]
pub struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (default: $NPMKIT_HOME/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root for portable installs (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the detected platform
    Detect,

    /// Show the installation strategies for this host, in order
    Plan {
        /// Version to plan for ("lts", "20", "20.11.1")
        #[arg(long)]
        version: Option<String>,

        /// Only consider the portable strategy
        #[arg(long)]
        portable_only: bool,
    },

    /// Install Node.js using the first strategy that succeeds
    Provision {
        /// Version to install ("lts", "20", "20.11.1")
        #[arg(long)]
        version: Option<String>,

        /// Skip system installers and use a portable install
        #[arg(long)]
        portable_only: bool,

        /// Never prefix installer commands with sudo
        #[arg(long)]
        no_sudo: bool,
    },

    /// Download and register a portable Node.js version
    Install {
        /// Version ("lts", "latest", "20", "20.11.1")
        version: String,
    },

    /// Remove a portable Node.js version
    Uninstall {
        /// Exact installed version
        version: String,
    },

    /// List portable Node.js versions
    List,

    /// Run npm from a portable version (or "system")
    ///
    /// Example: npmkit npm 20.11.1 -- install --save-dev typescript
    Npm {
        /// Installed version, or "system" for the npm on PATH
        version: String,

        /// Arguments passed to npm
        #[arg(last = true)]
        args: Vec<String>,

        /// Project directory to run in
        #[arg(short = 'C', long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Run commands in parallel, reporting each result in order
    Batch {
        /// Worker slots
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Skip commands not yet started once one fails
        #[arg(long)]
        stop_on_error: bool,

        /// Commands, one per argument (split on whitespace)
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// List dependencies with newer published versions
    Outdated {
        /// Path to package.json or its directory
        #[arg(long, default_value = "package.json")]
        manifest: PathBuf,

        /// Installed version whose npm to use, or "system"
        #[arg(long, default_value = "system")]
        node: String,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
