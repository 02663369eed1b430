// src/lib.rs

//! npmkit: Node.js and npm provisioning
//!
//! Detects the host, installs a Node.js toolchain through the best available
//! mechanism, and drives npm through a controlled process executor.
//!
//! # Architecture
//!
//! - Process execution: timeouts, cancellation and streaming, with
//!   whole-process-group termination ([`exec`])
//! - Batch execution: bounded concurrency, index-stable results ([`exec::batch`])
//! - Platform detection: OS, architecture, Linux distribution ([`platform`])
//! - Strategy selection: ordered fallback over package managers, official
//!   installers, portable archives and manual instructions ([`install`])
//! - Portable versions: verified, atomically committed installs tracked in
//!   a forward-compatible registry ([`portable`])
//! - npm client and `package.json` editing ([`portable::client`], [`manifest`])

pub mod config;
mod error;
pub mod exec;
pub mod hash;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod portable;

pub use config::Config;
pub use error::{Error, Result};
pub use exec::{
    BatchExecutor, BatchRequest, BatchResult, CancellationToken, ExecutionRequest,
    ExecutionResult, ExecutorConfig, OutputLine, OutputStream, ProcessExecutor,
};
pub use install::{
    InstallStrategy, InstallationSelector, PortableInstaller, ProvisionOptions, ProvisionOutcome,
    StrategyAttempt, StrategyKind,
};
pub use manifest::{DependencyKind, Manifest};
pub use platform::{Arch, Distro, OsFamily, PackageManagerFamily, PlatformDetector, PlatformInfo};
pub use portable::{
    InstallOptions, PackageManagerClient, PortableConfig, PortableInstallRecord,
    PortableVersionManager, PublishOptions,
};
