// src/error.rs

//! Error types for npmkit
//!
//! Low-level process, I/O and HTTP failures are translated into these kinds at
//! the component boundary. Command timeouts and non-zero exits are NOT errors:
//! they are reported inside [`ExecutionResult`](crate::exec::ExecutionResult).

use crate::install::StrategyAttempt;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the provisioning core
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request (e.g. empty command name)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The process could not be created
    #[error("failed to spawn '{command}': {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Host identity could not be determined at all
    #[error("platform detection failed: {0}")]
    DetectionError(String),

    /// Every installation strategy failed; carries the full attempt trail
    #[error("all {} installation strategies failed", attempts.len())]
    StrategyExhausted { attempts: Vec<StrategyAttempt> },

    /// Archive or metadata download failed (transport or non-2xx)
    #[error("download failed: {0}")]
    DownloadError(String),

    /// Downloaded archive does not match its published checksum
    #[error("integrity check failed for {file}: expected sha256 {expected}, got {actual}")]
    IntegrityError {
        file: String,
        expected: String,
        actual: String,
    },

    /// Requested portable version is not in the registry
    #[error("version {0} is not installed")]
    VersionNotInstalled(String),

    /// Archive could not be unpacked or lacks the expected executables
    #[error("archive error: {0}")]
    ArchiveError(String),

    /// Version registry could not be read, locked or written
    #[error("registry error: {0}")]
    RegistryError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("manifest error: {0}")]
    ManifestError(String),

    /// No distribution is published for this OS/architecture
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// I/O error with context
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attempt trail for an exhausted provisioning run
    pub fn attempts(&self) -> Option<&[StrategyAttempt]> {
        match self {
            Self::StrategyExhausted { attempts } => Some(attempts),
            _ => None,
        }
    }
}
