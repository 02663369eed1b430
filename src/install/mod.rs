// src/install/mod.rs

//! Installation strategy selection with ordered fallback
//!
//! A provisioning run walks an ordered list of [`InstallStrategy`] values
//! for the detected platform, stopping at the first that succeeds. Every
//! attempt, successful or not, is recorded so an exhausted run can report a
//! full diagnostic trail.
//!
//! Strategies are plain data: command steps for system installers, a
//! version for the portable download, instruction text for manual setup.
//! [`InstallationSelector`] drives all of them with one attempt loop.

mod selector;
mod strategies;

pub use selector::{InstallationSelector, PortableInstaller, SelectorState};
pub use strategies::{DEFAULT_VERSION, plan_strategies};

use crate::exec::{ExecutionRequest, ExecutionResult, NO_EXIT_CODE};
use crate::portable::{DEFAULT_MIRROR, PortableInstallRecord};
use std::fmt;
use std::time::Duration;

/// Timeout for a single installer command
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(900);

/// The mechanisms that can provision the toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    PackageManager,
    OfficialInstaller,
    Portable,
    Manual,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageManager => write!(f, "package-manager"),
            Self::OfficialInstaller => write!(f, "official-installer"),
            Self::Portable => write!(f, "portable"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// What a command step is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRole {
    /// Check that the mechanism is available at all
    Probe,
    /// Perform the installation
    Action,
    /// Confirm the toolchain works afterwards
    Verify,
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe => write!(f, "probe"),
            Self::Action => write!(f, "action"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// One command within a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    pub request: ExecutionRequest,
    pub role: StepRole,
    /// Non-zero exit codes that still count as a pass
    pub accepted_exit_codes: Vec<i32>,
    /// Version (or `major[.minor]` prefix) stdout must report, `v` optional
    pub expected_version: Option<String>,
}

impl CommandStep {
    pub fn new(role: StepRole, request: ExecutionRequest) -> Self {
        Self {
            request,
            role,
            accepted_exit_codes: Vec::new(),
            expected_version: None,
        }
    }

    pub fn probe(request: ExecutionRequest) -> Self {
        Self::new(StepRole::Probe, request)
    }

    pub fn action(request: ExecutionRequest) -> Self {
        Self::new(StepRole::Action, request)
    }

    pub fn verify(request: ExecutionRequest) -> Self {
        Self::new(StepRole::Verify, request)
    }

    pub fn accepting(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.accepted_exit_codes.extend(codes);
        self
    }

    /// Require stdout to report `version`, e.g. "20.11.1" or "20"
    pub fn expecting_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    /// Why `result` does not pass this step, or `None` when it does
    ///
    /// A step passes on success, or on a normal exit with an accepted code,
    /// and only when it reports the expected version. Cancelled runs and
    /// signal deaths never pass.
    pub fn rejection(&self, result: &ExecutionResult) -> Option<String> {
        let exit_ok = result.success()
            || (!result.cancelled()
                && result.exit_code() != NO_EXIT_CODE
                && self.accepted_exit_codes.contains(&result.exit_code()));
        if !exit_ok {
            return Some(result.error().unwrap_or("failed").to_string());
        }

        let expected = self.expected_version.as_deref()?;
        let reported = result.stdout().unwrap_or_default().trim();
        if version_matches(expected, reported) {
            None
        } else {
            Some(format!(
                "reported version '{}', expected {}",
                reported, expected
            ))
        }
    }
}

/// `reported` equals `expected` or lies within it as a prefix release line
fn version_matches(expected: &str, reported: &str) -> bool {
    let expected = expected.trim().trim_start_matches('v');
    let reported = reported.trim_start_matches('v');
    !expected.is_empty()
        && (reported == expected || reported.starts_with(&format!("{}.", expected)))
}

/// One way of provisioning the toolchain, with everything needed to try it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStrategy {
    PackageManager {
        /// Package manager name, e.g. "apt-get" or "homebrew"
        manager: String,
        steps: Vec<CommandStep>,
    },
    OfficialInstaller {
        /// Installer name, e.g. "nodesource" or "msi"
        name: String,
        steps: Vec<CommandStep>,
    },
    Portable {
        version: String,
    },
    Manual {
        instructions: String,
    },
}

impl InstallStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::PackageManager { .. } => StrategyKind::PackageManager,
            Self::OfficialInstaller { .. } => StrategyKind::OfficialInstaller,
            Self::Portable { .. } => StrategyKind::Portable,
            Self::Manual { .. } => StrategyKind::Manual,
        }
    }

    /// Short human-readable name, e.g. "package-manager (apt-get)"
    pub fn label(&self) -> String {
        match self {
            Self::PackageManager { manager, .. } => format!("{} ({})", self.kind(), manager),
            Self::OfficialInstaller { name, .. } => format!("{} ({})", self.kind(), name),
            Self::Portable { version } => format!("{} (v{})", self.kind(), version),
            Self::Manual { .. } => self.kind().to_string(),
        }
    }

    /// Command steps; empty for portable and manual strategies
    pub fn steps(&self) -> &[CommandStep] {
        match self {
            Self::PackageManager { steps, .. } | Self::OfficialInstaller { steps, .. } => steps,
            Self::Portable { .. } | Self::Manual { .. } => &[],
        }
    }
}

/// What one executed command step produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub role: StepRole,
    pub command_line: String,
    pub exit_code: i32,
    pub cancelled: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

impl CommandRecord {
    pub(crate) fn from_result(step: &CommandStep, result: &ExecutionResult) -> Self {
        Self {
            role: step.role,
            command_line: step.request.command_line(),
            exit_code: result.exit_code(),
            cancelled: result.cancelled(),
            error: result.error().map(str::to_string),
            duration: result.duration(),
        }
    }

    /// Record for a step whose process never started
    pub(crate) fn not_started(step: &CommandStep, error: String) -> Self {
        Self {
            role: step.role,
            command_line: step.request.command_line(),
            exit_code: NO_EXIT_CODE,
            cancelled: false,
            error: Some(error),
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(String),
}

/// Record of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    pub label: String,
    pub commands: Vec<CommandRecord>,
    pub outcome: AttemptOutcome,
}

impl StrategyAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }

    /// Failure reason, if the attempt failed
    pub fn failure(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Succeeded => None,
            AttemptOutcome::Failed(reason) => Some(reason),
        }
    }
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Succeeded => writeln!(f, "{}: succeeded", self.label)?,
            AttemptOutcome::Failed(reason) => writeln!(f, "{}: failed: {}", self.label, reason)?,
        }
        for cmd in &self.commands {
            write!(f, "  [{}] {} -> exit {}", cmd.role, cmd.command_line, cmd.exit_code)?;
            if cmd.cancelled {
                write!(f, " (cancelled)")?;
            }
            if let Some(error) = &cmd.error {
                write!(f, ": {}", error)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Inputs to strategy planning
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Exact version for version-pinned strategies, or "lts"
    pub version: String,
    /// Distribution mirror for official installers
    pub mirror: String,
    /// Prefix privileged steps with `sudo -n` when not running as root
    pub use_sudo: bool,
    /// Plan only the portable strategy
    pub portable_only: bool,
    /// Timeout applied to every command step
    pub step_timeout: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            mirror: DEFAULT_MIRROR.to_string(),
            use_sudo: true,
            portable_only: false,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl ProvisionOptions {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = mirror.into();
        self
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn portable_only(mut self, portable_only: bool) -> Self {
        self.portable_only = portable_only;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }
}

/// Result of a successful provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// Kind of the strategy that succeeded
    pub strategy: StrategyKind,
    pub label: String,
    /// Every attempt in order, the successful one last
    pub attempts: Vec<StrategyAttempt>,
    /// Record of the portable install, when that strategy succeeded
    pub portable: Option<PortableInstallRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_passes_with_accepted_code() {
        let step = CommandStep::action(ExecutionRequest::new("msiexec")).accepting([3010]);
        let reboot = ExecutionResult::completed(3010, None, None, Duration::ZERO);
        let failed = ExecutionResult::completed(1603, None, None, Duration::ZERO);
        let killed = ExecutionResult::interrupted(
            3010,
            None,
            None,
            Duration::ZERO,
            "cancelled".to_string(),
        );

        assert_eq!(step.rejection(&reboot), None);
        assert_eq!(step.rejection(&failed).as_deref(), Some("exited with code 1603"));
        assert_eq!(step.rejection(&killed).as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_verify_step_checks_reported_version() {
        let reported = |out: &str| {
            ExecutionResult::completed(0, Some(out.to_string()), None, Duration::ZERO)
        };
        let exact = CommandStep::verify(ExecutionRequest::new("node")).expecting_version("20.11.1");
        assert_eq!(exact.rejection(&reported("v20.11.1\n")), None);
        assert_eq!(
            exact.rejection(&reported("v20.11.10\n")).as_deref(),
            Some("reported version 'v20.11.10', expected 20.11.1")
        );
        assert!(exact.rejection(&reported("")).is_some());

        let line = CommandStep::verify(ExecutionRequest::new("node")).expecting_version("20");
        assert_eq!(line.rejection(&reported("v20.5.0\n")), None);
        assert!(line.rejection(&reported("v200.0.0\n")).is_some());
        assert!(line.rejection(&reported("v18.19.0\n")).is_some());

        let any = CommandStep::verify(ExecutionRequest::new("node"));
        assert_eq!(any.rejection(&reported("v18.19.0\n")), None);
    }

    #[test]
    fn test_strategy_labels() {
        let pm = InstallStrategy::PackageManager {
            manager: "apt-get".to_string(),
            steps: Vec::new(),
        };
        assert_eq!(pm.label(), "package-manager (apt-get)");
        assert_eq!(pm.kind(), StrategyKind::PackageManager);

        let portable = InstallStrategy::Portable {
            version: "20.11.1".to_string(),
        };
        assert_eq!(portable.label(), "portable (v20.11.1)");
        assert!(portable.steps().is_empty());
    }

    #[test]
    fn test_attempt_display_lists_commands() {
        let step = CommandStep::probe(ExecutionRequest::new("brew").arg("--version"));
        let attempt = StrategyAttempt {
            strategy: StrategyKind::PackageManager,
            label: "package-manager (homebrew)".to_string(),
            commands: vec![CommandRecord::not_started(&step, "not found".to_string())],
            outcome: AttemptOutcome::Failed("probe could not start".to_string()),
        };
        let text = attempt.to_string();
        assert!(text.contains("package-manager (homebrew): failed"));
        assert!(text.contains("[probe] brew --version -> exit -1: not found"));
    }
}
