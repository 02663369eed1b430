// src/exec/request.rs

//! Request and result types for external command execution

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit code reported when the process was killed by a signal or never ran
pub const NO_EXIT_CODE: i32 = -1;

/// Error detail attached to batch entries that were never dispatched
pub const SKIPPED_DETAIL: &str = "skipped";

/// A single external command to run
///
/// Built with chained setters, then handed to the executor by reference.
/// The executor never mutates a submitted request.
///
/// ```
/// use npmkit::exec::ExecutionRequest;
/// use std::time::Duration;
///
/// let req = ExecutionRequest::new("npm")
///     .args(["install", "--save-dev", "typescript"])
///     .env("CI", "true")
///     .timeout(Duration::from_secs(300));
/// assert_eq!(req.command_line(), "npm install --save-dev typescript");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    capture_output: bool,
    stream_output: bool,
}

impl ExecutionRequest {
    /// Create a request for `program` with capture enabled and no streaming
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: None,
            capture_output: true,
            stream_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir` instead of the executor's default working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment override; a repeated key replaces the earlier value
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Write `payload` to the child's stdin, then close it
    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Override the executor's default timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Deliver output line-by-line while the command runs
    pub fn stream_output(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env_overrides(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn stdin_payload(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn captures_output(&self) -> bool {
        self.capture_output
    }

    pub fn streams_output(&self) -> bool {
        self.stream_output
    }

    /// Program and arguments joined with spaces, for logs and diagnostics
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Outcome of one executed (or skipped) request
///
/// `success` is derived from the exit code and cancelled flag at
/// construction, so it always equals `exit_code == 0 && !cancelled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    success: bool,
    exit_code: i32,
    stdout: Option<String>,
    stderr: Option<String>,
    duration: Duration,
    cancelled: bool,
    error: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn completed(
        exit_code: i32,
        stdout: Option<String>,
        stderr: Option<String>,
        duration: Duration,
    ) -> Self {
        let error = (exit_code != 0).then(|| {
            if exit_code == NO_EXIT_CODE {
                "terminated by signal".to_string()
            } else {
                format!("exited with code {}", exit_code)
            }
        });
        Self {
            success: exit_code == 0,
            exit_code,
            stdout,
            stderr,
            duration,
            cancelled: false,
            error,
        }
    }

    pub(crate) fn interrupted(
        exit_code: i32,
        stdout: Option<String>,
        stderr: Option<String>,
        duration: Duration,
        reason: String,
    ) -> Self {
        Self {
            success: false,
            exit_code,
            stdout,
            stderr,
            duration,
            cancelled: true,
            error: Some(reason),
        }
    }

    /// Result for a request that could not be started at all
    pub(crate) fn not_started(detail: String) -> Self {
        Self {
            success: false,
            exit_code: NO_EXIT_CODE,
            stdout: None,
            stderr: None,
            duration: Duration::ZERO,
            cancelled: false,
            error: Some(detail),
        }
    }

    /// Marker for a batch entry that was never dispatched
    pub fn skipped() -> Self {
        Self {
            success: false,
            exit_code: NO_EXIT_CODE,
            stdout: None,
            stderr: None,
            duration: Duration::ZERO,
            cancelled: true,
            error: Some(SKIPPED_DETAIL.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_skipped(&self) -> bool {
        self.cancelled && self.error.as_deref() == Some(SKIPPED_DETAIL)
    }
}

/// Which pipe a line of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of streamed output, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = ExecutionRequest::new("node");
        assert_eq!(req.program(), "node");
        assert!(req.get_args().is_empty());
        assert!(req.captures_output());
        assert!(!req.streams_output());
        assert!(req.get_timeout().is_none());
        assert!(req.stdin_payload().is_none());
    }

    #[test]
    fn test_env_keys_unique() {
        let req = ExecutionRequest::new("npm")
            .env("NODE_ENV", "development")
            .env("NODE_ENV", "production");
        assert_eq!(req.env_overrides().len(), 1);
        assert_eq!(req.env_overrides()["NODE_ENV"], "production");
    }

    #[test]
    fn test_command_line_quotes_whitespace() {
        let req = ExecutionRequest::new("npm").args(["run", "build all", ""]);
        assert_eq!(req.command_line(), "npm run \"build all\" \"\"");
    }

    #[test]
    fn test_success_invariant() {
        let ok = ExecutionResult::completed(0, None, None, Duration::ZERO);
        assert!(ok.success());
        assert!(ok.error().is_none());

        let failed = ExecutionResult::completed(3, None, None, Duration::ZERO);
        assert!(!failed.success());
        assert_eq!(failed.error(), Some("exited with code 3"));

        let cancelled =
            ExecutionResult::interrupted(0, None, None, Duration::ZERO, "cancelled".to_string());
        assert!(!cancelled.success());
        assert!(cancelled.cancelled());
    }

    #[test]
    fn test_skipped_marker() {
        let skipped = ExecutionResult::skipped();
        assert!(skipped.is_skipped());
        assert!(skipped.cancelled());
        assert!(!skipped.success());
        assert_eq!(skipped.exit_code(), NO_EXIT_CODE);

        let timed_out = ExecutionResult::interrupted(
            NO_EXIT_CODE,
            None,
            None,
            Duration::ZERO,
            "timed out after 1s".to_string(),
        );
        assert!(!timed_out.is_skipped());
    }
}
