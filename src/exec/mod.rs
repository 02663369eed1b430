// src/exec/mod.rs

//! External command execution
//!
//! [`ProcessExecutor`] runs one command to completion, timeout or
//! cancellation. Key properties:
//!
//! - Non-zero exit is reported in the [`ExecutionResult`], never as an error
//! - Timeout and external cancellation terminate the whole process group
//!   (SIGTERM, bounded grace wait, SIGKILL) and yield `cancelled = true`
//! - Output can be captured in full, streamed line-by-line, or both
//! - Defaults (timeout, working directory, environment) live in an immutable
//!   [`ExecutorConfig`] fixed at construction; requests override them
//!
//! [`batch::BatchExecutor`] layers bounded-concurrency execution on top.

pub mod batch;
mod pipes;
mod request;

pub use batch::{BatchExecutor, BatchRequest, BatchResult};
pub use request::{
    ExecutionRequest, ExecutionResult, NO_EXIT_CODE, OutputLine, OutputStream, SKIPPED_DETAIL,
};

use crate::error::{Error, Result};
use pipes::PipeEvent;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use wait_timeout::ChildExt;

/// Default timeout applied when a request does not set one (10 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default grace period between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// How long to keep reading pipes after the child has exited
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on how long the wait loop sleeps between checks
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executor defaults, fixed at construction
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout for requests that do not set their own
    pub default_timeout: Duration,
    /// Working directory for requests that do not set their own
    pub default_working_dir: Option<PathBuf>,
    /// Environment layered under every request's overrides
    pub default_env: BTreeMap<String, String>,
    /// Wait after SIGTERM before escalating to SIGKILL
    pub kill_grace: Duration,
    /// Wait for pipe EOF after exit before detaching the readers
    pub drain_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            default_working_dir: None,
            default_env: BTreeMap::new(),
            kill_grace: DEFAULT_KILL_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_env.insert(key.into(), value.into());
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_drain_timeout(mut self, drain: Duration) -> Self {
        self.drain_timeout = drain;
        self
    }
}

/// Caller-side abort signal shared with a running execution
///
/// Clones share the same flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Why the wait loop stopped
enum Ending {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs external commands
///
/// Stateless apart from its configuration; cloning is cheap and clones can
/// run concurrently from different threads.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    config: Arc<ExecutorConfig>,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a request to completion or timeout
    ///
    /// Streaming requests without a callback have their lines logged.
    pub fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        self.execute(request, None, None)
    }

    /// Run a request, delivering each output line to `on_line` as it arrives
    pub fn run_streaming(
        &self,
        request: &ExecutionRequest,
        on_line: &dyn Fn(&OutputLine),
    ) -> Result<ExecutionResult> {
        self.execute(request, None, Some(on_line))
    }

    /// Run a request that can be aborted through `token`
    pub fn run_cancellable(
        &self,
        request: &ExecutionRequest,
        token: &CancellationToken,
        on_line: Option<&dyn Fn(&OutputLine)>,
    ) -> Result<ExecutionResult> {
        self.execute(request, Some(token), on_line)
    }

    fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: Option<&CancellationToken>,
        on_line: Option<&dyn Fn(&OutputLine)>,
    ) -> Result<ExecutionResult> {
        let program = request.program().trim();
        if program.is_empty() {
            return Err(Error::InvalidRequest("command name is empty".to_string()));
        }

        let timeout = request.get_timeout().unwrap_or(self.config.default_timeout);
        let streaming = request.streams_output() || on_line.is_some();
        let piped = request.captures_output() || streaming;

        let mut cmd = Command::new(program);
        cmd.args(request.get_args());
        if let Some(dir) = request
            .working_dir()
            .or(self.config.default_working_dir.as_deref())
        {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.config.default_env);
        cmd.envs(request.env_overrides());
        cmd.stdin(if request.stdin_payload().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if piped {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        pipes::isolate_process_group(&mut cmd);

        debug!("Executing: {}", request.command_line());
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| Error::SpawnError {
            command: program.to_string(),
            source,
        })?;

        let stdin_writer = match (child.stdin.take(), request.stdin_payload()) {
            (Some(stdin), Some(payload)) => Some(pipes::spawn_stdin_writer(stdin, payload.to_vec())),
            _ => None,
        };

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(pipes::spawn_reader(stdout, OutputStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pipes::spawn_reader(stderr, OutputStream::Stderr, tx.clone()));
        }
        drop(tx);

        let mut collector = OutputCollector {
            label: program_label(program),
            capture: request.captures_output(),
            streaming,
            on_line,
            stdout: Vec::new(),
            stderr: Vec::new(),
            open: readers.len(),
        };

        let wait_error =
            |e: std::io::Error| Error::IoError(format!("failed to wait on '{}': {}", program, e));

        // A timeout too large to represent means no deadline
        let deadline = start.checked_add(timeout);
        let ending = loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                break Ending::Cancelled;
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                match child.try_wait().map_err(wait_error)? {
                    Some(status) => break Ending::Exited(status),
                    None => break Ending::TimedOut,
                }
            }
            let slice = deadline.map_or(POLL_INTERVAL, |d| (d - now).min(POLL_INTERVAL));

            if collector.open > 0 {
                match rx.recv_timeout(slice) {
                    Ok(event) => collector.handle(event),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => collector.open = 0,
                }
                if let Some(status) = child.try_wait().map_err(wait_error)? {
                    break Ending::Exited(status);
                }
            } else if let Some(status) = child.wait_timeout(slice).map_err(wait_error)? {
                break Ending::Exited(status);
            }
        };

        let (status, cancel_reason) = match ending {
            Ending::Exited(status) => (status, None),
            Ending::TimedOut => {
                warn!(
                    "'{}' timed out after {:?}, terminating",
                    request.command_line(),
                    timeout
                );
                let status =
                    pipes::terminate(&mut child, self.config.kill_grace).map_err(wait_error)?;
                (status, Some(format!("timed out after {:?}", timeout)))
            }
            Ending::Cancelled => {
                info!("Cancelling '{}'", request.command_line());
                let status =
                    pipes::terminate(&mut child, self.config.kill_grace).map_err(wait_error)?;
                (status, Some("cancelled".to_string()))
            }
        };

        // Collect whatever is still buffered in the pipes
        let drain_deadline = Instant::now() + self.config.drain_timeout;
        while collector.open > 0 {
            let now = Instant::now();
            if now >= drain_deadline {
                debug!(
                    "'{}' left output pipes open after exit, detaching readers",
                    program
                );
                break;
            }
            match rx.recv_timeout(drain_deadline - now) {
                Ok(event) => collector.handle(event),
                Err(_) => break,
            }
        }
        if collector.open == 0 {
            for reader in readers {
                let _ = reader.join();
            }
        }
        if let Some(writer) = stdin_writer.filter(|w| w.is_finished()) {
            let _ = writer.join();
        }

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
        let (stdout, stderr) = collector.finish();

        debug!(
            "'{}' finished: exit={}, cancelled={}, {:?}",
            program,
            exit_code,
            cancel_reason.is_some(),
            duration
        );

        Ok(match cancel_reason {
            Some(reason) => {
                ExecutionResult::interrupted(exit_code, stdout, stderr, duration, reason)
            }
            None => ExecutionResult::completed(exit_code, stdout, stderr, duration),
        })
    }
}

/// Accumulates captured output and dispatches streamed lines
struct OutputCollector<'a> {
    label: &'a str,
    capture: bool,
    streaming: bool,
    on_line: Option<&'a dyn Fn(&OutputLine)>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// Pipes that have not reported EOF yet
    open: usize,
}

impl OutputCollector<'_> {
    fn handle(&mut self, event: PipeEvent) {
        match event {
            PipeEvent::Closed(stream) => {
                trace!("[{}] {} closed", self.label, stream);
                self.open = self.open.saturating_sub(1);
            }
            PipeEvent::Line(stream, raw) => {
                if self.streaming {
                    let line = OutputLine {
                        stream,
                        text: pipes::line_text(&raw),
                    };
                    match self.on_line {
                        Some(callback) => callback(&line),
                        None => match stream {
                            OutputStream::Stdout => info!("[{}] {}", self.label, line.text),
                            OutputStream::Stderr => warn!("[{}] {}", self.label, line.text),
                        },
                    }
                }
                if self.capture {
                    match stream {
                        OutputStream::Stdout => self.stdout.extend_from_slice(&raw),
                        OutputStream::Stderr => self.stderr.extend_from_slice(&raw),
                    }
                }
            }
        }
    }

    fn finish(self) -> (Option<String>, Option<String>) {
        if self.capture {
            (
                Some(String::from_utf8_lossy(&self.stdout).into_owned()),
                Some(String::from_utf8_lossy(&self.stderr).into_owned()),
            )
        } else {
            (None, None)
        }
    }
}

/// Short name of a program for log prefixes
fn program_label(program: &str) -> &str {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
}
