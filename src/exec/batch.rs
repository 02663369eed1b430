// src/exec/batch.rs

//! Bounded-concurrency execution of independent commands
//!
//! Commands are dispatched in submission order to a fixed number of worker
//! slots. Results come back aligned index-for-index with the submitted
//! commands, whatever order they finished in.

use super::{ExecutionRequest, ExecutionResult, OutputLine, ProcessExecutor};
use crate::error::{Error, Result};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Concurrency used when a batch does not set one
pub const DEFAULT_CONCURRENCY: usize = 4;

/// An ordered set of independent commands
#[derive(Debug, Clone)]
pub struct BatchRequest {
    commands: Vec<ExecutionRequest>,
    concurrency: usize,
    stop_on_error: bool,
}

impl BatchRequest {
    pub fn new(commands: Vec<ExecutionRequest>) -> Self {
        Self {
            commands,
            concurrency: DEFAULT_CONCURRENCY,
            stop_on_error: false,
        }
    }

    /// Maximum number of commands running at once (values below 1 act as 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Stop dispatching new commands after the first failure
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn commands(&self) -> &[ExecutionRequest] {
        &self.commands
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn stops_on_error(&self) -> bool {
        self.stop_on_error
    }

    /// Number of worker slots actually used
    fn slots(&self) -> usize {
        self.concurrency.max(1).min(self.commands.len().max(1))
    }
}

/// Outcome of a batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    results: Vec<ExecutionResult>,
    success: bool,
    duration: Duration,
    failures: usize,
    skipped: usize,
}

impl BatchResult {
    fn from_results(results: Vec<ExecutionResult>, duration: Duration) -> Self {
        let skipped = results.iter().filter(|r| r.is_skipped()).count();
        let failures = results
            .iter()
            .filter(|r| !r.success() && !r.is_skipped())
            .count();
        Self {
            success: failures == 0 && skipped == 0,
            results,
            duration,
            failures,
            skipped,
        }
    }

    /// Per-command results, in submission order
    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Commands that ran (or failed to start) and did not succeed
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Commands never dispatched because the batch stopped early
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Dispatch state shared by the workers
struct Dispatcher {
    next: usize,
    stopped: bool,
}

type BatchLineCallback<'a> = &'a (dyn Fn(usize, &OutputLine) + Sync);

/// Runs [`BatchRequest`]s on top of a [`ProcessExecutor`]
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    executor: ProcessExecutor,
}

impl BatchExecutor {
    pub fn new(executor: ProcessExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    pub fn run_batch(&self, batch: &BatchRequest) -> Result<BatchResult> {
        self.execute(batch, None)
    }

    /// Like [`run_batch`](Self::run_batch), delivering every output line
    /// tagged with the index of the command that produced it
    pub fn run_batch_streaming(
        &self,
        batch: &BatchRequest,
        on_line: BatchLineCallback<'_>,
    ) -> Result<BatchResult> {
        self.execute(batch, Some(on_line))
    }

    fn execute(
        &self,
        batch: &BatchRequest,
        on_line: Option<BatchLineCallback<'_>>,
    ) -> Result<BatchResult> {
        let total = batch.commands.len();
        let start = Instant::now();
        if total == 0 {
            return Ok(BatchResult::from_results(Vec::new(), start.elapsed()));
        }

        let slots = batch.slots();
        debug!(
            "Running batch of {} commands on {} slots (stop_on_error={})",
            total, slots, batch.stop_on_error
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(slots)
            .thread_name(|i| format!("npmkit-batch-{}", i))
            .build()
            .map_err(|e| Error::IoError(format!("failed to start batch workers: {}", e)))?;

        let cells: Vec<OnceLock<ExecutionResult>> = (0..total).map(|_| OnceLock::new()).collect();
        let dispatcher = Mutex::new(Dispatcher {
            next: 0,
            stopped: false,
        });

        pool.scope(|scope| {
            for _ in 0..slots {
                scope.spawn(|_| self.worker(batch, &dispatcher, &cells, on_line));
            }
        });

        let results: Vec<ExecutionResult> = cells
            .into_iter()
            .map(|cell| cell.into_inner().unwrap_or_else(ExecutionResult::skipped))
            .collect();
        let result = BatchResult::from_results(results, start.elapsed());

        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped in {:?}",
            total - result.failures - result.skipped,
            result.failures,
            result.skipped,
            result.duration
        );
        Ok(result)
    }

    /// Take commands from the dispatcher until none remain or the batch stops
    fn worker(
        &self,
        batch: &BatchRequest,
        dispatcher: &Mutex<Dispatcher>,
        cells: &[OnceLock<ExecutionResult>],
        on_line: Option<BatchLineCallback<'_>>,
    ) {
        loop {
            let index = {
                let mut state = dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
                if state.stopped || state.next >= cells.len() {
                    return;
                }
                let index = state.next;
                state.next += 1;
                index
            };

            let request = &batch.commands[index];
            let outcome = match on_line {
                Some(callback) => {
                    let tagged = |line: &OutputLine| callback(index, line);
                    self.executor.run_streaming(request, &tagged)
                }
                None => self.executor.run(request),
            };
            let result = outcome.unwrap_or_else(|e| {
                warn!("Batch command {} could not run: {}", index, e);
                ExecutionResult::not_started(e.to_string())
            });

            if !result.success() && batch.stop_on_error {
                let mut state = dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
                if !state.stopped {
                    info!(
                        "Command {} ('{}') failed, dispatching no further commands",
                        index,
                        request.command_line()
                    );
                    state.stopped = true;
                }
            }

            // Each index is handed out once, so the cell is always empty here
            let _ = cells[index].set(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_bounded_by_commands_and_at_least_one() {
        let three = vec![ExecutionRequest::new("true"); 3];
        assert_eq!(BatchRequest::new(three.clone()).with_concurrency(8).slots(), 3);
        assert_eq!(BatchRequest::new(three.clone()).with_concurrency(0).slots(), 1);
        assert_eq!(BatchRequest::new(three).with_concurrency(2).slots(), 2);
        assert_eq!(BatchRequest::new(Vec::new()).slots(), 1);
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let result = BatchExecutor::default()
            .run_batch(&BatchRequest::new(Vec::new()))
            .unwrap();
        assert!(result.success());
        assert!(result.results().is_empty());
        assert_eq!(result.failures(), 0);
        assert_eq!(result.skipped(), 0);
    }

    #[test]
    fn test_aggregate_counts() {
        let results = vec![
            ExecutionResult::completed(0, None, None, Duration::ZERO),
            ExecutionResult::completed(1, None, None, Duration::ZERO),
            ExecutionResult::skipped(),
        ];
        let batch = BatchResult::from_results(results, Duration::ZERO);
        assert!(!batch.success());
        assert_eq!(batch.failures(), 1);
        assert_eq!(batch.skipped(), 1);
    }

    #[test]
    fn test_invalid_command_becomes_failed_slot() {
        let batch = BatchRequest::new(vec![
            ExecutionRequest::new(""),
            ExecutionRequest::new("npmkit-definitely-not-a-real-binary"),
        ])
        .with_concurrency(2);
        let result = BatchExecutor::default().run_batch(&batch).unwrap();

        assert_eq!(result.results().len(), 2);
        assert_eq!(result.failures(), 2);
        for r in result.results() {
            assert_eq!(r.exit_code(), crate::exec::NO_EXIT_CODE);
            assert!(!r.cancelled());
            assert!(r.error().is_some());
        }
    }
}
