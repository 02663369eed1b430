// tests/batch.rs

//! Batch executor ordering, concurrency and stop-on-error behaviour.

#![cfg(unix)]

use npmkit::{BatchExecutor, BatchRequest, ExecutionRequest, ProcessExecutor};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ExecutionRequest {
    ExecutionRequest::new("sh").args(["-c", script])
}

fn batch_executor() -> BatchExecutor {
    BatchExecutor::new(ProcessExecutor::default())
}

#[test]
fn test_results_follow_submission_order() {
    let commands: Vec<ExecutionRequest> = (0..6)
        .map(|i| sh(&format!("sleep 0.{}; echo {}", 6 - i, i)))
        .collect();

    for concurrency in 1..=commands.len() {
        let batch = BatchRequest::new(commands.clone()).with_concurrency(concurrency);
        let result = batch_executor().run_batch(&batch).unwrap();

        assert_eq!(result.results().len(), commands.len());
        assert!(result.success());
        for (i, outcome) in result.results().iter().enumerate() {
            assert_eq!(outcome.stdout(), Some(format!("{}\n", i).as_str()));
        }
    }
}

#[test]
fn test_concurrency_overlaps_work() {
    let commands: Vec<ExecutionRequest> = (0..4).map(|_| sh("sleep 1")).collect();
    let start = Instant::now();
    let result = batch_executor()
        .run_batch(&BatchRequest::new(commands).with_concurrency(4))
        .unwrap();

    assert!(result.success());
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_failures_do_not_stop_batch_by_default() {
    let batch = BatchRequest::new(vec![sh("exit 0"), sh("exit 1"), sh("exit 0"), sh("exit 0")])
        .with_concurrency(1);
    let result = batch_executor().run_batch(&batch).unwrap();

    assert!(!result.success());
    assert_eq!(result.failures(), 1);
    assert_eq!(result.skipped(), 0);
    assert_eq!(result.results()[1].exit_code(), 1);
    assert!(result.results()[3].success());
}

#[test]
fn test_stop_on_error_skips_undispatched() {
    let batch = BatchRequest::new(vec![
        sh("exit 0"),
        sh("exit 1"),
        sh("echo should-not-run"),
        sh("echo should-not-run"),
    ])
    .with_concurrency(1)
    .stop_on_error(true);
    let result = batch_executor().run_batch(&batch).unwrap();

    let results = result.results();
    assert_eq!(results.len(), 4);
    assert!(results[0].success());
    assert_eq!(results[1].exit_code(), 1);
    assert!(results[2].is_skipped());
    assert!(results[3].is_skipped());
    assert!(!results[2].success());
    assert_eq!(result.skipped(), 2);
    assert_eq!(result.failures(), 1);
    assert!(!result.success());
}

#[test]
fn test_stop_on_error_lets_running_commands_finish() {
    // Slot 0 is busy with a slow success when slot 1 fails fast
    let batch = BatchRequest::new(vec![
        sh("sleep 1; echo slow"),
        sh("exit 1"),
        sh("echo later"),
        sh("echo later"),
    ])
    .with_concurrency(2)
    .stop_on_error(true);
    let result = batch_executor().run_batch(&batch).unwrap();

    let results = result.results();
    assert!(results[0].success());
    assert_eq!(results[0].stdout(), Some("slow\n"));
    assert_eq!(results[1].exit_code(), 1);
    assert!(results[2].is_skipped() || results[2].success());
    assert!(results[3].is_skipped());
}

#[test]
fn test_streaming_tags_lines_with_index() {
    let seen = Mutex::new(HashSet::new());
    let batch = BatchRequest::new(vec![sh("echo a"), sh("echo b"), sh("echo c")]).with_concurrency(3);
    let result = batch_executor()
        .run_batch_streaming(&batch, &|index, line| {
            seen.lock().unwrap().insert((index, line.text.clone()));
        })
        .unwrap();

    assert!(result.success());
    let seen = seen.into_inner().unwrap();
    assert!(seen.contains(&(0, "a".to_string())));
    assert!(seen.contains(&(1, "b".to_string())));
    assert!(seen.contains(&(2, "c".to_string())));
}

#[test]
fn test_unstartable_command_fills_its_slot() {
    let batch = BatchRequest::new(vec![
        ExecutionRequest::new("/nonexistent/npmkit-test-binary"),
        sh("echo fine"),
    ]);
    let result = batch_executor().run_batch(&batch).unwrap();

    assert_eq!(result.results().len(), 2);
    assert!(!result.results()[0].success());
    assert!(result.results()[0].error().is_some());
    assert!(result.results()[1].success());
}
