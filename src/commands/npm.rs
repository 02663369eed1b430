// src/commands/npm.rs
//! npm passthrough, batch execution and outdated checks

use super::Session;
use anyhow::{Context, Result};
use npmkit::manifest::is_outdated;
use npmkit::{
    BatchExecutor, BatchRequest, ExecutionRequest, ExecutionResult, Manifest, OutputLine,
    OutputStream,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn print_line(line: &OutputLine) {
    match line.stream {
        OutputStream::Stdout => println!("{}", line.text),
        OutputStream::Stderr => eprintln!("{}", line.text),
    }
}

/// Exit status for the process: the child's code, or 1
fn exit_status(result: &ExecutionResult) -> i32 {
    match result.exit_code() {
        0 if result.success() => 0,
        code if code > 0 => code,
        _ => 1,
    }
}

/// Run npm with `args`, streaming its output; returns npm's exit status
pub fn cmd_npm(session: &Session, version: &str, args: &[String], dir: Option<PathBuf>) -> Result<i32> {
    let mut client = session.client(version)?;
    if let Some(dir) = dir {
        client = client.with_working_dir(dir);
    }

    let request = client.npm_request(args.iter().cloned()).capture_output(false);
    let result = client
        .executor()
        .run_streaming(&request, &print_line)
        .with_context(|| format!("Failed to run {}", request.command_line()))?;

    if let Some(error) = result.error() {
        warn!("npm {}", error);
    }
    Ok(exit_status(&result))
}

/// Run each command string concurrently; returns 1 if any failed
pub fn cmd_batch(
    session: &Session,
    jobs: Option<usize>,
    stop_on_error: bool,
    commands: &[String],
) -> Result<i32> {
    let requests: Vec<ExecutionRequest> = commands
        .iter()
        .map(|command| {
            let mut words = command.split_whitespace();
            let program = words.next().unwrap_or_default();
            ExecutionRequest::new(program).args(words).capture_output(false)
        })
        .collect();

    let batch = BatchRequest::new(requests)
        .with_concurrency(jobs.unwrap_or(session.config.concurrency))
        .stop_on_error(stop_on_error);
    let executor = BatchExecutor::new(session.executor());
    let result = executor
        .run_batch_streaming(&batch, &|index, line| match line.stream {
            OutputStream::Stdout => println!("[{}] {}", index + 1, line.text),
            OutputStream::Stderr => eprintln!("[{}] {}", index + 1, line.text),
        })
        .context("Batch execution failed")?;

    println!();
    for (index, (command, outcome)) in commands.iter().zip(result.results()).enumerate() {
        let status = if outcome.is_skipped() {
            "skipped".to_string()
        } else if outcome.success() {
            "ok".to_string()
        } else if let Some(error) = outcome.error() {
            format!("failed ({})", error)
        } else {
            format!("failed (exit {})", outcome.exit_code())
        };
        println!(
            "[{}] {:<40} {:<24} {:.2?}",
            index + 1,
            command,
            status,
            outcome.duration()
        );
    }
    println!(
        "{} command(s), {} failed, {} skipped in {:.2?}",
        result.results().len(),
        result.failures(),
        result.skipped(),
        result.duration()
    );

    Ok(if result.success() { 0 } else { 1 })
}

/// Compare declared dependency ranges with the latest published versions
pub fn cmd_outdated(session: &Session, manifest_path: &Path, version: &str) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let declared: Vec<(&str, &str)> = manifest.all_dependencies().collect();
    if declared.is_empty() {
        println!("No dependencies declared");
        return Ok(());
    }

    let client = session.client(version)?;
    let requests = declared
        .iter()
        .map(|(name, _)| client.view_version_request(name))
        .collect();
    let batch = BatchRequest::new(requests).with_concurrency(session.config.concurrency);
    let result = BatchExecutor::new(client.executor().clone())
        .run_batch(&batch)
        .context("Failed to query the registry")?;

    let mut outdated = 0;
    for ((name, range), lookup) in declared.iter().zip(result.results()) {
        let latest = lookup.stdout().map(str::trim).unwrap_or_default();
        if !lookup.success() || latest.is_empty() {
            warn!("Could not look up {}", name);
            continue;
        }
        debug!("{}: declared {}, latest {}", name, range, latest);
        if is_outdated(range, latest) {
            if outdated == 0 {
                println!("{:<32} {:<16} {}", "Package", "Declared", "Latest");
            }
            println!("{:<32} {:<16} {}", name, range, latest);
            outdated += 1;
        }
    }

    if outdated == 0 {
        println!("All {} dependencies are up to date", declared.len());
    }
    Ok(())
}
