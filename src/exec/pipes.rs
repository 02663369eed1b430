// src/exec/pipes.rs

//! Child pipe plumbing: reader threads, stdin writer and termination
//!
//! Each captured pipe gets its own reader thread that forwards raw lines over
//! a channel, so the waiting thread sees lines in arrival order and can keep
//! polling for exit, deadline and cancellation in between.

use super::request::OutputStream;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ExitStatus};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Events sent from reader threads to the waiting thread
pub(crate) enum PipeEvent {
    /// Raw line bytes, including the terminator if one was read
    Line(OutputStream, Vec<u8>),
    /// The pipe reached EOF or failed
    Closed(OutputStream),
}

/// Spawn a thread that forwards every line of `pipe` to `tx`
pub(crate) fn spawn_reader<R>(pipe: R, stream: OutputStream, tx: Sender<PipeEvent>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(PipeEvent::Line(stream, buf.clone())).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!("{} reader stopped: {}", stream, e);
                    break;
                }
            }
        }
        let _ = tx.send(PipeEvent::Closed(stream));
    })
}

/// Write `payload` to the child's stdin on a helper thread, then close it
///
/// A separate thread keeps a child that fills its stdout pipe before reading
/// all of stdin from deadlocking against us.
pub(crate) fn spawn_stdin_writer(mut stdin: ChildStdin, payload: Vec<u8>) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = stdin.write_all(&payload) {
            // Child exited or closed stdin early
            debug!("stdin write ended early: {}", e);
        }
        drop(stdin);
    })
}

/// Strip the line terminator and decode lossily
pub(crate) fn line_text(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Terminate the child (and on Unix its whole process group)
///
/// Sends SIGTERM, waits up to `grace` for the process to exit, then SIGKILLs
/// and reaps it.
#[cfg(unix)]
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // The child was spawned as leader of its own group, so pgid == pid
    let pgid = Pid::from_raw(child.id() as i32);

    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        debug!("SIGTERM to process group {} failed: {}", pgid, e);
    }

    if let Some(status) = child.wait_timeout(grace)? {
        // Leader is gone; descendants that ignored SIGTERM still get killed
        let _ = killpg(pgid, Signal::SIGKILL);
        return Ok(status);
    }

    debug!("process group {} ignored SIGTERM, sending SIGKILL", pgid);
    let _ = killpg(pgid, Signal::SIGKILL);
    child.wait()
}

/// Terminate the child process
///
/// Windows has no process groups here; only the direct child is killed.
#[cfg(not(unix))]
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    let _ = child.kill();
    match child.wait_timeout(grace)? {
        Some(status) => Ok(status),
        None => child.wait(),
    }
}

/// Put the child in its own process group so it can be signalled as a tree
#[cfg(unix)]
pub(crate) fn isolate_process_group(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
pub(crate) fn isolate_process_group(_cmd: &mut std::process::Command) {}
