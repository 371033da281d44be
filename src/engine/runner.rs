//! Single-attempt step runner.
//!
//! Spawns the child directly (no shell), streams stdout/stderr concurrently on
//! dedicated threads, and classifies the outcome. Threads read each stream to
//! avoid the classic pipe-buffer deadlock, and `wait-timeout` bounds how long the
//! main thread blocks on exit. The child is never invoked through a shell, and
//! lines are streamed as they arrive instead of buffering whole streams to strings.

use crate::engine::command::CommandSpec;
use crate::engine::error::EngineError;
use crate::engine::pause::PauseController;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Initial read-buffer size per stream.
const INITIAL_BUFFER: usize = 64 * 1024;
/// A single line longer than this is a runner error, not a line.
const MAX_LINE_BYTES: usize = 1024 * 1024;
/// How often the main thread re-checks the deadline and cancellation while the
/// child is still running.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Invoked once per output line, in the order lines arrive on that stream. May be
/// called concurrently from the stdout and stderr reader threads.
pub type LineSink = dyn Fn(bool, &str) + Send + Sync;

/// Runs one attempt of a step to completion (or until timeout/cancellation cuts it
/// short). Returns `Ok(())` on exit code 0, otherwise the classified `EngineError`.
pub fn run_attempt(
    spec: &CommandSpec,
    working_dir: Option<&str>,
    timeout: Duration,
    pause: &PauseController,
    on_line: Arc<LineSink>,
) -> Result<(), EngineError> {
    if spec.is_unknown() {
        return Err(EngineError::UnknownStep);
    }

    let mut command = Command::new(&spec.name);
    command.args(&spec.args);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(EngineError::Spawn)?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let stdout_handle = {
        let on_line = Arc::clone(&on_line);
        thread::spawn(move || drain_lines(stdout, false, &on_line))
    };
    let stderr_handle = {
        let on_line = Arc::clone(&on_line);
        thread::spawn(move || drain_lines(stderr, true, &on_line))
    };

    let wait_outcome = wait_for_exit(&mut child, timeout, pause);

    // Join the drains after we've decided the child's fate. A kill (timeout or
    // cancel) closes the pipes immediately, so these return promptly; a natural
    // exit has already closed them. Either way, output is fully captured before we
    // classify the attempt.
    let stdout_result = stdout_handle.join().unwrap_or(Ok(()));
    let stderr_result = stderr_handle.join().unwrap_or(Ok(()));

    // An oversized line is a runner error regardless of how the process exited.
    stdout_result?;
    stderr_result?;

    match wait_outcome {
        WaitOutcome::Exited(status) if status.success() => Ok(()),
        WaitOutcome::Exited(status) => Err(EngineError::NonZeroExit {
            code: status.code(),
        }),
        WaitOutcome::TimedOut => Err(EngineError::Timeout(timeout)),
        WaitOutcome::Cancelled => Err(EngineError::Cancelled),
    }
}

enum WaitOutcome {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

fn wait_for_exit(child: &mut Child, timeout: Duration, pause: &PauseController) -> WaitOutcome {
    let start = Instant::now();
    loop {
        if pause.is_canceled() {
            kill_and_reap(child);
            return WaitOutcome::Cancelled;
        }
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            kill_and_reap(child);
            return WaitOutcome::TimedOut;
        }
        let slice = remaining.min(WAIT_SLICE);
        match child.wait_timeout(slice) {
            Ok(Some(status)) => return WaitOutcome::Exited(status),
            Ok(None) => continue,
            Err(_) => {
                kill_and_reap(child);
                return WaitOutcome::TimedOut;
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Reads `stream` line-by-line, invoking `on_line` for each complete line. Lines
/// longer than `MAX_LINE_BYTES` abort the drain with `OutputLineTooLong`, after
/// discarding the rest of the stream so the child (if still alive) doesn't block on
/// a full pipe buffer.
fn drain_lines<R: Read>(stream: R, is_stderr: bool, on_line: &LineSink) -> Result<(), EngineError> {
    let mut reader = std::io::BufReader::with_capacity(INITIAL_BUFFER, stream);
    let mut line = Vec::new();

    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(&mut reader, &mut byte) {
            Ok(0) => {
                if !line.is_empty() {
                    emit_line(&line, is_stderr, on_line);
                }
                return Ok(());
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    emit_line(&line, is_stderr, on_line);
                    line.clear();
                } else {
                    line.push(byte[0]);
                    if line.len() > MAX_LINE_BYTES {
                        // Discard the rest of this stream so a still-running child
                        // doesn't block on a full pipe buffer, then fail the step.
                        discard_to_eof(&mut reader);
                        return Err(EngineError::OutputLineTooLong);
                    }
                }
            }
            Err(_) => return Ok(()),
        }
    }
}

fn discard_to_eof<R: Read>(reader: &mut R) {
    let mut sink = [0u8; 8192];
    while matches!(reader.read(&mut sink), Ok(n) if n > 0) {}
}

fn emit_line(raw: &[u8], is_stderr: bool, on_line: &LineSink) {
    let text = String::from_utf8_lossy(raw);
    let text = text.strip_suffix('\r').unwrap_or(&text);
    on_line(is_stderr, text);
}
