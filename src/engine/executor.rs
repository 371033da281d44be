//! Drives one story through its four ordered steps: the `Execution` state machine,
//! the retry loop, and the `Executor` driver that ties pause, cancel, skip, and the
//! retry loop together.

use crate::engine::command::{build_command, CommandSpec};
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::events::{EngineEvent, EventSink};
use crate::engine::pause::PauseController;
use crate::engine::runner::{self, LineSink};
use crate::models::{ExecutionStatus, StepKind, StepStatus, Story};
use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Fixed backoff between failed attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Cadence of `ExecutionTick` events while an execution is in flight.
const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// How finely the retry backoff and tick loop check for cancellation.
const COOPERATIVE_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct StepExecution {
    pub kind: StepKind,
    pub attempt: u32,
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub command: String,
    pub command_name: String,
    pub command_args: Vec<String>,
    pub output: Vec<String>,
    pub error: Option<String>,
}

impl StepExecution {
    fn pending(kind: StepKind) -> Self {
        Self {
            kind,
            attempt: 0,
            status: StepStatus::Pending,
            start_time: None,
            end_time: None,
            duration: None,
            command: String::new(),
            command_name: String::new(),
            command_args: Vec::new(),
            output: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub story: Story,
    pub steps: [StepExecution; 4],
    pub current: usize,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

impl Execution {
    pub(crate) fn new(story: Story) -> Self {
        let steps = StepKind::ORDER.map(StepExecution::pending);
        Self {
            story,
            steps,
            current: 0,
            status: ExecutionStatus::Pending,
            start_time: None,
            end_time: None,
            duration: None,
            error: None,
        }
    }
}

/// Outcome of running one step through the retry loop.
enum RetryOutcome {
    Success,
    Failed(String),
    Cancelled,
}

/// Drives a single story through its ordered steps. Owns its own `PauseController`
/// and a one-slot skip-request channel; both are reused verbatim by `BatchExecutor`
/// and `ParallelExecutor` instead of duplicating suspension logic.
///
/// Callers hold this behind an `Arc` so `execute` can be invoked from one thread
/// while `pause`/`resume`/`cancel`/`skip` are called from another -- a UI event
/// loop, typically -- while it runs.
pub struct Executor {
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    pub pause: Arc<PauseController>,
    skip_tx: SyncSender<()>,
    skip_rx: Mutex<Receiver<()>>,
    execution: Mutex<Option<Execution>>,
}

impl Executor {
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_pause(config, sink, Arc::new(PauseController::new()))
    }

    /// Like `new`, but reuses a `PauseController` owned elsewhere -- the
    /// `ParallelExecutor` gives every worker's `Executor` the pool's single shared
    /// controller instead of each minting its own.
    pub fn with_pause(config: EngineConfig, sink: Arc<dyn EventSink>, pause: Arc<PauseController>) -> Self {
        let (skip_tx, skip_rx) = mpsc::sync_channel(1);
        Self {
            config,
            sink,
            pause,
            skip_tx,
            skip_rx: Mutex::new(skip_rx),
            execution: Mutex::new(None),
        }
    }

    pub fn pause_run(&self) {
        if let Some(execution) = self.execution.lock().unwrap().as_mut() {
            execution.status = ExecutionStatus::Paused;
        }
        self.pause.pause();
    }

    pub fn resume_run(&self) {
        if let Some(execution) = self.execution.lock().unwrap().as_mut() {
            execution.status = ExecutionStatus::Running;
        }
        self.pause.resume();
    }

    pub fn cancel(&self) {
        self.pause.cancel();
    }

    /// Best-effort: silently dropped if a skip is already pending.
    pub fn skip(&self) {
        match self.skip_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    pub fn snapshot(&self) -> Option<Execution> {
        self.execution.lock().unwrap().clone()
    }

    /// Runs `story` through all four steps to a terminal status, emitting events as
    /// it goes, and returns the final `Execution` snapshot.
    pub fn execute(self: &Arc<Self>, story: Story) -> Execution {
        let _span = tracing::info_span!("execution", story_key = %story.key).entered();
        info!("execution started");

        let mut execution = Execution::new(story);
        execution.status = ExecutionStatus::Running;
        execution.start_time = Some(Utc::now());
        self.sync_execution(&execution);
        self.sink.emit(EngineEvent::ExecutionStarted {
            execution: execution.clone(),
        });

        let terminal = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let tick_handle = self.spawn_tick_emitter(Arc::clone(&terminal));

        'steps: for (index, kind) in StepKind::ORDER.into_iter().enumerate() {
            if self.pause.is_canceled() {
                execution.status = ExecutionStatus::Cancelled;
                break;
            }
            self.pause.wait_if_paused();
            if self.pause.is_canceled() {
                execution.status = ExecutionStatus::Cancelled;
                break;
            }

            if self.try_take_skip() {
                self.mark_skipped(&mut execution, index);
                continue;
            }

            if kind == StepKind::CreateStory && execution.story.file_exists {
                self.mark_skipped(&mut execution, index);
                continue;
            }

            execution.current = index;
            self.sync_execution(&execution);

            let spec = build_command(kind, &execution.story, &self.config);
            match self.run_step_with_retries(&mut execution, index, kind, &spec) {
                RetryOutcome::Success => {}
                RetryOutcome::Failed(err) => {
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(err);
                    break 'steps;
                }
                RetryOutcome::Cancelled => {
                    execution.status = ExecutionStatus::Cancelled;
                    break 'steps;
                }
            }
        }

        execution.end_time = Some(Utc::now());
        execution.duration = duration_between(execution.start_time, execution.end_time);
        if execution.status == ExecutionStatus::Running {
            execution.status = ExecutionStatus::Completed;
        }
        self.sync_execution(&execution);

        terminal.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = tick_handle.join();

        info!(status = ?execution.status, "execution finished");
        self.sink.emit(EngineEvent::ExecutionCompleted {
            status: execution.status,
            duration: execution.duration.unwrap_or(Duration::ZERO),
            error: execution.error.clone(),
        });

        execution
    }

    /// Non-blocking: returns whether a skip request was pending.
    fn try_take_skip(&self) -> bool {
        self.skip_rx.lock().unwrap().try_recv().is_ok()
    }

    fn mark_skipped(&self, execution: &mut Execution, index: usize) {
        let now = Some(Utc::now());
        let step = &mut execution.steps[index];
        step.status = StepStatus::Skipped;
        step.start_time = now;
        step.end_time = now;
        step.duration = Some(Duration::ZERO);
        self.sync_execution(execution);
        self.sink.emit(EngineEvent::StepCompleted {
            step_index: index,
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            error: None,
        });
    }

    fn sync_execution(&self, execution: &Execution) {
        *self.execution.lock().unwrap() = Some(execution.clone());
    }

    fn spawn_tick_emitter(
        &self,
        terminal: Arc<std::sync::atomic::AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        thread::spawn(move || {
            let mut last_tick = Instant::now();
            while !terminal.load(std::sync::atomic::Ordering::SeqCst) {
                thread::sleep(COOPERATIVE_SLICE);
                if terminal.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                if last_tick.elapsed() >= TICK_INTERVAL {
                    sink.emit(EngineEvent::ExecutionTick { time: Utc::now() });
                    last_tick = Instant::now();
                }
            }
        })
    }

    fn run_step_with_retries(
        self: &Arc<Self>,
        execution: &mut Execution,
        index: usize,
        kind: StepKind,
        spec: &CommandSpec,
    ) -> RetryOutcome {
        let max_attempts = self.config.retries + 1;
        let _span = tracing::info_span!("step", step = %kind, index).entered();

        for attempt in 1..=max_attempts {
            if self.pause.is_canceled() {
                return RetryOutcome::Cancelled;
            }

            {
                let step = &mut execution.steps[index];
                step.output.clear();
                step.attempt = attempt;
                step.status = StepStatus::Running;
                step.start_time = Some(Utc::now());
                step.command = spec.display();
                step.command_name = spec.name.clone();
                step.command_args = spec.args.clone();
            }
            self.sync_execution(execution);
            self.sink.emit(EngineEvent::StepStarted {
                step_index: index,
                step_kind: kind,
                command_display: spec.display(),
                attempt,
            });

            let on_line = self.line_sink(index);
            let result = runner::run_attempt(
                spec,
                self.config.working_dir.as_deref(),
                self.config.timeout(),
                &self.pause,
                on_line,
            );

            // The runner's callback mutated output via the shared execution lock --
            // it runs on the reader threads, not this one -- so pull it back into
            // the local copy before classifying the attempt.
            if let Some(shared) = self.execution.lock().unwrap().as_ref() {
                execution.steps[index].output = shared.steps[index].output.clone();
            }

            match result {
                Ok(()) => {
                    let step = &mut execution.steps[index];
                    step.status = StepStatus::Success;
                    step.end_time = Some(Utc::now());
                    step.duration = duration_between(step.start_time, step.end_time);
                    let duration = step.duration.unwrap_or(Duration::ZERO);
                    self.sync_execution(execution);
                    self.sink.emit(EngineEvent::StepCompleted {
                        step_index: index,
                        status: StepStatus::Success,
                        duration,
                        error: None,
                    });
                    return RetryOutcome::Success;
                }
                Err(EngineError::Cancelled) => {
                    execution.steps[index].error = Some(EngineError::Cancelled.to_string());
                    self.sync_execution(execution);
                    return RetryOutcome::Cancelled;
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(attempt, error = %message, "step attempt failed");
                    execution.steps[index].error = Some(message.clone());
                    self.sync_execution(execution);

                    if attempt < max_attempts {
                        let retry_line = format!(
                            "Retrying in {} seconds (attempt {}/{})...",
                            RETRY_DELAY.as_secs(),
                            attempt + 1,
                            max_attempts
                        );
                        self.push_output_line(execution, index, true, &retry_line);
                        if self.cooperative_sleep(RETRY_DELAY) {
                            return RetryOutcome::Cancelled;
                        }
                    } else {
                        let step = &mut execution.steps[index];
                        step.status = StepStatus::Failed;
                        step.end_time = Some(Utc::now());
                        step.duration = duration_between(step.start_time, step.end_time);
                        let duration = step.duration.unwrap_or(Duration::ZERO);
                        self.sync_execution(execution);
                        self.sink.emit(EngineEvent::StepCompleted {
                            step_index: index,
                            status: StepStatus::Failed,
                            duration,
                            error: Some(message.clone()),
                        });
                        return RetryOutcome::Failed(message);
                    }
                }
            }
        }

        unreachable!("retry loop always returns within max_attempts iterations")
    }

    /// Builds the callback passed to the step runner. It runs on the runner's reader
    /// threads rather than the caller's thread, so it reaches the shared execution
    /// through its own `Arc` clone rather than borrowing `self`.
    fn line_sink(self: &Arc<Self>, index: usize) -> Arc<LineSink> {
        let this = Arc::clone(self);
        Arc::new(move |is_stderr: bool, line: &str| {
            this.push_output_line_locked(index, is_stderr, line);
        })
    }

    fn push_output_line_locked(&self, index: usize, is_stderr: bool, line: &str) {
        let stored = format_stored_line(is_stderr, line);
        if let Some(exec) = self.execution.lock().unwrap().as_mut() {
            exec.steps[index].output.push(stored);
        }
        self.sink.emit(EngineEvent::StepOutput {
            step_index: index,
            line: line.to_string(),
            is_stderr,
        });
    }

    /// Same as `push_output_line_locked`, but also keeps the caller's local
    /// `Execution` copy in sync -- used for the synthetic retry-notice line emitted
    /// on the main thread, where a local copy is already in scope.
    fn push_output_line(&self, execution: &mut Execution, index: usize, is_stderr: bool, line: &str) {
        self.push_output_line_locked(index, is_stderr, line);
        execution.steps[index]
            .output
            .push(format_stored_line(is_stderr, line));
    }

    /// Sleeps for `duration` in small slices, returning `true` if cancellation was
    /// observed (and thus the sleep was cut short).
    fn cooperative_sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < duration {
            if self.pause.is_canceled() {
                return true;
            }
            thread::sleep(COOPERATIVE_SLICE.min(duration));
        }
        false
    }
}

fn format_stored_line(is_stderr: bool, line: &str) -> String {
    if is_stderr {
        format!("[stderr] {line}")
    } else {
        line.to_string()
    }
}

fn duration_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Duration> {
    start
        .zip(end)
        .map(|(s, e)| (e - s).to_std().unwrap_or(Duration::ZERO))
}
