//! Sequential queue processing: one inner `Executor`, reused across every item.
//!
//! A `BatchExecutor` never runs two stories concurrently -- that is the job of
//! `ParallelExecutor`. It owns the queue; the inner `Executor` is delegated to once
//! per item, with the queue's own lock released for the duration (see the
//! shared-resource policy: no cross-executor mutex is ever held while a nested
//! driver runs).

use crate::engine::crash::{generate_crash_report, CrashReport};
use crate::engine::events::{EngineEvent, EventSink};
use crate::engine::executor::{Execution, Executor};
use crate::engine::config::EngineConfig;
use crate::models::{ExecutionStatus, QueueStatus, StepKind, Story};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::error;

/// Smoothing factor for the per-step-kind rolling duration estimate. Not specified
/// precisely by the source system; an EMA with this weight was chosen over a
/// cumulative arithmetic mean (see DESIGN.md).
const STEP_AVERAGE_ALPHA: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub story: Story,
    pub status: ExecutionStatus,
    pub execution: Option<Execution>,
}

#[derive(Debug, Clone)]
pub struct Queue {
    pub items: Vec<QueueItem>,
    pub current: usize,
    pub status: QueueStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub step_averages: HashMap<StepKind, Duration>,
}

impl Queue {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            current: 0,
            status: QueueStatus::Idle,
            start_time: None,
            end_time: None,
            step_averages: HashMap::new(),
        }
    }

    fn first_pending(&self) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.status == ExecutionStatus::Pending)
    }
}

/// Final summary returned by `start()`, mirroring the `QueueCompleted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub total_duration: Duration,
}

pub struct BatchExecutor {
    sink: Arc<dyn EventSink>,
    inner: Arc<Executor>,
    queue: Mutex<Queue>,
    running: AtomicBool,
    crash_log_dir: PathBuf,
}

impl BatchExecutor {
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        let crash_log_dir = PathBuf::from(&config.crash_log_dir);
        let inner = Arc::new(Executor::new(config, Arc::clone(&sink)));
        Self {
            sink,
            inner,
            queue: Mutex::new(Queue::new()),
            running: AtomicBool::new(false),
            crash_log_dir,
        }
    }

    /// Appends a pending item. Deliberately does NOT emit `QueueUpdated` -- the
    /// caller is expected to do so after its own state transition, to avoid
    /// re-entering a synchronous sink while it is mid-update.
    pub fn add_to_queue(&self, story: Story) {
        let mut queue = self.queue.lock().unwrap();
        queue.items.push(QueueItem {
            story,
            status: ExecutionStatus::Pending,
            execution: None,
        });
    }

    pub fn remove_from_queue(&self, index: usize) -> bool {
        let mut queue = self.queue.lock().unwrap();
        if index >= queue.items.len() {
            return false;
        }
        queue.items.remove(index);
        if queue.current > index {
            queue.current -= 1;
        }
        drop(queue);
        self.emit_queue_updated();
        true
    }

    pub fn clear_queue(&self) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.items.clear();
            queue.current = 0;
            queue.status = QueueStatus::Idle;
        }
        self.emit_queue_updated();
    }

    pub fn move_up(&self, index: usize) -> bool {
        let moved = {
            let mut queue = self.queue.lock().unwrap();
            if index == 0 || index >= queue.items.len() {
                false
            } else {
                queue.items.swap(index, index - 1);
                true
            }
        };
        if moved {
            self.emit_queue_updated();
        }
        moved
    }

    pub fn move_down(&self, index: usize) -> bool {
        let moved = {
            let mut queue = self.queue.lock().unwrap();
            if index + 1 >= queue.items.len() {
                false
            } else {
                queue.items.swap(index, index + 1);
                true
            }
        };
        if moved {
            self.emit_queue_updated();
        }
        moved
    }

    pub fn get_queue(&self) -> Queue {
        self.queue.lock().unwrap().clone()
    }

    pub fn set_queue(&self, stories: Vec<Story>) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.items = stories
                .into_iter()
                .map(|story| QueueItem {
                    story,
                    status: ExecutionStatus::Pending,
                    execution: None,
                })
                .collect();
            queue.current = 0;
            queue.status = QueueStatus::Idle;
        }
        self.emit_queue_updated();
    }

    pub fn pause(&self) {
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.status == QueueStatus::Running {
                queue.status = QueueStatus::Paused;
            }
        }
        self.inner.pause.pause();
    }

    pub fn resume(&self) {
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.status == QueueStatus::Paused {
                queue.status = QueueStatus::Running;
            }
        }
        self.inner.pause.resume();
    }

    pub fn cancel(&self) {
        self.inner.pause.cancel();
    }

    /// Forwarded to the inner executor: best-effort, only honored between steps.
    pub fn skip(&self) {
        self.inner.skip();
    }

    fn emit_queue_updated(&self) {
        let len = self.queue.lock().unwrap().items.len();
        self.sink.emit(EngineEvent::QueueUpdated { queue_len: len });
    }

    /// Runs the queue to completion (or until cancelled). Returns `None` if the
    /// batch was already running or had nothing pending to do.
    pub fn start(self: &Arc<Self>) -> Option<BatchOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        if self.queue.lock().unwrap().first_pending().is_none() {
            self.running.store(false, Ordering::SeqCst);
            return None;
        }

        self.inner.pause.reset();
        {
            let mut queue = self.queue.lock().unwrap();
            queue.status = QueueStatus::Running;
            queue.start_time = Some(Utc::now());
        }
        self.emit_queue_updated();

        loop {
            if self.inner.pause.is_canceled() {
                let mut queue = self.queue.lock().unwrap();
                queue.status = QueueStatus::Idle;
                break;
            }

            let index = {
                let queue = self.queue.lock().unwrap();
                queue.first_pending()
            };
            let index = match index {
                Some(index) => index,
                None => {
                    let mut queue = self.queue.lock().unwrap();
                    queue.status = QueueStatus::Completed;
                    queue.end_time = Some(Utc::now());
                    break;
                }
            };

            self.inner.pause.wait_if_paused();
            if self.inner.pause.is_canceled() {
                let mut queue = self.queue.lock().unwrap();
                queue.status = QueueStatus::Idle;
                break;
            }

            let story = {
                let mut queue = self.queue.lock().unwrap();
                queue.current = index;
                queue.items[index].status = ExecutionStatus::Running;
                queue.items[index].story.clone()
            };
            self.sink.emit(EngineEvent::QueueItemStarted {
                index,
                key: story.key.clone(),
            });

            // The queue lock is released for the entire nested run. A panic inside
            // it (a bug in the step runner, say) is caught here rather than
            // unwinding this loop and silently abandoning every item still queued.
            let execution = match panic::catch_unwind(AssertUnwindSafe(|| self.inner.execute(story.clone()))) {
                Ok(execution) => execution,
                Err(payload) => self.recover_from_panic(&story, payload),
            };

            let mut queue = self.queue.lock().unwrap();
            let status = execution.status;
            if status == ExecutionStatus::Completed {
                for step in &execution.steps {
                    if let Some(duration) = step.duration {
                        update_step_average(&mut queue.step_averages, step.kind, duration);
                    }
                }
            }
            let key = queue.items[index].story.key.clone();
            queue.items[index].status = status;
            queue.items[index].execution = Some(execution);
            drop(queue);
            self.sink.emit(EngineEvent::QueueItemCompleted { index, key, status });
        }

        self.running.store(false, Ordering::SeqCst);

        let outcome = {
            let queue = self.queue.lock().unwrap();
            let total = queue.items.len();
            let success = queue
                .items
                .iter()
                .filter(|item| item.status == ExecutionStatus::Completed)
                .count();
            let failed = queue
                .items
                .iter()
                .filter(|item| item.status == ExecutionStatus::Failed)
                .count();
            let total_duration = queue
                .items
                .iter()
                .filter_map(|item| item.execution.as_ref().and_then(|e| e.duration))
                .sum();
            BatchOutcome {
                total,
                success,
                failed,
                total_duration,
            }
        };

        self.sink.emit(EngineEvent::QueueCompleted {
            total: outcome.total,
            success: outcome.success,
            failed: outcome.failed,
            total_duration: outcome.total_duration,
        });

        Some(outcome)
    }

    /// Turns a caught panic into a `Failed` execution, after persisting a
    /// diagnostic record (message + backtrace) to `crash_log_dir` so the crash is
    /// still observable once this thread has recovered and moved on.
    fn recover_from_panic(&self, story: &Story, payload: Box<dyn Any + Send>) -> Execution {
        let reason = panic_message(&payload);
        let backtrace = std::backtrace::Backtrace::force_capture().to_string();
        let report = CrashReport::new(story.key.clone(), reason.clone(), backtrace);

        let crash_report_path = match generate_crash_report(&report, &self.crash_log_dir) {
            Ok(path) => Some(path),
            Err(io_err) => {
                error!(error = %io_err, dir = %self.crash_log_dir.display(), "failed to write crash report");
                None
            }
        };

        error!(
            story_key = %story.key,
            reason = %reason,
            crash_report = ?crash_report_path,
            "batch driver recovered from a panic"
        );

        let message = match &crash_report_path {
            Some(path) => format!("panicked: {reason} (crash report: {})", path.display()),
            None => format!("panicked: {reason} (crash report could not be written)"),
        };

        let mut execution = Execution::new(story.clone());
        execution.status = ExecutionStatus::Failed;
        execution.error = Some(message.clone());
        self.sink.emit(EngineEvent::ExecutionCompleted {
            status: ExecutionStatus::Failed,
            duration: Duration::ZERO,
            error: Some(message),
        });
        execution
    }
}

/// Best-effort extraction of a human-readable message from a panic payload, which
/// is typically a `&'static str` or `String` but is not guaranteed to be either.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn update_step_average(averages: &mut HashMap<StepKind, Duration>, kind: StepKind, sample: Duration) {
    averages
        .entry(kind)
        .and_modify(|current| {
            let current_secs = current.as_secs_f64();
            let sample_secs = sample.as_secs_f64();
            let blended = STEP_AVERAGE_ALPHA * sample_secs + (1.0 - STEP_AVERAGE_ALPHA) * current_secs;
            *current = Duration::from_secs_f64(blended.max(0.0));
        })
        .or_insert(sample);
}
