//! The message-sink contract: typed events emitted by the engine as execution
//! progresses. The engine never interprets these semantically beyond constructing
//! them; interpretation (rendering a TUI, updating a terminal UI message bus) is the
//! caller's job.

use crate::engine::executor::Execution;
use crate::models::{ExecutionStatus, StepKind, StepStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    ExecutionStarted {
        execution: Execution,
    },
    ExecutionTick {
        time: DateTime<Utc>,
    },
    StepStarted {
        step_index: usize,
        step_kind: StepKind,
        command_display: String,
        attempt: u32,
    },
    StepOutput {
        step_index: usize,
        line: String,
        is_stderr: bool,
    },
    StepCompleted {
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        error: Option<String>,
    },
    ExecutionCompleted {
        status: ExecutionStatus,
        duration: Duration,
        error: Option<String>,
    },
    QueueUpdated {
        queue_len: usize,
    },
    QueueItemStarted {
        index: usize,
        key: String,
    },
    QueueItemCompleted {
        index: usize,
        key: String,
        status: ExecutionStatus,
    },
    QueueCompleted {
        total: usize,
        success: usize,
        failed: usize,
        total_duration: Duration,
    },
}

/// An opaque, thread-safe event consumer. Typically the UI loop, but tests use a
/// `Vec`-backed recorder (see `tests/integration/helpers.rs`).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

impl<F: Fn(EngineEvent) + Send + Sync> EventSink for F {
    fn emit(&self, event: EngineEvent) {
        self(event)
    }
}
