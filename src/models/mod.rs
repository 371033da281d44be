//! Shared value types for stories and their workflow steps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A work item processed by the fixed four-step workflow.
///
/// Identity is `key`; the rest describes what the surrounding story catalog knows
/// about the item at the moment it was scheduled. A `Story` is immutable once handed
/// to an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub key: String,
    pub epic: u32,
    pub status: StoryStatus,
    pub title: String,
    pub file_path: String,
    pub file_exists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryStatus {
    ReadyForDev,
    InProgress,
    Complete,
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoryStatus::ReadyForDev => write!(f, "ready-for-dev"),
            StoryStatus::InProgress => write!(f, "in-progress"),
            StoryStatus::Complete => write!(f, "complete"),
        }
    }
}

/// One element of the fixed workflow. Ordering is total: always in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    CreateStory,
    DevStory,
    CodeReview,
    GitCommit,
}

impl StepKind {
    /// The canonical, total ordering of steps within an execution.
    pub const ORDER: [StepKind; 4] = [
        StepKind::CreateStory,
        StepKind::DevStory,
        StepKind::CodeReview,
        StepKind::GitCommit,
    ];
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::CreateStory => "create-story",
            StepKind::DevStory => "dev-story",
            StepKind::CodeReview => "code-review",
            StepKind::GitCommit => "git-commit",
        };
        write!(f, "{s}")
    }
}

/// Status of one step within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// Status of an entire story execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

/// Aggregate status of a batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    Idle,
    Running,
    Paused,
    Completed,
}
