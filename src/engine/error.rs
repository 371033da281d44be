//! Typed failures produced by a single step attempt.
//!
//! `Display` text for each variant is part of the external contract: events and
//! tests match on these exact strings, so wording changes here are observable
//! behavior changes.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("unknown step")]
    UnknownStep,

    #[error("output line too long")]
    OutputLineTooLong,

    #[error("{0}")]
    Spawn(#[from] std::io::Error),

    #[error("process exited with status {code:?}")]
    NonZeroExit { code: Option<i32> },
}
