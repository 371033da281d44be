//! The configuration record consumed by the engine. Loading it from CLI flags and
//! an optional on-disk file is the `config_loader` module's job; this type carries no
//! filesystem assumptions beyond the two path-ish string fields below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_RETRIES: u32 = 1;
const DEFAULT_STORY_DIR: &str = "_bmad-output/implementation-artifacts";
const DEFAULT_MAX_WORKERS: usize = 1;
const MAX_WORKERS_CAP: usize = 10;
const DEFAULT_CRASH_LOG_DIR: &str = "_bmad-output/crash-reports";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-step timeout, in seconds.
    pub timeout_secs: u64,
    /// Additional attempts after the first.
    pub retries: u32,
    /// Child process working directory. `None` means the process's own cwd.
    pub working_dir: Option<String>,
    /// Where story markdown files live.
    pub story_dir: String,
    /// Parallel pool size, clamped to `[1, 10]` by the `ParallelExecutor`.
    pub max_workers: usize,
    /// Where `BatchExecutor` writes a diagnostic record if its driver loop
    /// recovers from a panic.
    pub crash_log_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
            working_dir: None,
            story_dir: DEFAULT_STORY_DIR.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            crash_log_dir: DEFAULT_CRASH_LOG_DIR.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_workers must be between 1 and {MAX_WORKERS_CAP}, got {0}")]
    InvalidMaxWorkers(usize),
    #[error("timeout_secs must be greater than 0")]
    InvalidTimeout,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS_CAP {
            return Err(ConfigError::InvalidMaxWorkers(self.max_workers));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}
