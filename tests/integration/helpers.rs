//! Shared test helpers for engine integration tests.
//!
//! `CommandSpec` always names the program `claude` and never an absolute path, so
//! the only way to intercept it from a test is to put a fake `claude` executable
//! ahead of the real one on `PATH`. `MockClaude` does exactly that: it writes a
//! tiny shell script into a temp directory and prepends that directory to `PATH`
//! for the lifetime of the guard, restoring the original value on drop.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Installs a fake `claude` on `PATH` for as long as the guard lives.
pub struct MockClaude {
    _dir: TempDir,
    original_path: Option<String>,
}

impl MockClaude {
    /// `script` is a full shell script body (no `#!` line needed; it's added here).
    pub fn install(script: &str) -> Self {
        let dir = TempDir::new().expect("create mock claude temp dir");
        let path = dir.path().join("claude");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write mock claude script");
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();

        let original_path = std::env::var("PATH").ok();
        let prefixed = match &original_path {
            Some(existing) => format!("{}:{existing}", dir.path().display()),
            None => dir.path().display().to_string(),
        };
        std::env::set_var("PATH", prefixed);

        Self {
            _dir: dir,
            original_path,
        }
    }

    /// A `claude` that always exits 0 with no output.
    pub fn succeeds() -> Self {
        Self::install("exit 0")
    }

    /// A `claude` that always exits non-zero.
    pub fn fails(code: i32) -> Self {
        Self::install(&format!("exit {code}"))
    }

    /// A `claude` that sleeps longer than any reasonable test timeout.
    pub fn hangs() -> Self {
        Self::install("sleep 600")
    }

    /// A `claude` that prints a line to each stream, then exits 0.
    pub fn echoes(stdout_line: &str, stderr_line: &str) -> Self {
        Self::install(&format!(
            "echo '{stdout_line}'\necho '{stderr_line}' 1>&2\nexit 0"
        ))
    }

    /// A `claude` that fails on every invocation until the `n`th (1-indexed), then
    /// succeeds, tracking attempt count in a fresh counter file so concurrent test
    /// runs never share state.
    pub fn fails_then_succeeds(n: u32, counter_dir: &Path) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let counter_path = counter_dir.join(format!("attempts-{id}.count"));
        fs::write(&counter_path, "0").unwrap();
        Self::install(&format!(
            "count=$(cat '{path}')\n\
             count=$((count + 1))\n\
             echo \"$count\" > '{path}'\n\
             if [ \"$count\" -lt {n} ]; then exit 1; else exit 0; fi",
            path = counter_path.display(),
        ))
    }
}

impl Drop for MockClaude {
    fn drop(&mut self) {
        match &self.original_path {
            Some(p) => std::env::set_var("PATH", p),
            None => std::env::remove_var("PATH"),
        }
    }
}

/// A `Vec`-backed event recorder, shared by every integration/e2e test that needs
/// to assert on the ordered event stream rather than just the final `Execution`.
pub struct Recorder(std::sync::Mutex<Vec<storyweave::engine::EngineEvent>>);

impl Recorder {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self(std::sync::Mutex::new(Vec::new())))
    }

    pub fn events(&self) -> Vec<storyweave::engine::EngineEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl storyweave::engine::EventSink for Recorder {
    fn emit(&self, event: storyweave::engine::EngineEvent) {
        self.0.lock().unwrap().push(event);
    }
}

pub fn story(key: &str, file_exists: bool) -> storyweave::models::Story {
    storyweave::models::Story {
        key: key.to_string(),
        epic: 1,
        status: storyweave::models::StoryStatus::ReadyForDev,
        title: "title".to_string(),
        file_path: format!("{key}.md"),
        file_exists,
    }
}

pub fn fast_config() -> storyweave::engine::EngineConfig {
    storyweave::engine::EngineConfig {
        retries: 0,
        timeout_secs: 5,
        ..storyweave::engine::EngineConfig::default()
    }
}
