//! Clap argument definitions. This binary is a thin manual-smoke-test harness
//! around the engine, not the real operator UI (that's a separate, out-of-scope
//! collaborator) -- it exists so a developer can drive one story from a terminal.

use crate::engine::config::EngineConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "storyweave",
    about = "Drives a single story through its workflow steps via the `claude` CLI"
)]
pub struct Cli {
    /// Story key, e.g. "3-1-user-auth".
    pub key: String,

    /// Epic number the story belongs to.
    #[arg(long, default_value_t = 0)]
    pub epic: u32,

    /// Story title, for display only.
    #[arg(long, default_value = "")]
    pub title: String,

    /// Skip `create-story` because the story file already exists on disk.
    #[arg(long)]
    pub file_exists: bool,

    /// Path to an optional config file.
    #[arg(long, default_value = "storyweave.toml")]
    pub config: PathBuf,

    /// Per-step timeout, in seconds. Overrides the config file.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Additional attempts after the first. Overrides the config file.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Child process working directory. Overrides the config file.
    #[arg(long)]
    pub working_dir: Option<String>,

    /// Where story markdown files live. Overrides the config file.
    #[arg(long)]
    pub story_dir: Option<String>,
}

/// CLI-flag overrides layered on top of a loaded config file (see
/// `config_loader`). Every field absent (`None`) leaves the underlying value
/// untouched.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub working_dir: Option<String>,
    pub story_dir: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(working_dir) = self.working_dir.clone() {
            config.working_dir = Some(working_dir);
        }
        if let Some(story_dir) = self.story_dir.clone() {
            config.story_dir = story_dir;
        }
    }
}

impl From<&Cli> for ConfigOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            timeout_secs: cli.timeout_secs,
            retries: cli.retries,
            working_dir: cli.working_dir.clone(),
            story_dir: cli.story_dir.clone(),
        }
    }
}
