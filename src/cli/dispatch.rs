//! Wires a parsed `Cli` to the engine: loads config, builds a `Story`, runs one
//! `Executor`, and renders events to the terminal. Real UIs build their own sink;
//! this one is print-based, matching the CLI-facing output style the rest of the
//! `storyweave` ecosystem uses.

use crate::cli::types::{Cli, ConfigOverrides};
use crate::config_loader;
use crate::engine::command::story_file_path;
use crate::engine::events::{EngineEvent, EventSink};
use crate::engine::executor::Executor;
use crate::models::{Story, StoryStatus};
use anyhow::Context;
use colored::Colorize;
use std::sync::Arc;

struct TerminalSink;

impl EventSink for TerminalSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::ExecutionStarted { execution } => {
                println!("{} {}", "started".green().bold(), execution.story.key);
            }
            EngineEvent::ExecutionTick { .. } => {}
            EngineEvent::StepStarted {
                step_kind,
                attempt,
                command_display,
                ..
            } => {
                println!(
                    "{} {} (attempt {}) -- {}",
                    "step".cyan().bold(),
                    step_kind,
                    attempt,
                    command_display
                );
            }
            EngineEvent::StepOutput { line, is_stderr, .. } => {
                if is_stderr {
                    eprintln!("{}", line.dimmed());
                } else {
                    println!("{line}");
                }
            }
            EngineEvent::StepCompleted { status, error, .. } => match error {
                Some(err) => println!("{} {:?}: {}", "step failed".red().bold(), status, err),
                None => println!("{} {:?}", "step done".green(), status),
            },
            EngineEvent::ExecutionCompleted {
                status,
                duration,
                error,
            } => {
                println!("{} {:?} in {:?}", "execution".bold(), status, duration);
                if let Some(err) = error {
                    println!("{}", err.red());
                }
            }
            EngineEvent::QueueUpdated { .. }
            | EngineEvent::QueueItemStarted { .. }
            | EngineEvent::QueueItemCompleted { .. }
            | EngineEvent::QueueCompleted { .. } => {
                // Single-story CLI invocations never touch a queue.
            }
        }
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = ConfigOverrides::from(&cli);
    let config =
        config_loader::load(&cli.config, &overrides).context("loading engine configuration")?;

    let story = Story {
        file_path: story_file_path(&config.story_dir, &cli.key),
        key: cli.key,
        epic: cli.epic,
        status: StoryStatus::ReadyForDev,
        title: cli.title,
        file_exists: cli.file_exists,
    };

    let executor = Arc::new(Executor::new(config, Arc::new(TerminalSink)));
    let execution = executor.execute(story);

    if execution.error.is_some() {
        anyhow::bail!(
            "execution ended with status {:?}: {}",
            execution.status,
            execution.error.unwrap_or_default()
        );
    }
    Ok(())
}
