//! `storyweave`: drives software-development-workflow stories through a fixed
//! sequence of steps by invoking an external assistant CLI, streaming its output,
//! retrying on failure, and exposing pause/resume/cancel/skip controls.
//!
//! The `engine` module is the self-contained core (`Executor`, `BatchExecutor`,
//! `ParallelExecutor`, all sharing one `PauseController`). `models` holds the
//! shared value types. `config_loader` and `cli` are the thin binary-level glue
//! that turns the engine into `storyweave` the command.

pub mod cli;
pub mod config_loader;
pub mod engine;
pub mod models;
