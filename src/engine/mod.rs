//! The execution engine: drives stories through their workflow steps and emits
//! progress to an opaque sink. Nothing in this module knows about the terminal UI,
//! the story catalog, or persistence -- see `config_loader` and `cli` for the glue
//! that turns this into the `storyweave` binary.

pub mod batch;
pub mod command;
pub mod config;
pub mod crash;
pub mod error;
pub mod events;
pub mod executor;
pub mod parallel;
pub mod pause;
pub mod runner;

pub use batch::{BatchExecutor, BatchOutcome, Queue, QueueItem};
pub use command::{build_command, CommandSpec};
pub use config::EngineConfig;
pub use crash::{generate_crash_report, CrashReport};
pub use error::EngineError;
pub use events::{EngineEvent, EventSink};
pub use executor::{Execution, Executor, StepExecution};
pub use parallel::{JobResult, ParallelExecutor};
pub use pause::PauseController;
