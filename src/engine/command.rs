//! Pure translation from (step kind, story, config) to a direct process invocation.
//!
//! No shell is ever involved: the story key (and, by extension, the resolved story
//! file path) is interpolated into a single prompt string that becomes exactly one
//! argv element. A shell-metacharacter-laden key cannot escape that element because
//! nothing downstream re-parses it.

use crate::engine::config::EngineConfig;
use crate::models::{StepKind, Story};

pub const CLAUDE_BIN: &str = "claude";
const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// A fully-resolved process invocation: a program name and its argv, passed verbatim
/// to the OS with no shell interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// True if the builder had no mapping for the requested step kind. The runner
    /// must treat this as an `EngineError::UnknownStep`, never as a no-op success.
    /// `StepKind` is a closed enum covered exhaustively below, so this is currently
    /// unreachable in practice, but the runner checks it rather than trusting the
    /// builder -- the same defense-in-depth the contract calls for if the step set
    /// ever grows ahead of the builder.
    pub fn is_unknown(&self) -> bool {
        self.name.is_empty()
    }

    fn claude(prompt: String) -> Self {
        Self {
            name: CLAUDE_BIN.to_string(),
            args: vec![
                SKIP_PERMISSIONS_FLAG.to_string(),
                "-p".to_string(),
                prompt,
            ],
        }
    }

    /// A human-readable one-liner for display in `StepStarted` events, never used to
    /// re-invoke the process.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            return String::new();
        }
        format!("{} {}", self.name, self.args.join(" "))
    }
}

/// Resolves the on-disk path for a story's markdown file.
pub fn story_file_path(story_dir: &str, key: &str) -> String {
    format!("{story_dir}/{key}.md")
}

/// Builds the `CommandSpec` for one step of one story.
pub fn build_command(kind: StepKind, story: &Story, config: &EngineConfig) -> CommandSpec {
    let path = story_file_path(&config.story_dir, &story.key);

    match kind {
        StepKind::CreateStory => CommandSpec::claude(format!(
            "/bmad:bmm:workflows:create-story - Create story: {}",
            story.key
        )),
        StepKind::DevStory => CommandSpec::claude(format!(
            "/bmad:bmm:workflows:dev-story - Work on story file: {path}. Complete all \
             tasks. Run tests after each implementation. Do not ask clarifying \
             questions - use best judgment based on existing patterns."
        )),
        StepKind::CodeReview => CommandSpec::claude(format!(
            "/bmad:bmm:workflows:code-review - Review story: {path}. IMPORTANT: When \
             presenting options, always choose option 1 to auto-fix all issues \
             immediately. Do not wait for user input."
        )),
        StepKind::GitCommit => CommandSpec::claude(format!(
            "Commit all changes for story {} with a descriptive message. Then push to \
             the current branch.",
            story.key
        )),
    }
}
