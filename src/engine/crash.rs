//! Crash-report generation for a driver thread recovering from a panic.
//!
//! Mirrors the teacher's retained crash-reporting shape: a timestamped markdown
//! file, frontmatter followed by a human-readable body, written under a
//! caller-supplied directory that is created on demand.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CrashReport {
    pub detected_at: DateTime<Utc>,
    pub story_key: String,
    pub reason: String,
    pub backtrace: String,
}

impl CrashReport {
    pub fn new(story_key: String, reason: String, backtrace: String) -> Self {
        Self {
            detected_at: Utc::now(),
            story_key,
            reason,
            backtrace,
        }
    }
}

/// Writes `report` to a timestamped markdown file under `crash_dir`, creating the
/// directory if it doesn't exist yet. Returns the path written.
pub fn generate_crash_report(report: &CrashReport, crash_dir: &Path) -> std::io::Result<PathBuf> {
    if !crash_dir.exists() {
        std::fs::create_dir_all(crash_dir)?;
    }

    let timestamp = report.detected_at.format("%Y%m%d-%H%M%S");
    let filename = format!("{timestamp}-{}.md", report.story_key);
    let crash_path = crash_dir.join(&filename);

    let mut content = String::new();
    content.push_str("---\n");
    content.push_str(&format!(
        "detected_at: \"{}\"\n",
        report.detected_at.to_rfc3339()
    ));
    content.push_str(&format!("story_key: \"{}\"\n", report.story_key));
    content.push_str(&format!(
        "reason: \"{}\"\n",
        report.reason.replace('"', "\\\"")
    ));
    content.push_str("---\n\n");

    content.push_str("# Crash Report\n\n");
    content.push_str("## Summary\n\n");
    content.push_str(&format!(
        "- **Detected**: {}\n",
        report.detected_at.to_rfc3339()
    ));
    content.push_str(&format!("- **Story**: `{}`\n", report.story_key));
    content.push_str(&format!("- **Reason**: {}\n\n", report.reason));

    content.push_str("## Backtrace\n\n```\n");
    content.push_str(&report.backtrace);
    if !report.backtrace.ends_with('\n') {
        content.push('\n');
    }
    content.push_str("```\n");

    std::fs::write(&crash_path, &content)?;
    Ok(crash_path)
}
