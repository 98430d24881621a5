use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::state::RenderedEntry;

const EXPORT_TITLE: &str = "Conversation with DialoGPT";

/// Plain-text transcript: a title block, then one `[time] Role: content`
/// group per rendered entry, each followed by a blank line.
pub fn format_transcript(entries: &[RenderedEntry]) -> String {
    let mut text = String::new();
    text.push_str(EXPORT_TITLE);
    text.push('\n');
    text.push_str(&"=".repeat(30));
    text.push_str("\n\n");

    for entry in entries {
        text.push_str(&format!(
            "[{}] {}: {}\n\n",
            entry.time,
            entry.kind.label(),
            entry.content
        ));
    }

    text
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("chat_{}.txt", date.format("%Y-%m-%d"))
}

/// Write the transcript into `dir`, returning the file's path.
pub fn write_export(dir: &Path, date: NaiveDate, entries: &[RenderedEntry]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating export directory {}", dir.display()))?;

    let path = dir.join(export_file_name(date));
    fs::write(&path, format_transcript(entries))
        .with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(path = %path.display(), entries = entries.len(), "exported conversation");
    Ok(path)
}
