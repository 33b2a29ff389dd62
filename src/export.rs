use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::events::{Message, Role};
use crate::topic::extract_topic;

const DEFAULT_EXPORT_NAME: &str = "conversation";

/// Markdown transcript: one `Role: content` block per message, blank line between
pub fn render_conversation(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(message.role().label());
        out.push_str(": ");
        out.push_str(message.content());
        out.push_str("\n\n");
    }
    out
}

/// Write the transcript to `<dir>/<topic>.md` (or `conversation.md`).
/// An existing file of the same name is overwritten.
pub fn save_conversation(dir: &Path, messages: &[Message], topic: Option<&str>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let file_name = format!("{}.md", topic.unwrap_or(DEFAULT_EXPORT_NAME));
    let path = dir.join(file_name);
    fs::write(&path, render_conversation(messages))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

/// Rebuild role/content pairs from an exported transcript.
///
/// A line starting with `User: ` or `Assistant: ` opens a new message; any
/// other line continues the current one.
pub fn parse_conversation(text: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut current: Option<(Role, String)> = None;

    let flush = |current: &mut Option<(Role, String)>, messages: &mut Vec<Message>| {
        if let Some((role, content)) = current.take() {
            let content = content.strip_suffix("\n\n").unwrap_or(&content).to_string();
            messages.push(match role {
                Role::User => Message::user(content),
                Role::Assistant => Message::assistant(content),
            });
        }
    };

    for line in text.split_inclusive('\n') {
        let opened = [Role::User, Role::Assistant].into_iter().find_map(|role| {
            line.strip_prefix(role.label())
                .and_then(|rest| rest.strip_prefix(": "))
                .map(|rest| (role, rest))
        });

        match opened {
            Some((role, rest)) => {
                flush(&mut current, &mut messages);
                current = Some((role, rest.to_string()));
            }
            None => {
                if let Some((_, content)) = current.as_mut() {
                    content.push_str(line);
                }
            }
        }
    }
    flush(&mut current, &mut messages);

    messages
}

/// Topic used to name an export: derived from the last exchange
pub fn export_topic(messages: &[Message]) -> Option<String> {
    match messages {
        [.., previous, last] => extract_topic(previous.content(), last.content()),
        _ => None,
    }
}

/// Exported conversations on disk
pub struct ExportStore {
    export_dir: PathBuf,
}

impl ExportStore {
    pub fn new(export_dir: PathBuf) -> Self {
        Self { export_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.export_dir)
            .context("Failed to create export directory")?;
        Ok(())
    }

    /// Save under the topic of the last exchange
    pub fn save(&self, messages: &[Message]) -> Result<PathBuf> {
        let topic = export_topic(messages);
        save_conversation(&self.export_dir, messages, topic.as_deref())
    }

    /// Exported transcripts, sorted by file name
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.export_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.export_dir)
            .context("Failed to read export directory")?;

        let mut exports = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
                exports.push(path);
            }
        }
        exports.sort();
        Ok(exports)
    }

    pub fn load(&self, name: &str) -> Result<Vec<Message>> {
        let path = self.export_dir.join(name);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(parse_conversation(&content))
    }
}
