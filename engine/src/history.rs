//! Local transcript history: one JSON file per thread.
//!
//! Files written by older clients may hold entries in other shapes (a
//! `parts` array, a `text` or `message` field, unknown roles). Loading
//! repairs them into [`ChatMessage`]s and rewrites the file once so the next
//! load is clean.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use threadline_types::{ChatMessage, Role, ThreadId};

use crate::store::{StoreFuture, ThreadStore};

/// Legacy entry fields that may carry the message text, in lookup order.
const LEGACY_CONTENT_KEYS: [&str; 3] = ["content", "message", "text"];

/// Keys read from a legacy object value when it has no `text`.
const TEXTISH_KEYS: [&str; 6] = ["text", "content", "value", "message", "body", "result"];

/// Transcripts stored as `{dir}/{thread id}.json`.
///
/// File operations run one at a time. The lock is owned by the blocking
/// task, so a write whose caller was aborted still finishes before a later
/// delete runs.
#[derive(Debug, Clone)]
pub struct FileThreadStore {
    dir: PathBuf,
    io: Arc<Mutex<()>>,
}

impl FileThreadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            io: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ThreadId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Threads with a saved transcript, most recently written first.
    pub fn saved_threads(&self) -> io::Result<Vec<ThreadId>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<ThreadId>().ok())
            else {
                continue;
            };
            let modified = entry.metadata().and_then(|meta| meta.modified()).ok();
            found.push((modified, id));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, id)| id).collect())
    }
}

impl ThreadStore for FileThreadStore {
    fn load_messages(&self, id: ThreadId) -> StoreFuture<'_, Vec<ChatMessage>> {
        let path = self.path_for(id);
        Box::pin(async move {
            let guard = Arc::clone(&self.io).lock_owned().await;
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                read_transcript(&path)
            })
            .await?
        })
    }

    fn save_messages(&self, id: ThreadId, messages: &[ChatMessage]) -> StoreFuture<'_, ()> {
        let path = self.path_for(id);
        let messages = messages.to_vec();
        Box::pin(async move {
            let guard = Arc::clone(&self.io).lock_owned().await;
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                write_transcript(&path, &messages)
            })
            .await??;
            tracing::debug!(%id, "Transcript saved");
            Ok(())
        })
    }

    fn delete_thread(&self, id: ThreadId) -> StoreFuture<'_, ()> {
        let path = self.path_for(id);
        Box::pin(async move {
            let _guard = self.io.lock().await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
            }
        })
    }
}

fn read_transcript(path: &Path) -> anyhow::Result<Vec<ChatMessage>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let raw: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid transcript JSON in {}", path.display()))?;

    let (messages, repaired) = normalize_transcript(raw);
    if repaired {
        tracing::info!(
            path = %path.display(),
            messages = messages.len(),
            "Rewriting repaired transcript"
        );
        if let Err(e) = write_transcript(path, &messages) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to rewrite repaired transcript");
        }
    }
    Ok(messages)
}

fn write_transcript(path: &Path, messages: &[ChatMessage]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let bytes = serde_json::to_vec_pretty(messages).map_err(io::Error::other)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Repair a stored transcript. The flag reports whether anything changed.
///
/// Non-array documents become an empty transcript; non-object entries are
/// dropped; unknown roles become [`Role::Assistant`].
pub(crate) fn normalize_transcript(raw: Value) -> (Vec<ChatMessage>, bool) {
    let entries = match raw {
        Value::Array(entries) => entries,
        Value::Null => return (Vec::new(), false),
        _ => return (Vec::new(), true),
    };

    let mut repaired = false;
    let messages = entries
        .into_iter()
        .filter_map(|entry| {
            let Value::Object(entry) = entry else {
                repaired = true;
                return None;
            };
            let (message, changed) = normalize_entry(&entry);
            repaired |= changed;
            Some(message)
        })
        .collect();
    (messages, repaired)
}

fn normalize_entry(entry: &Map<String, Value>) -> (ChatMessage, bool) {
    let (role, known_role) = match entry.get("role").and_then(Value::as_str) {
        Some("user") => (Role::User, true),
        Some("assistant") => (Role::Assistant, true),
        _ => (Role::Assistant, false),
    };

    if let Some(Value::String(content)) = entry.get("content") {
        let message = ChatMessage {
            role,
            content: content.clone(),
        };
        return (message, !known_role);
    }

    let content = entry
        .get("parts")
        .and_then(parts_text)
        .or_else(|| {
            LEGACY_CONTENT_KEYS
                .iter()
                .find_map(|key| entry.get(*key).and_then(legacy_text))
        })
        .unwrap_or_default();
    (ChatMessage { role, content }, true)
}

/// Concatenated text of a parts array; `None` when no part carries text.
fn parts_text(parts: &Value) -> Option<String> {
    let Value::Array(parts) = parts else {
        return None;
    };
    let pieces: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            Value::String(text) => Some(text.as_str()),
            Value::Object(part) => textish(part),
            _ => None,
        })
        .collect();
    if pieces.is_empty() {
        None
    } else {
        Some(pieces.concat())
    }
}

fn legacy_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(_) => parts_text(value),
        Value::Object(object) => Some(textish(object).map_or_else(|| value.to_string(), str::to_string)),
        _ => None,
    }
}

fn textish(object: &Map<String, Value>) -> Option<&str> {
    TEXTISH_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}
