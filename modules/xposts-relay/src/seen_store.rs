//! Per-account record of post ids that have already been relayed.
//!
//! The in-memory set answers "is this id new?". The log file is an append-only
//! audit trail and the source used to rebuild the set on restart. Log failures
//! never stop the relay: the in-memory set keeps deduplicating for the rest of
//! the process run.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RelayError, Result};

/// Characters of the body kept in a log entry's snippet.
pub const SNIPPET_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// A single pretty-printed JSON array, rewritten on every append.
    #[default]
    JsonArray,
    /// One JSON object per line, appended in place.
    JsonLines,
}

impl LogFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::JsonArray => "json",
            LogFormat::JsonLines => "jsonl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub content: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn new(id: &str, content: &str, link: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            content: content.to_string(),
            snippet: snippet(content),
            link,
            time: Some(Utc::now()),
        }
    }
}

pub fn snippet(content: &str) -> String {
    content.chars().take(SNIPPET_CHARS).collect()
}

pub struct SeenStore {
    path: PathBuf,
    format: LogFormat,
    seen: HashSet<String>,
}

impl SeenStore {
    /// Open the store, seeding the seen set from the log when it exists.
    /// An unreadable log is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>, format: LogFormat) -> Self {
        let path = path.into();
        let seen = match load_ids(&path) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read seen log, starting empty");
                HashSet::new()
            }
        };
        info!(path = %path.display(), seen = seen.len(), "Seen store loaded");

        Self { path, format, seen }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Record an id as relayed. Returns false if it was already known.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    /// Append an entry to the log file.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        match self.format {
            LogFormat::JsonLines => self.append_line(entry),
            LogFormat::JsonArray => self.append_to_array(entry),
        }
    }

    fn append_line(&self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(persistence)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn append_to_array(&self, entry: &LogEntry) -> Result<()> {
        let mut entries: Vec<Value> = match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(persistence)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        entries.push(serde_json::to_value(entry).map_err(persistence)?);

        // Write beside the log and rename so a crash never leaves half an array.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&entries).map_err(persistence)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Read every id recorded in a log file. Accepts either a JSON array or
/// newline-delimited JSON, with string or numeric ids. Missing file is empty.
pub fn load_ids(path: &Path) -> Result<HashSet<String>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(HashSet::new());
    }

    if trimmed.starts_with('[') {
        let entries: Vec<Value> = serde_json::from_str(trimmed).map_err(persistence)?;
        return Ok(entries.iter().filter_map(entry_id).collect());
    }

    let mut ids = HashSet::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => ids.extend(entry_id(&value)),
            Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "Skipping malformed log line"),
        }
    }
    Ok(ids)
}

fn entry_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn persistence(err: serde_json::Error) -> RelayError {
    RelayError::Persistence(err.to_string())
}
