// Game journal
// Append-only JSONL log of everything a session does: spins, undos, resets, compositions

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while journaling
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    SessionStarted,
    Spin,
    Undo,
    Reset,
    Composed,
}

/// One line of the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// ISO 8601 timestamp of when this entry was created
    pub timestamp: String,

    /// Session the entry belongs to
    pub session_id: Uuid,

    pub event: JournalEvent,

    /// Human-readable summary, e.g. "Spin 2: rolled 3+5+1 = 9"
    pub message: String,

    /// Optional structured payload (the pick, the output path, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JournalEntry {
    pub fn new(session_id: Uuid, event: JournalEvent, message: impl Into<String>) -> Self {
        JournalEntry {
            timestamp: Utc::now().to_rfc3339(),
            session_id,
            event,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends journal entries to a JSONL file
#[derive(Debug, Clone)]
pub struct JournalWriter {
    file_path: PathBuf,
}

impl JournalWriter {
    pub fn new(file_path: PathBuf) -> Self {
        JournalWriter { file_path }
    }

    /// Append an entry, creating the file if needed
    pub fn write(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let json_line = entry.to_json_line()?;
        file.write_all(json_line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read journal entries back from a JSONL file
pub fn read_journal_file(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}
