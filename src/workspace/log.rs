//! Append-only conversation log, one JSONL file per session.
//!
//! Writes never fail the caller: a persistence problem is logged and the live
//! chat stream carries on. Reads are tolerant of foreign lines (metadata
//! headers, tool messages, garbage) written by other tools into the same file.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::domain::{decode_file_stem, encode_file_stem};
use crate::lines::LossyLines;
use crate::{ConversationRecord, Role, SESSION_NAMESPACE, SessionKey, ToolCallRecord};

/// Suffix some backends inject into persisted user messages
const RUNTIME_CONTEXT_MARKER: &str = "\n\n[Runtime Context]";

/// Error type for log reads
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to read conversation log: {0}")]
    Io(#[from] std::io::Error),
}

/// Listing entry for one stored session
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub updated_at: String,
    pub message_count: usize,
}

/// Conversation log rooted at a `sessions/` directory
#[derive(Debug, Clone)]
pub struct ConversationLog {
    dir: PathBuf,
}

impl ConversationLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path new records for `key` are appended to
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(key.log_file_name())
    }

    /// Append one record. I/O failures are logged, never returned.
    pub async fn append(&self, key: &SessionKey, record: &ConversationRecord) {
        let path = self.path_for(key);
        if let Err(e) = append_line(&path, record).await {
            warn!("Failed to append message to {}: {}", path.display(), e);
        }
    }

    /// Read the user/assistant records of a session in file order.
    ///
    /// A session without any log file is [`LogError::SessionNotFound`]; an
    /// existing but empty log is an empty list.
    pub async fn read(&self, key: &SessionKey) -> Result<Vec<ConversationRecord>, LogError> {
        let path = self
            .existing_path(key)
            .await
            .ok_or_else(|| LogError::SessionNotFound(key.session_id().to_string()))?;
        read_records(&path).await
    }

    /// Summaries of every stored session with at least one message
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, LogError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}_", SESSION_NAMESPACE);
        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let encoded = stem.strip_prefix(&prefix).unwrap_or(stem);
            let Some(session_id) = decode_file_stem(encoded) else {
                debug!("Skipping log with foreign name {}", path.display());
                continue;
            };

            let records = match read_records(&path).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Skipping unreadable log {}: {}", path.display(), e);
                    continue;
                }
            };
            let Some(last) = records.last() else {
                continue;
            };
            sessions.push(SessionSummary {
                session_id,
                updated_at: last.timestamp.clone(),
                message_count: records.len(),
            });
        }

        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(sessions)
    }

    /// The namespaced file, or a bare `<id>.jsonl` left by older workers
    async fn existing_path(&self, key: &SessionKey) -> Option<PathBuf> {
        let candidates = [
            self.path_for(key),
            self.dir.join(format!("{}.jsonl", encode_file_stem(key.session_id()))),
        ];
        for path in candidates {
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }
}

async fn append_line(path: &Path, record: &ConversationRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

async fn read_records(path: &Path) -> Result<Vec<ConversationRecord>, LogError> {
    let file = fs::File::open(path).await?;
    let mut lines = LossyLines::new(BufReader::new(file));
    let mut records = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if let Some(record) = parse_line(&line) {
            records.push(record);
        }
    }

    Ok(records)
}

/// Turn one log line into a record, or `None` for anything that is not a
/// non-empty user/assistant message
fn parse_line(line: &str) -> Option<ConversationRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => {
            debug!("Skipping unparsable log line");
            return None;
        }
    };

    if data.get("_type").and_then(Value::as_str) == Some("metadata") {
        return None;
    }

    let role = match data.get("role").and_then(Value::as_str)? {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };

    let mut content = data.get("content").and_then(Value::as_str)?.to_string();
    if content.is_empty() {
        return None;
    }
    if role == Role::User {
        if let Some(idx) = content.find(RUNTIME_CONTEXT_MARKER) {
            content.truncate(idx);
        }
    }

    let timestamp = data
        .get("timestamp")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = data
        .get("tool_calls")
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<ToolCallRecord>>(v).ok())
        .filter(|calls| !calls.is_empty());

    Some(ConversationRecord {
        role,
        content,
        timestamp,
        tool_calls,
    })
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
