//! Append-only transaction/event log.
//!
//! One JSON object per line:
//!
//! ```text
//! {"timestamp":"2024-06-01T12:00:00+00:00","transaction_id":"<uuid v4>","data":{...}}
//! ```
//!
//! Every append opens the file, writes one complete line and closes it, so
//! concurrent writers never interleave partial entries. Nothing reads the log
//! back.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EventLogResult;
use crate::logging::LogService;

/// A stored log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    /// UTC, ISO-8601
    pub timestamp: String,
    /// Random UUID v4
    pub transaction_id: String,
    pub data: Value,
}

impl EventEntry {
    pub fn new(data: Value) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            transaction_id: Uuid::new_v4().to_string(),
            data,
        }
    }
}

/// Writes [`EventEntry`] lines to one file.
#[derive(Clone)]
pub struct TransactionLogger {
    path: PathBuf,
    log: Arc<LogService>,
}

impl TransactionLogger {
    pub fn new(path: impl AsRef<Path>, log: Arc<LogService>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            log,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry wrapping `data`.
    pub fn log_transaction(&self, data: Value) -> EventLogResult<EventEntry> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entry = EventEntry::new(data);
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        self.log
            .info(format!("Logged transaction {}", entry.transaction_id));
        Ok(entry)
    }

    /// Like [`Self::log_transaction`], but a failure is only logged.
    pub fn record(&self, data: Value) -> Option<EventEntry> {
        match self.log_transaction(data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.log.error(format!(
                    "Cannot append to event log {} [event-log]: {}",
                    self.path.display(),
                    e
                ));
                None
            }
        }
    }

    pub fn file_upload(&self, filename: &str, rows: usize) -> Option<EventEntry> {
        self.record(json!({
            "action": "file_upload",
            "filename": filename,
            "rows": rows,
        }))
    }

    pub fn upload_failed(&self, filename: &str, error: &str) -> Option<EventEntry> {
        self.record(json!({
            "action": "upload_failed",
            "filename": filename,
            "error": error,
        }))
    }

    pub fn report_export(&self, path: &Path, pages: usize) -> Option<EventEntry> {
        self.record(json!({
            "action": "report_export",
            "path": path.display().to_string(),
            "pages": pages,
        }))
    }
}
