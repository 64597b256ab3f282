//! Append-only write log
//!
//! Every committed put or delete is appended as one JSON line and synced to
//! disk before the write is acknowledged. Replaying the log in order rebuilds
//! the table after a restart.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TelemetryResult;
use crate::types::Item;

/// One logged write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogEntry {
    Put { item: Item },
    Delete { pk: String, sk: String },
}

/// JSONL write log backing a [`MemoryBackend`](super::MemoryBackend)
#[derive(Debug)]
pub struct WriteLog {
    path: PathBuf,
    file: File,
}

impl WriteLog {
    /// Open (or create) the log file for appending
    pub fn open<P: AsRef<Path>>(path: P) -> TelemetryResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append entries and sync them to disk
    pub fn append(&mut self, entries: &[LogEntry]) -> TelemetryResult<()> {
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }
        self.file.write_all(buf.as_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Load every readable entry in write order
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub fn load(&self) -> TelemetryResult<Vec<LogEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_num + 1,
                        error = %e,
                        "skipping unreadable write log entry"
                    );
                }
            }
        }

        Ok(entries)
    }
}
