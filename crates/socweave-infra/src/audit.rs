//! JSONL audit trail writer.
//!
//! Appends engine log entries to a newline-delimited JSON file, one record
//! per line, for out-of-band observability tooling. Append-only, like the
//! in-run action log it mirrors.

use std::io::Write;
use std::path::{Path, PathBuf};

use socweave_types::log::ActionLog;

/// Append-only JSONL writer for action log entries.
pub struct JsonlAuditWriter {
    path: PathBuf,
}

impl JsonlAuditWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a JSON line.
    pub fn append(&self, entry: &ActionLog) -> std::io::Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// Append a batch of entries.
    pub fn append_all(&self, entries: &[ActionLog]) -> std::io::Result<()> {
        for entry in entries {
            self.append(entry)?;
        }
        Ok(())
    }
}
