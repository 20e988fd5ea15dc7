//! Append-only CSV activity log.
//!
//! The header row is written once when the file is created, then one
//! quote-wrapped row per completed cycle. Rows are never rewritten or
//! deduplicated; a reader can tail the file while the tracker runs.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::TrackerResult;

/// Fixed header row, written exactly once per log file.
pub const CSV_HEADER: &str = "\"Timestamp\",\"Client\",\"Tool\",\"Activity\"";

/// One analyzed (or canned) activity entry.
///
/// Field defaults let a response with an absent key decode as an empty
/// string; a written row therefore always has all four columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityRecord {
    pub timestamp: String,
    pub client: String,
    pub tool: String,
    pub activity: String,
}

impl ActivityRecord {
    /// The canned record written when no display changed since the
    /// previous cycle.
    pub fn unchanged(timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            client: "Previous client".to_string(),
            tool: "Previous tool".to_string(),
            activity: "Previous activity".to_string(),
        }
    }

    /// Render the record as one quote-wrapped CSV row, without the
    /// trailing newline. Field order is fixed.
    pub fn to_csv_row(&self) -> String {
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\"",
            self.timestamp, self.client, self.tool, self.activity
        )
    }
}

/// Handle to the append-only log file.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Creates the file (with its header) and any
    /// missing parent directories on first use. Not transactional: a
    /// crash mid-write can leave a torn final row.
    pub fn append(&self, record: &ActivityRecord) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            std::fs::write(&self.path, format!("{}\n", CSV_HEADER))?;
            info!("Created activity log at {}", self.path.display());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.to_csv_row())?;
        Ok(())
    }
}
