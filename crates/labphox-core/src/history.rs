//! Command history log
//!
//! Append-only JSON sink recording raw outgoing commands and raw incoming
//! replies, keyed by category name, each entry timestamped. The file layout
//! is a map of category to entry list:
//!
//! ```json
//! { "actions": [ { "data": "W:2:A:;", "date": 1735689600.25 } ] }
//! ```
//!
//! History is strictly best-effort: the connection logs and swallows write
//! failures so a broken log file never aborts a command in flight.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One logged command or reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The raw text that went over (or came off) the wire
    pub data: String,
    /// Unix timestamp in seconds
    pub date: f64,
}

/// Append-only JSON history file
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    /// Create a log backed by the given file; the file is created on first
    /// append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry under the given category
    pub fn append(&self, category: &str, data: &str) -> io::Result<()> {
        let mut map = self.read_map();
        map.entry(category.to_string())
            .or_default()
            .push(HistoryEntry {
                data: data.to_string(),
                date: Utc::now().timestamp_millis() as f64 / 1000.0,
            });

        let json = serde_json::to_string(&map)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, json)
    }

    /// All entries recorded under a category, oldest first
    pub fn entries(&self, category: &str) -> Vec<HistoryEntry> {
        self.read_map().remove(category).unwrap_or_default()
    }

    /// Load the file; a missing or corrupt file starts a fresh map
    fn read_map(&self) -> BTreeMap<String, Vec<HistoryEntry>> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "corrupt history file, starting fresh");
            BTreeMap::new()
        })
    }
}
