//! Audit sinks. The checker emits one record per checked resource; sinks are
//! write-only and must not fail the request.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{Operation, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allowed,
    Denied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub resource_type: Option<ResourceType>,
    pub resource_name: String,
    pub namespace: String,
    pub operator: String,
    pub operation: Operation,
    pub outcome: Outcome,
    pub detail: String,
    pub happen_time: DateTime<Utc>,
}

impl RecordEntry {
    /// Single pipe-delimited line; the message of each `TracingHistory` event.
    pub fn line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{:?}|{}",
            self.happen_time.to_rfc3339(),
            self.resource_type.map(|t| t.as_str()).unwrap_or("-"),
            self.resource_name,
            self.namespace,
            self.operation.as_str(),
            self.operator,
            self.outcome,
            self.detail,
        )
    }
}

pub trait HistorySink: Send + Sync {
    fn record(&self, entry: RecordEntry);
}

/// Emits audit records as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingHistory;

impl HistorySink for TracingHistory {
    fn record(&self, entry: RecordEntry) {
        info!(
            target: "meshgate::audit",
            operator = %entry.operator,
            outcome = ?entry.outcome,
            "{}", entry.line()
        );
    }
}

/// Appends one JSON object per record to a file.
pub struct FileHistory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl HistorySink for FileHistory {
    fn record(&self, entry: RecordEntry) {
        let line = match serde_json::to_string(&entry) {
            Ok(l) => l,
            Err(e) => { warn!(target: "meshgate::audit", "audit record not serializable: {}", e); return; }
        };
        let _g = self.lock.lock();
        let res = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = res {
            warn!(target: "meshgate::audit", "audit write to '{}' failed: {}", self.path.display(), e);
        }
    }
}

/// Collects records in memory; useful for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<RecordEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self { Self::default() }
    pub fn entries(&self) -> Vec<RecordEntry> { self.entries.lock().clone() }
    pub fn clear(&self) { self.entries.lock().clear(); }
}

impl HistorySink for MemoryHistory {
    fn record(&self, entry: RecordEntry) {
        self.entries.lock().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(outcome: Outcome) -> RecordEntry {
        RecordEntry {
            resource_type: Some(ResourceType::Namespaces),
            resource_name: "ns1".into(),
            namespace: "ns1".into(),
            operator: "u1".into(),
            operation: Operation::Modify,
            outcome,
            detail: "strategy_allow".into(),
            happen_time: Utc::now(),
        }
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileHistory::new(dir.path().join("audit.log"));
        sink.record(entry(Outcome::Allowed));
        sink.record(entry(Outcome::Denied));
        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<RecordEntry> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].outcome, Outcome::Denied);
    }

    #[test]
    fn line_format_has_all_fields() {
        let l = entry(Outcome::Allowed).line();
        assert!(l.contains("|namespaces|ns1|ns1|modify|u1|Allowed|strategy_allow"));
    }
}
