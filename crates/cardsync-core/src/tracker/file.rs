use super::memory::{MemoryTracker, TrackerSnapshot};
use super::{IssueState, Tracker, TransportResult};
use crate::error::{Result, TransportError};
use std::path::{Path, PathBuf};

/// Tracker backed by a YAML snapshot file. Every successful write is
/// persisted before the call returns.
#[derive(Debug)]
pub struct FileTracker {
    path: PathBuf,
    inner: MemoryTracker,
}

impl FileTracker {
    /// Load the snapshot at `path`; a missing file is an empty tracker.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_yaml::from_str::<Option<TrackerSnapshot>>(&data)?.unwrap_or_default()
        } else {
            TrackerSnapshot::default()
        };
        Ok(Self {
            path,
            inner: MemoryTracker::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.inner.snapshot()
    }

    fn persist(&self, operation: &str, entity: String) -> TransportResult<()> {
        let entity_err = |message: String| TransportError::new(operation, entity.clone(), message);
        let data = serde_yaml::to_string(&self.inner.snapshot())
            .map_err(|e| entity_err(e.to_string()))?;
        crate::io::atomic_write(&self.path, data.as_bytes()).map_err(|e| entity_err(e.to_string()))
    }
}

impl Tracker for FileTracker {
    fn issue_body(&self, number: u64) -> TransportResult<String> {
        self.inner.issue_body(number)
    }

    fn set_issue_body(&self, number: u64, body: &str) -> TransportResult<()> {
        self.inner.set_issue_body(number, body)?;
        self.persist("set_issue_body", format!("issue #{number}"))
    }

    fn issue_state(&self, number: u64) -> TransportResult<IssueState> {
        self.inner.issue_state(number)
    }

    fn issue_labels(&self, number: u64) -> TransportResult<Vec<String>> {
        self.inner.issue_labels(number)
    }

    fn set_issue_labels(&self, number: u64, labels: &[String]) -> TransportResult<()> {
        self.inner.set_issue_labels(number, labels)?;
        self.persist("set_issue_labels", format!("issue #{number}"))
    }

    fn pr_body(&self, number: u64) -> TransportResult<String> {
        self.inner.pr_body(number)
    }

    fn set_pr_body(&self, number: u64, body: &str) -> TransportResult<()> {
        self.inner.set_pr_body(number, body)?;
        self.persist("set_pr_body", format!("pull request #{number}"))
    }

    fn open_prs_for_id(&self, id: &str) -> TransportResult<Vec<u64>> {
        self.inner.open_prs_for_id(id)
    }
}
