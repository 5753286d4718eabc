//! External issue tracker and code-review access.
//!
//! The engine only needs a handful of reads and writes from the tracker;
//! everything else about the tracker is opaque. Adapters:
//!
//! - [`MemoryTracker`]: in-process, with write-failure injection.
//! - [`FileTracker`]: a YAML snapshot on disk, for offline runs.
//! - [`GhTracker`]: the GitHub `gh` CLI.

pub mod file;
pub mod gh;
pub mod memory;

pub use file::FileTracker;
pub use gh::GhTracker;
pub use memory::{IssueRecord, MemoryTracker, PullRequestRecord, TrackerSnapshot};

use crate::config::{TrackerConfig, TrackerKind};
use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

/// Calls the engine makes against the tracker. Every call may fail with a
/// transport error; none are retried.
pub trait Tracker {
    fn issue_body(&self, number: u64) -> TransportResult<String>;
    fn set_issue_body(&self, number: u64, body: &str) -> TransportResult<()>;
    fn issue_state(&self, number: u64) -> TransportResult<IssueState>;
    fn issue_labels(&self, number: u64) -> TransportResult<Vec<String>>;
    fn set_issue_labels(&self, number: u64, labels: &[String]) -> TransportResult<()>;
    fn pr_body(&self, number: u64) -> TransportResult<String>;
    fn set_pr_body(&self, number: u64, body: &str) -> TransportResult<()>;
    fn open_prs_for_id(&self, id: &str) -> TransportResult<Vec<u64>>;
}

/// Build the tracker selected by `config`.
pub fn open(root: &Path, config: &TrackerConfig) -> Result<Box<dyn Tracker>> {
    match config.kind {
        TrackerKind::File => {
            let path = match &config.path {
                Some(p) => root.join(p),
                None => crate::paths::tracker_path(root),
            };
            Ok(Box::new(FileTracker::open(path)?))
        }
        TrackerKind::Gh => Ok(Box::new(GhTracker::discover(config.repo.clone())?)),
    }
}
