use super::{IssueState, Tracker, TransportResult};
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_state")]
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_state() -> IssueState {
    IssueState::Open
}

impl IssueRecord {
    pub fn open(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            state: IssueState::Open,
            labels: Vec::new(),
        }
    }

    pub fn closed() -> Self {
        Self {
            state: IssueState::Closed,
            ..Self::open("")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// Work-item ID the pull request belongs to.
    pub work_item: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl PullRequestRecord {
    pub fn open(work_item: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            work_item: work_item.into(),
            title: String::new(),
            body: body.into(),
            open: true,
        }
    }
}

/// Whole tracker state, as held in memory or persisted by [`super::FileTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    #[serde(default)]
    pub issues: BTreeMap<u64, IssueRecord>,
    #[serde(default)]
    pub pull_requests: BTreeMap<u64, PullRequestRecord>,
}

// ---------------------------------------------------------------------------
// MemoryTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Faults {
    writes: usize,
    fail_on_write: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryTracker {
    state: Mutex<TrackerSnapshot>,
    faults: Mutex<Faults>,
}

impl MemoryTracker {
    pub fn new(snapshot: TrackerSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            faults: Mutex::default(),
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.lock().clone()
    }

    pub fn with_issue(self, number: u64, issue: IssueRecord) -> Self {
        self.lock().issues.insert(number, issue);
        self
    }

    pub fn with_pull_request(self, number: u64, pr: PullRequestRecord) -> Self {
        self.lock().pull_requests.insert(number, pr);
        self
    }

    /// Make the `nth` write from now (1-based) fail with a transport error.
    pub fn fail_on_write(&self, nth: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.fail_on_write = Some(faults.writes + nth);
    }

    /// Number of writes attempted so far, failed ones included.
    pub fn write_count(&self) -> usize {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).writes
    }

    /// Edit an issue body directly, as a person would outside the engine.
    pub fn edit_issue_body(&self, number: u64, body: &str) {
        if let Some(issue) = self.lock().issues.get_mut(&number) {
            issue.body = body.to_string();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_write(&self, operation: &str, entity: &str) -> TransportResult<()> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.writes += 1;
        if faults.fail_on_write == Some(faults.writes) {
            return Err(TransportError::new(operation, entity, "injected failure"));
        }
        Ok(())
    }

    fn issue<T>(
        &self,
        operation: &str,
        number: u64,
        f: impl FnOnce(&mut IssueRecord) -> T,
    ) -> TransportResult<T> {
        let mut state = self.lock();
        state
            .issues
            .get_mut(&number)
            .map(f)
            .ok_or_else(|| TransportError::new(operation, format!("issue #{number}"), "not found"))
    }

    fn pull_request<T>(
        &self,
        operation: &str,
        number: u64,
        f: impl FnOnce(&mut PullRequestRecord) -> T,
    ) -> TransportResult<T> {
        let mut state = self.lock();
        state
            .pull_requests
            .get_mut(&number)
            .map(f)
            .ok_or_else(|| {
                TransportError::new(operation, format!("pull request #{number}"), "not found")
            })
    }
}

impl Tracker for MemoryTracker {
    fn issue_body(&self, number: u64) -> TransportResult<String> {
        self.issue("issue_body", number, |i| i.body.clone())
    }

    fn set_issue_body(&self, number: u64, body: &str) -> TransportResult<()> {
        self.check_write("set_issue_body", &format!("issue #{number}"))?;
        self.issue("set_issue_body", number, |i| i.body = body.to_string())
    }

    fn issue_state(&self, number: u64) -> TransportResult<IssueState> {
        self.issue("issue_state", number, |i| i.state)
    }

    fn issue_labels(&self, number: u64) -> TransportResult<Vec<String>> {
        self.issue("issue_labels", number, |i| i.labels.clone())
    }

    fn set_issue_labels(&self, number: u64, labels: &[String]) -> TransportResult<()> {
        self.check_write("set_issue_labels", &format!("issue #{number}"))?;
        self.issue("set_issue_labels", number, |i| i.labels = labels.to_vec())
    }

    fn pr_body(&self, number: u64) -> TransportResult<String> {
        self.pull_request("pr_body", number, |p| p.body.clone())
    }

    fn set_pr_body(&self, number: u64, body: &str) -> TransportResult<()> {
        self.check_write("set_pr_body", &format!("pull request #{number}"))?;
        self.pull_request("set_pr_body", number, |p| p.body = body.to_string())
    }

    fn open_prs_for_id(&self, id: &str) -> TransportResult<Vec<u64>> {
        Ok(self
            .lock()
            .pull_requests
            .iter()
            .filter(|(_, pr)| pr.open && pr.work_item == id)
            .map(|(n, _)| *n)
            .collect())
    }
}
