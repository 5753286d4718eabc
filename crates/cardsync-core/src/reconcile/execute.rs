//! Run a plan's steps in order, stopping at the first failure.

use super::plan::{Plan, PlanStep};
use super::Cancellation;
use crate::document::WorkItemDocument;
use crate::error::{CardError, ErrorClass, Result};
use crate::paths;
use crate::tracker::Tracker;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed { error: String, class: ErrorClass },
    NotReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub description: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub id: String,
    pub steps: Vec<StepReport>,
    pub cancelled: bool,
}

impl ExecutionReport {
    /// The step that stopped the pass, if any.
    pub fn failure(&self) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
    }

    pub fn succeeded(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Succeeded)
            .count()
    }

    pub fn not_reached(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::NotReached)
            .count()
    }

    /// Every step ran and none failed.
    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.steps.len()
    }
}

pub fn execute_plan(
    root: &Path,
    tracker: &dyn Tracker,
    plan: &Plan,
    cancel: &Cancellation,
) -> ExecutionReport {
    let mut steps = Vec::with_capacity(plan.steps.len());
    let mut stopped = false;
    let mut cancelled = false;

    for (index, step) in plan.steps.iter().enumerate() {
        if !stopped && cancel.is_cancelled() {
            tracing::info!(id = %plan.id, index, "pass cancelled");
            cancelled = true;
            stopped = true;
        }
        let outcome = if stopped {
            StepOutcome::NotReached
        } else {
            match apply(root, tracker, step) {
                Ok(()) => {
                    tracing::info!(id = %plan.id, index, step = %step.describe(), "step succeeded");
                    StepOutcome::Succeeded
                }
                Err(e) => {
                    tracing::warn!(id = %plan.id, index, step = %step.describe(), error = %e, "step failed");
                    stopped = true;
                    StepOutcome::Failed {
                        error: e.to_string(),
                        class: e.class(),
                    }
                }
            }
        };
        steps.push(StepReport {
            index,
            description: step.describe(),
            outcome,
        });
    }

    ExecutionReport {
        id: plan.id.clone(),
        steps,
        cancelled,
    }
}

fn apply(root: &Path, tracker: &dyn Tracker, step: &PlanStep) -> Result<()> {
    let changed = || CardError::ConcurrentEdit {
        entity: step.entity(),
    };
    match step {
        PlanStep::SetIssueBody {
            number,
            before,
            after,
        } => {
            if tracker.issue_body(*number)? != *before {
                return Err(changed());
            }
            tracker.set_issue_body(*number, after)?;
        }
        PlanStep::SetIssueLabels {
            number,
            before,
            after,
        } => {
            if tracker.issue_labels(*number)? != *before {
                return Err(changed());
            }
            tracker.set_issue_labels(*number, after)?;
        }
        PlanStep::SetPrBody {
            number,
            before,
            after,
        } => {
            if tracker.pr_body(*number)? != *before {
                return Err(changed());
            }
            tracker.set_pr_body(*number, after)?;
        }
        PlanStep::WriteDocument { id, before, after } => {
            let path = paths::card_path(root, id);
            let current = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(changed()),
                Err(e) => return Err(e.into()),
            };
            if current != *before {
                return Err(changed());
            }
            crate::io::atomic_write(&path, after.as_bytes())?;
        }
        PlanStep::ArchiveDocument { id } => WorkItemDocument::archive(root, id)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use crate::tracker::{IssueRecord, MemoryTracker, PullRequestRecord};
    use tempfile::TempDir;

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan {
            id: "ARCH-1".to_string(),
            base_revision: 0,
            status_before: Status::Ticketed,
            status_after: Status::Ticketed,
            sub_issues: Vec::new(),
            notes: Vec::new(),
            steps,
        }
    }

    fn three_writes() -> Vec<PlanStep> {
        vec![
            PlanStep::SetIssueBody {
                number: 1,
                before: "old".into(),
                after: "new".into(),
            },
            PlanStep::SetIssueLabels {
                number: 1,
                before: vec![],
                after: vec!["status:ticketed".into()],
            },
            PlanStep::SetPrBody {
                number: 7,
                before: "pr".into(),
                after: "pr2".into(),
            },
        ]
    }

    fn tracker() -> MemoryTracker {
        MemoryTracker::default()
            .with_issue(1, IssueRecord::open("old"))
            .with_pull_request(7, PullRequestRecord::open("ARCH-1", "pr"))
    }

    #[test]
    fn second_write_failure_stops_the_pass() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker();
        tracker.fail_on_write(2);

        let report = execute_plan(dir.path(), &tracker, &plan(three_writes()), &Cancellation::new());
        assert_eq!(report.steps[0].outcome, StepOutcome::Succeeded);
        assert!(matches!(
            report.steps[1].outcome,
            StepOutcome::Failed {
                class: ErrorClass::Transport,
                ..
            }
        ));
        assert_eq!(report.steps[2].outcome, StepOutcome::NotReached);
        assert_eq!(tracker.write_count(), 2);
        assert_eq!(report.failure().unwrap().index, 1);
        assert!(!report.cancelled);
        assert_eq!(tracker.pr_body(7).unwrap(), "pr");
    }

    #[test]
    fn stale_snapshot_is_a_concurrent_edit() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker();
        tracker.edit_issue_body(1, "edited by hand");

        let report = execute_plan(dir.path(), &tracker, &plan(three_writes()), &Cancellation::new());
        match &report.steps[0].outcome {
            StepOutcome::Failed { error, class } => {
                assert_eq!(*class, ErrorClass::Busy);
                assert!(error.contains("issue #1"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(tracker.issue_body(1).unwrap(), "edited by hand");
        assert_eq!(report.not_reached(), 2);
    }

    #[test]
    fn cancelled_before_start_reaches_nothing() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker();
        let cancel = Cancellation::new();
        cancel.cancel();

        let report = execute_plan(dir.path(), &tracker, &plan(three_writes()), &cancel);
        assert!(report.cancelled);
        assert_eq!(report.not_reached(), 3);
        assert_eq!(tracker.write_count(), 0);
    }

    #[test]
    fn document_write_checks_the_file_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = paths::card_path(dir.path(), "ARCH-1");
        crate::io::atomic_write(&path, b"on disk").unwrap();
        let tracker = MemoryTracker::default();

        let write = |before: &str| {
            plan(vec![PlanStep::WriteDocument {
                id: "ARCH-1".into(),
                before: before.into(),
                after: "updated".into(),
            }])
        };

        let stale = execute_plan(dir.path(), &tracker, &write("something else"), &Cancellation::new());
        assert!(stale.failure().is_some());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "on disk");

        let fresh = execute_plan(dir.path(), &tracker, &write("on disk"), &Cancellation::new());
        assert!(fresh.is_complete());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "updated");
    }
}
