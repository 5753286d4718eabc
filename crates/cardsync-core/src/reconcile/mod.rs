//! Reconciliation passes over a single card.
//!
//! A pass runs in three phases:
//! 1. Gather: read the card and everything the tracker knows about it.
//! 2. Plan: compute the ordered compare-and-swap writes.
//! 3. Execute: only in [`Mode::Execute`], apply the writes in order.
//!
//! The card's lock (and its parent's, when it has one) is held for the
//! whole pass.

mod execute;
mod plan;

pub use execute::{execute_plan, ExecutionReport, StepOutcome, StepReport};
pub use plan::{
    build_plan, gather, Observed, ParentIssue, Plan, PlanStep, PullRequestBody, TrackerIssue,
};

use crate::config::Config;
use crate::document::WorkItemDocument;
use crate::error::{CardError, Result};
use crate::lock::CardLock;
use crate::status::{Authority, Status};
use crate::tracker::Tracker;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compute and return the plan; write nothing.
    Plan,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub id: String,
    /// The one status transition to attempt this pass.
    pub target: Option<Status>,
    /// Drift resolution, when the caller has chosen one.
    pub authority: Option<Authority>,
}

impl ReconcileRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: None,
            authority: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassOutcome {
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExecutionReport>,
}

/// Cooperative cancellation, checked before each step.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    root: PathBuf,
    config: &'a Config,
    tracker: &'a dyn Tracker,
}

impl<'a> Reconciler<'a> {
    pub fn new(root: impl Into<PathBuf>, config: &'a Config, tracker: &'a dyn Tracker) -> Self {
        Self {
            root: root.into(),
            config,
            tracker,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run(
        &self,
        request: &ReconcileRequest,
        mode: Mode,
        cancel: &Cancellation,
    ) -> Result<PassOutcome> {
        let _lock = CardLock::acquire(&self.root, &request.id)?;
        let card = WorkItemDocument::load_stored(&self.root, &request.id)?;
        if card.archived {
            return Err(CardError::Archived(request.id.clone()));
        }
        self.config.validate_lane(&card.doc.lane)?;
        tracing::info!(id = %request.id, status = %card.doc.status, ?mode, "reconciling");

        let _parent_lock = match &card.doc.parent {
            Some(parent) => Some(CardLock::acquire(&self.root, parent)?),
            None => None,
        };
        let parent = match &card.doc.parent {
            Some(parent) => match WorkItemDocument::load(&self.root, parent) {
                Ok(doc) => Some(doc),
                Err(CardError::CardNotFound(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let observed = gather(self.tracker, &card.doc, parent.as_ref())?;
        let plan = build_plan(self.config, &card, &observed, request)?;
        tracing::info!(
            id = %plan.id,
            steps = plan.steps.len(),
            notes = plan.notes.len(),
            status = %plan.status_after,
            "plan computed"
        );

        let report = match mode {
            Mode::Plan => None,
            Mode::Execute => Some(execute_plan(&self.root, self.tracker, &plan, cancel)),
        };
        Ok(PassOutcome { plan, report })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths;
    use crate::tracker::{IssueRecord, IssueState, MemoryTracker, PullRequestRecord};
    use tempfile::TempDir;

    const CARD: &str = "\
---
ID: ARCH-1
lane: architecture
status: Ticketed
Issue: #10
---
# ARCH-1: Parser

## Acceptance Checklist

- [ ] #11 lexer - tokens
- [ ] #12 parser - ast

## Sub-Issues

- [ ] #11 ARCH-1a - Lexer
- [ ] #12 ARCH-1b - Parser
";

    const CHILD: &str = "\
---
ID: ARCH-1a
lane: architecture
status: Merged
Issue: #11
Parent: ARCH-1
---
# ARCH-1a: Lexer
";

    fn setup(card: &str) -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        crate::io::atomic_write(&paths::card_path(dir.path(), "ARCH-1"), card.as_bytes())
            .unwrap();
        (dir, Config::new("test"))
    }

    fn labelled(body: &str, label: &str) -> IssueRecord {
        IssueRecord {
            labels: vec![label.to_string()],
            ..IssueRecord::open(body)
        }
    }

    fn tracker() -> MemoryTracker {
        MemoryTracker::default()
            .with_issue(10, labelled("Tracking.\n", "status:ticketed"))
            .with_issue(11, IssueRecord::closed())
            .with_issue(12, IssueRecord::open(""))
    }

    fn read_card(dir: &TempDir) -> String {
        std::fs::read_to_string(paths::card_path(dir.path(), "ARCH-1")).unwrap()
    }

    #[test]
    fn plan_mode_writes_nothing() {
        let (dir, config) = setup(CARD);
        let tracker = tracker();
        let outcome = Reconciler::new(dir.path(), &config, &tracker)
            .run(&ReconcileRequest::new("ARCH-1"), Mode::Plan, &Cancellation::new())
            .unwrap();

        assert!(!outcome.plan.is_empty());
        assert!(outcome.report.is_none());
        assert_eq!(tracker.write_count(), 0);
        assert_eq!(read_card(&dir), CARD);
        CardLock::acquire(dir.path(), "ARCH-1").unwrap();
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (dir, config) = setup(CARD);
        let tracker = tracker();
        let reconciler = Reconciler::new(dir.path(), &config, &tracker);
        let request = ReconcileRequest::new("ARCH-1");

        let first = reconciler
            .run(&request, Mode::Execute, &Cancellation::new())
            .unwrap();
        assert!(first.report.unwrap().is_complete());
        let card_after_first = read_card(&dir);
        let issue_after_first = tracker.issue_body(10).unwrap();
        assert!(card_after_first.contains("Revision: 1\n"));
        assert!(card_after_first.contains("- [x] #11 lexer - tokens\n"));
        assert!(issue_after_first.contains("## Sub-Issues\n\n- [x] #11 ARCH-1a - Lexer\n"));

        let writes = tracker.write_count();
        let second = reconciler
            .run(&request, Mode::Execute, &Cancellation::new())
            .unwrap();
        assert!(second.plan.is_empty());
        assert_eq!(tracker.write_count(), writes);
        assert_eq!(read_card(&dir), card_after_first);
        assert_eq!(tracker.issue_body(10).unwrap(), issue_after_first);
    }

    #[test]
    fn parent_and_child_passes_settle() {
        for child_state in [IssueState::Open, IssueState::Closed] {
            let (dir, config) = setup(CARD);
            crate::io::atomic_write(&paths::card_path(dir.path(), "ARCH-1a"), CHILD.as_bytes())
                .unwrap();
            let tracker = MemoryTracker::default()
                .with_issue(10, labelled("Tracking.\n", "status:ticketed"))
                .with_issue(
                    11,
                    IssueRecord {
                        state: child_state,
                        ..labelled("", "status:merged")
                    },
                )
                .with_issue(12, IssueRecord::open(""));
            let reconciler = Reconciler::new(dir.path(), &config, &tracker);
            let parent = ReconcileRequest::new("ARCH-1");
            let child = ReconcileRequest::new("ARCH-1a");

            for request in [&parent, &child, &parent, &child] {
                reconciler
                    .run(request, Mode::Execute, &Cancellation::new())
                    .unwrap();
            }
            for request in [&parent, &child] {
                let outcome = reconciler
                    .run(request, Mode::Plan, &Cancellation::new())
                    .unwrap();
                assert!(
                    outcome.plan.is_empty(),
                    "{child_state:?}: {} still plans {:?}",
                    request.id,
                    outcome.plan.steps
                );
            }
            let ticked = tracker
                .issue_body(10)
                .unwrap()
                .contains("- [x] #11 ARCH-1a - Lexer\n");
            assert_eq!(ticked, child_state == IssueState::Closed);
        }
    }

    #[test]
    fn transport_failure_reports_the_full_plan() {
        let (dir, config) = setup(CARD);
        let tracker = tracker().with_pull_request(30, PullRequestRecord::open("ARCH-1", ""));
        tracker.fail_on_write(2);

        let outcome = Reconciler::new(dir.path(), &config, &tracker)
            .run(
                &ReconcileRequest {
                    target: Some(Status::Branched),
                    ..ReconcileRequest::new("ARCH-1")
                },
                Mode::Execute,
                &Cancellation::new(),
            )
            .unwrap();
        let report = outcome.report.unwrap();
        let outcomes: Vec<&StepOutcome> = report.steps.iter().map(|s| &s.outcome).collect();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(*outcomes[0], StepOutcome::Succeeded);
        assert!(matches!(outcomes[1], StepOutcome::Failed { .. }));
        assert_eq!(*outcomes[2], StepOutcome::NotReached);
        assert_eq!(*outcomes[3], StepOutcome::NotReached);
        assert_eq!(read_card(&dir), CARD);
    }

    #[test]
    fn cancelled_pass_reports_every_step_not_reached() {
        let (dir, config) = setup(CARD);
        let tracker = tracker();
        let cancel = Cancellation::new();
        cancel.clone().cancel();

        let outcome = Reconciler::new(dir.path(), &config, &tracker)
            .run(&ReconcileRequest::new("ARCH-1"), Mode::Execute, &cancel)
            .unwrap();
        let report = outcome.report.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.not_reached(), outcome.plan.steps.len());
        assert_eq!(tracker.write_count(), 0);
    }

    #[test]
    fn held_lock_makes_the_pass_busy() {
        let (dir, config) = setup(CARD);
        let tracker = tracker();
        let _held = CardLock::acquire(dir.path(), "ARCH-1").unwrap();
        let err = Reconciler::new(dir.path(), &config, &tracker)
            .run(&ReconcileRequest::new("ARCH-1"), Mode::Plan, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, CardError::Locked(_)));
    }

    #[test]
    fn unknown_lane_is_rejected() {
        let (dir, config) = setup(&CARD.replace("lane: architecture", "lane: marketing"));
        let tracker = tracker();
        let err = Reconciler::new(dir.path(), &config, &tracker)
            .run(&ReconcileRequest::new("ARCH-1"), Mode::Plan, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, CardError::InvalidLane { .. }));
    }

    #[test]
    fn hand_edit_between_plan_and_execute_is_detected() {
        let (dir, config) = setup(CARD);
        let tracker = tracker();
        let card = WorkItemDocument::load_stored(dir.path(), "ARCH-1").unwrap();
        let observed = gather(&tracker, &card.doc, None).unwrap();
        let plan = build_plan(&config, &card, &observed, &ReconcileRequest::new("ARCH-1")).unwrap();

        let edited = CARD.replace("# ARCH-1: Parser", "# ARCH-1: Parser rewrite");
        std::fs::write(paths::card_path(dir.path(), "ARCH-1"), &edited).unwrap();

        let report = execute_plan(dir.path(), &tracker, &plan, &Cancellation::new());
        let failure = report.failure().unwrap();
        assert!(matches!(
            failure.outcome,
            StepOutcome::Failed {
                class: crate::error::ErrorClass::Busy,
                ..
            }
        ));
        assert_eq!(read_card(&dir), edited);
    }

    #[test]
    fn archived_card_is_read_only() {
        let (dir, config) = setup(CARD);
        WorkItemDocument::archive(dir.path(), "ARCH-1").unwrap();
        let tracker = tracker();
        let err = Reconciler::new(dir.path(), &config, &tracker)
            .run(&ReconcileRequest::new("ARCH-1"), Mode::Plan, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, CardError::Archived(_)));
    }
}
