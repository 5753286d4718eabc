//! Gather tracker state and compute the writes a pass would make.
//!
//! Nothing in this module writes. [`gather`] only reads; [`build_plan`] is a
//! pure function of the card, the observations and the request.

use super::ReconcileRequest;
use crate::checklist::{propagate, propagate_in_section, PropagateOutcome};
use crate::config::{Config, ManualEditPolicy};
use crate::document::WorkItemDocument;
use crate::error::{CardError, Result};
use crate::hierarchy::{self, SubIssueRelation};
use crate::merge::merge_section;
use crate::section::{Outline, SectionKind};
use crate::status::{self, Authority, Status};
use crate::store::StoredCard;
use crate::tracker::{IssueState, Tracker};
use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Transient copy of the card's tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerIssue {
    pub number: u64,
    pub body: String,
    pub labels: Vec<String>,
    pub state: IssueState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestBody {
    pub number: u64,
    pub body: String,
}

/// The parent card's tracker issue body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentIssue {
    pub id: String,
    pub number: u64,
    pub body: String,
}

/// Everything a pass reads from the tracker before planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Observed {
    pub issue: Option<TrackerIssue>,
    pub open_prs: Vec<u64>,
    pub pull_request: Option<PullRequestBody>,
    pub children: BTreeMap<u64, IssueState>,
    pub parent: Option<ParentIssue>,
}

/// Read the tracker state relevant to `doc`. Reads only.
pub fn gather(
    tracker: &dyn Tracker,
    doc: &WorkItemDocument,
    parent: Option<&WorkItemDocument>,
) -> Result<Observed> {
    let issue = match doc.issue {
        Some(number) => {
            tracing::debug!(id = %doc.id, number, "reading issue");
            Some(TrackerIssue {
                number,
                body: tracker.issue_body(number)?,
                labels: tracker.issue_labels(number)?,
                state: tracker.issue_state(number)?,
            })
        }
        None => None,
    };

    let open_prs = tracker.open_prs_for_id(&doc.id)?;
    let pr_number = match open_prs.as_slice() {
        [only] => Some(*only),
        [] => doc.pull_request,
        _ => None,
    };
    let pull_request = match pr_number {
        Some(number) => {
            tracing::debug!(id = %doc.id, number, "reading pull request");
            Some(PullRequestBody {
                number,
                body: tracker.pr_body(number)?,
            })
        }
        None => None,
    };

    let mut children = BTreeMap::new();
    for number in doc.sub_issues().into_iter().filter_map(|s| s.number) {
        tracing::debug!(id = %doc.id, child = number, "reading child state");
        children.insert(number, tracker.issue_state(number)?);
    }

    let parent = match parent {
        Some(p) => match p.issue {
            Some(number) => Some(ParentIssue {
                id: p.id.clone(),
                number,
                body: tracker.issue_body(number)?,
            }),
            None => None,
        },
        None => None,
    };

    Ok(Observed {
        issue,
        open_prs,
        pull_request,
        children,
        parent,
    })
}

// ---------------------------------------------------------------------------
// PlanStep
// ---------------------------------------------------------------------------

/// One compare-and-swap write. `before` is the value the step was computed
/// against; execution refuses to write if the target no longer holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanStep {
    SetIssueBody {
        number: u64,
        before: String,
        after: String,
    },
    SetIssueLabels {
        number: u64,
        before: Vec<String>,
        after: Vec<String>,
    },
    SetPrBody {
        number: u64,
        before: String,
        after: String,
    },
    WriteDocument {
        id: String,
        before: String,
        after: String,
    },
    ArchiveDocument {
        id: String,
    },
}

impl PlanStep {
    /// The entity the step writes to, as named in errors.
    pub fn entity(&self) -> String {
        match self {
            PlanStep::SetIssueBody { number, .. } | PlanStep::SetIssueLabels { number, .. } => {
                format!("issue #{number}")
            }
            PlanStep::SetPrBody { number, .. } => format!("pull request #{number}"),
            PlanStep::WriteDocument { id, .. } | PlanStep::ArchiveDocument { id } => {
                format!("card {id}")
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PlanStep::SetIssueBody { number, .. } => format!("update body of issue #{number}"),
            PlanStep::SetIssueLabels { number, after, .. } => {
                format!("set labels of issue #{number} to [{}]", after.join(", "))
            }
            PlanStep::SetPrBody { number, .. } => {
                format!("update body of pull request #{number}")
            }
            PlanStep::WriteDocument { id, .. } => format!("write card {id}"),
            PlanStep::ArchiveDocument { id } => format!("archive card {id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: String,
    /// Card revision the plan was computed against.
    pub base_revision: u64,
    pub status_before: Status,
    pub status_after: Status,
    pub sub_issues: Vec<SubIssueRelation>,
    pub notes: Vec<String>,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// True when the pass has nothing to write.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Compute the ordered writes that bring the card, its issue, its pull
/// request and its parent issue into agreement.
pub fn build_plan(
    config: &Config,
    card: &StoredCard,
    observed: &Observed,
    request: &ReconcileRequest,
) -> Result<Plan> {
    let id = card.doc.id.clone();
    let mut doc = card.doc.clone();
    let mut notes = Vec::new();
    let prefix = config.status_label_prefix.as_str();

    // Pull request bookkeeping.
    match observed.open_prs.as_slice() {
        [] => {}
        [number] => {
            if doc.pull_request != Some(*number) {
                notes.push(format!("recording pull request #{number}"));
                doc.pull_request = Some(*number);
            }
        }
        numbers => {
            return Err(CardError::DuplicatePullRequests {
                id,
                numbers: numbers.to_vec(),
            })
        }
    }

    // Drift between the card's status and the tracker label.
    let mut transitioned = false;
    let label_status = observed
        .issue
        .as_ref()
        .and_then(|i| status::status_from_labels(&i.labels, prefix));
    if let Err(drift) = status::check_drift(doc.status, label_status) {
        match (request.authority, label_status) {
            (Some(Authority::Document), _) => {
                notes.push(format!(
                    "tracker says '{}'; label rewritten to the card's '{}'",
                    label_status.map(|s| s.to_string()).unwrap_or_default(),
                    doc.status
                ));
            }
            (Some(Authority::Tracker), Some(tracker_status)) => {
                if let Some(target) = request.target.filter(|t| *t != tracker_status) {
                    return Err(CardError::TransitionBlocked {
                        to: target.to_string(),
                        reason: format!(
                            "the tracker already moves the card to '{tracker_status}' this pass"
                        ),
                    });
                }
                status::advance(&mut doc, tracker_status)?;
                notes.push(format!("card adopts tracker status '{tracker_status}'"));
                transitioned = true;
            }
            _ => return Err(drift),
        }
    }

    // Hierarchy.
    let relations = hierarchy::resolve(&doc, &observed.children);
    let mut issue_body = observed.issue.as_ref().map(|i| i.body.clone());
    if !relations.is_empty() {
        let rendered = hierarchy::render_checklist(&relations);

        if let Some(existing) = doc.section_text(SectionKind::SubIssues) {
            check_manual_edits(config, &format!("card {id}"), &existing, &rendered, &mut notes)?;
        }
        doc.body.merge(SectionKind::SubIssues, &rendered);

        if let (Some(body), Some(issue)) = (issue_body.as_mut(), observed.issue.as_ref()) {
            if let Some(existing) = Outline::parse(body).section_text(SectionKind::SubIssues) {
                let entity = format!("issue #{}", issue.number);
                check_manual_edits(config, &entity, &existing, &rendered, &mut notes)?;
            }
            *body = merge_section(body, SectionKind::SubIssues, &rendered);
        }
    }

    // Completed children tick their Acceptance Checklist lines.
    for relation in relations.iter().filter(|r| r.completed) {
        let Some(number) = relation.child_number else {
            continue;
        };
        let text = doc.body.serialize();
        let card_result =
            propagate_in_section(&text, SectionKind::AcceptanceChecklist, number, true);
        match card_result.outcome {
            PropagateOutcome::Toggled => doc.body = Outline::parse(&card_result.body),
            PropagateOutcome::Unchanged => {}
            PropagateOutcome::ReferenceNotFound => {
                tracing::info!(id = %id, child = number, "no acceptance line references child");
                notes.push(format!(
                    "#{number} is not referenced in the card's Acceptance Checklist"
                ));
            }
        }

        if let Some(body) = issue_body.as_mut() {
            let issue_result =
                propagate_in_section(body, SectionKind::AcceptanceChecklist, number, true);
            if issue_result.outcome == PropagateOutcome::Toggled {
                *body = issue_result.body;
            }
        }
    }

    // At most one transition per pass.
    if let Some(target) = request.target.filter(|_| !transitioned) {
        status::validate_transition(doc.status, target)?;
        check_guard(target, &doc, observed, &relations)?;
        doc.status = target;
    }

    // Pull request body.
    let pr_body = observed.pull_request.as_ref().map(|pr| {
        let mut body = pr.body.clone();
        if !relations.is_empty() {
            body = merge_section(
                &body,
                SectionKind::SubIssuesProgress,
                &hierarchy::render_progress(&relations),
            );
        }
        if let Some(checklist) = doc.section_text(SectionKind::AcceptanceChecklist) {
            body = merge_section(&body, SectionKind::AcceptanceChecklist, &checklist);
        }
        body
    });

    // Upward completion signal into the parent issue. A child counts as
    // complete once its issue is closed, which is also what the parent's own
    // pass renders into its Sub-Issues checklist.
    let child_closed = observed
        .issue
        .as_ref()
        .is_some_and(|i| i.state == IssueState::Closed);
    let mut parent_body = None;
    match (&doc.parent, &observed.parent, doc.issue) {
        (Some(_), Some(parent), Some(number)) if child_closed => {
            let result = propagate(&parent.body, number, true);
            match result.outcome {
                PropagateOutcome::Toggled => parent_body = Some(result.body),
                PropagateOutcome::Unchanged => {}
                PropagateOutcome::ReferenceNotFound => {
                    tracing::info!(id = %id, parent = %parent.id, "parent issue does not reference this card");
                    notes.push(format!(
                        "parent issue #{} does not reference #{number}",
                        parent.number
                    ));
                }
            }
        }
        (Some(parent_id), None, _) => {
            notes.push(format!(
                "parent {parent_id} has no card or no issue; upward propagation skipped"
            ));
        }
        _ => {}
    }

    // Steps, in execution order.
    let mut steps = Vec::new();
    if let Some(issue) = &observed.issue {
        if let Some(after) = issue_body.filter(|b| *b != issue.body) {
            steps.push(PlanStep::SetIssueBody {
                number: issue.number,
                before: issue.body.clone(),
                after,
            });
        }
        if let Some(after) = label_update(&issue.labels, prefix, doc.status) {
            steps.push(PlanStep::SetIssueLabels {
                number: issue.number,
                before: issue.labels.clone(),
                after,
            });
        }
    }
    if let (Some(pr), Some(after)) = (&observed.pull_request, pr_body) {
        if after != pr.body {
            steps.push(PlanStep::SetPrBody {
                number: pr.number,
                before: pr.body.clone(),
                after,
            });
        }
    }
    if let (Some(parent), Some(after)) = (&observed.parent, parent_body) {
        steps.push(PlanStep::SetIssueBody {
            number: parent.number,
            before: parent.body.clone(),
            after,
        });
    }
    if doc != card.doc {
        doc.revision = card.doc.revision + 1;
        steps.push(PlanStep::WriteDocument {
            id: id.clone(),
            before: card.raw.clone(),
            after: doc.serialize(),
        });
    }
    if doc.status == Status::Archived && card.doc.status != Status::Archived {
        steps.push(PlanStep::ArchiveDocument { id: id.clone() });
    }

    Ok(Plan {
        id,
        base_revision: card.doc.revision,
        status_before: card.doc.status,
        status_after: doc.status,
        sub_issues: relations,
        notes,
        steps,
    })
}

fn check_manual_edits(
    config: &Config,
    entity: &str,
    existing: &str,
    rendered: &str,
    notes: &mut Vec<String>,
) -> Result<()> {
    let lines = hierarchy::manual_edits(existing, rendered);
    if lines.is_empty() {
        return Ok(());
    }
    match config.manual_edits {
        ManualEditPolicy::Block => Err(CardError::ManualEditDetected {
            entity: entity.to_string(),
            lines,
        }),
        ManualEditPolicy::Overwrite => {
            tracing::warn!(entity, dropped = lines.len(), "overwriting manual Sub-Issues edits");
            notes.push(format!(
                "Sub-Issues of {entity} regenerated; dropped: {}",
                lines.join(" | ")
            ));
            Ok(())
        }
    }
}

/// The labels to write so the issue carries exactly one status label for
/// `status`, or `None` if it already does.
fn label_update(labels: &[String], prefix: &str, status: Status) -> Option<Vec<String>> {
    let wanted = format!("{prefix}{}", status.label_slug());
    let status_labels: Vec<&String> = labels.iter().filter(|l| l.starts_with(prefix)).collect();
    if status_labels.len() == 1 && *status_labels[0] == wanted {
        return None;
    }
    Some(status::relabel(labels, prefix, status))
}

fn check_guard(
    target: Status,
    doc: &WorkItemDocument,
    observed: &Observed,
    relations: &[SubIssueRelation],
) -> Result<()> {
    let blocked = |reason: &str| {
        Err(CardError::TransitionBlocked {
            to: target.to_string(),
            reason: reason.to_string(),
        })
    };
    match target {
        Status::Ticketed if doc.issue.is_none() => blocked("the card has no Issue number"),
        Status::PrOpen if observed.open_prs.len() != 1 => {
            blocked("no open pull request references the card")
        }
        Status::InReview if doc.pull_request.is_none() => blocked("no pull request is recorded"),
        Status::Merged if !observed.open_prs.is_empty() => {
            blocked("a pull request for the card is still open")
        }
        Status::Merged if !relations.iter().all(|r| r.completed) => {
            blocked("not every sub-issue is complete")
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
