use crate::document::WorkItemDocument;
use crate::error::{CardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Draft,
    Ticketed,
    Branched,
    PrOpen,
    InReview,
    Merged,
    Archived,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[
            Status::Draft,
            Status::Ticketed,
            Status::Branched,
            Status::PrOpen,
            Status::InReview,
            Status::Merged,
            Status::Archived,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Status> {
        Status::all().get(self.index() + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == Status::Archived
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Draft => "Draft",
            Status::Ticketed => "Ticketed",
            Status::Branched => "Branched",
            Status::PrOpen => "PR Open",
            Status::InReview => "In Review",
            Status::Merged => "Merged",
            Status::Archived => "Archived",
        }
    }

    /// Form used in tracker labels, e.g. `in-review`.
    pub fn label_slug(self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Ticketed => "ticketed",
            Status::Branched => "branched",
            Status::PrOpen => "pr-open",
            Status::InReview => "in-review",
            Status::Merged => "merged",
            Status::Archived => "archived",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = CardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        Status::all()
            .iter()
            .copied()
            .find(|st| st.label_slug() == normalized)
            .ok_or_else(|| CardError::InvalidStatus(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Check that `target` is exactly the next status after `from`.
pub fn validate_transition(from: Status, target: Status) -> Result<()> {
    match from.next() {
        Some(next) if next == target => Ok(()),
        next => Err(CardError::InvalidTransition {
            from: from.to_string(),
            to: target.to_string(),
            allowed: next.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
        }),
    }
}

/// Move `doc` one step forward to `target`.
pub fn advance(doc: &mut WorkItemDocument, target: Status) -> Result<()> {
    validate_transition(doc.status, target)?;
    doc.status = target;
    Ok(())
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// Which side wins when the card and the tracker disagree about status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Document,
    Tracker,
}

impl std::str::FromStr for Authority {
    type Err = CardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "document" | "doc" => Ok(Authority::Document),
            "tracker" => Ok(Authority::Tracker),
            _ => Err(CardError::InvalidStatus(format!(
                "unknown authority '{s}' (expected 'document' or 'tracker')"
            ))),
        }
    }
}

pub fn check_drift(recorded: Status, observed: Option<Status>) -> Result<()> {
    match observed {
        Some(observed) if observed != recorded => Err(CardError::StatusDrift {
            document: recorded.to_string(),
            tracker: observed.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Read the status carried by tracker labels of the form `<prefix><slug>`.
/// The first parseable label wins.
pub fn status_from_labels(labels: &[String], prefix: &str) -> Option<Status> {
    labels
        .iter()
        .filter_map(|l| l.strip_prefix(prefix))
        .find_map(|slug| slug.parse().ok())
}

/// Replace every `<prefix>*` label with the one for `status`, keeping the rest in order.
pub fn relabel(labels: &[String], prefix: &str, status: Status) -> Vec<String> {
    let mut out: Vec<String> = labels
        .iter()
        .filter(|l| !l.starts_with(prefix))
        .cloned()
        .collect();
    out.push(format!("{prefix}{}", status.label_slug()));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
