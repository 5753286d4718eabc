use serde::Serialize;
use thiserror::Error;

/// A failed call against the external tracker. The engine never retries;
/// the operation and entity are kept so the caller can re-run safely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} on {entity} failed: {message}")]
pub struct TransportError {
    pub operation: String,
    pub entity: String,
    pub message: String,
}

impl TransportError {
    pub fn new(
        operation: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity: entity.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CardError {
    #[error("not initialized: run 'cardsync init'")]
    NotInitialized,

    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("card already exists: {0}")]
    CardExists(String),

    #[error("card {0} is archived and read-only")]
    Archived(String),

    #[error("malformed document: {reason}")]
    MalformedDocument { reason: String },

    #[error("invalid transition from '{from}' to '{to}': allowed next status is '{allowed}'")]
    InvalidTransition {
        from: String,
        to: String,
        allowed: String,
    },

    #[error("transition to '{to}' blocked: {reason}")]
    TransitionBlocked { to: String, reason: String },

    #[error(
        "status drift: document says '{document}' but tracker says '{tracker}'; \
         rerun with an explicit authority (document or tracker)"
    )]
    StatusDrift { document: String, tracker: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("reconciliation already in progress for {0}")]
    Locked(String),

    #[error("{entity} changed since the plan was computed; re-run the pass")]
    ConcurrentEdit { entity: String },

    #[error("more than one open pull request for {id}: {numbers:?}")]
    DuplicatePullRequests { id: String, numbers: Vec<u64> },

    #[error("manual edits in the Sub-Issues section of {entity}: {lines:?}")]
    ManualEditDetected { entity: String, lines: Vec<String> },

    #[error("no sub-issue tagged '{tag}' in {id}")]
    UnknownSubIssue { id: String, tag: String },

    #[error("invalid lane '{lane}': expected one of {allowed:?}")]
    InvalidLane { lane: String, allowed: Vec<String> },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the CLI to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    Transport,
    Drift,
    Busy,
    Other,
}

impl CardError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CardError::MalformedDocument {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CardError::CardNotFound(_)
            | CardError::CardExists(_)
            | CardError::Archived(_)
            | CardError::MalformedDocument { .. }
            | CardError::InvalidTransition { .. }
            | CardError::TransitionBlocked { .. }
            | CardError::DuplicatePullRequests { .. }
            | CardError::ManualEditDetected { .. }
            | CardError::UnknownSubIssue { .. }
            | CardError::InvalidLane { .. }
            | CardError::InvalidStatus(_) => ErrorClass::Validation,
            CardError::Transport(_) => ErrorClass::Transport,
            CardError::StatusDrift { .. } => ErrorClass::Drift,
            CardError::Locked(_) | CardError::ConcurrentEdit { .. } => ErrorClass::Busy,
            CardError::NotInitialized
            | CardError::Io(_)
            | CardError::Yaml(_)
            | CardError::Json(_) => ErrorClass::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CardError>;
