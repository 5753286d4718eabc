//! Process exit codes.
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | anything else (I/O, config) |
//! | 2 | validation failure |
//! | 3 | transport failure |
//! | 4 | status drift without an authority |
//! | 5 | busy: card locked or edited concurrently |

use cardsync_core::error::{CardError, ErrorClass};

pub const OTHER: i32 = 1;
pub const VALIDATION: i32 = 2;
pub const TRANSPORT: i32 = 3;
pub const DRIFT: i32 = 4;
pub const BUSY: i32 = 5;

/// An executed pass stopped at a failed step. The report has already
/// been printed; this only carries the failure out to the exit code.
#[derive(Debug, thiserror::Error)]
#[error("step {index} ({description}) failed: {error}")]
pub struct StepFailed {
    pub index: usize,
    pub description: String,
    pub error: String,
    pub class: ErrorClass,
}

pub fn for_class(class: ErrorClass) -> i32 {
    match class {
        ErrorClass::Validation => VALIDATION,
        ErrorClass::Transport => TRANSPORT,
        ErrorClass::Drift => DRIFT,
        ErrorClass::Busy => BUSY,
        ErrorClass::Other => OTHER,
    }
}

pub fn code(err: &anyhow::Error) -> i32 {
    if let Some(failed) = err.downcast_ref::<StepFailed>() {
        return for_class(failed.class);
    }
    err.chain()
        .find_map(|e| e.downcast_ref::<CardError>())
        .map(|e| for_class(e.class()))
        .unwrap_or(OTHER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use cardsync_core::TransportError;

    #[test]
    fn classes_survive_context() {
        let err: Result<(), CardError> = Err(CardError::Locked("ARCH-1".into()));
        let err = err.context("reconciling ARCH-1").unwrap_err();
        assert_eq!(code(&err), BUSY);

        let err = anyhow::Error::from(CardError::from(TransportError::new("a", "b", "c")));
        assert_eq!(code(&err), TRANSPORT);

        assert_eq!(code(&anyhow::anyhow!("plain")), OTHER);
    }

    #[test]
    fn failed_step_uses_its_class() {
        let err = anyhow::Error::new(StepFailed {
            index: 1,
            description: "write card ARCH-1".into(),
            error: "card ARCH-1 changed".into(),
            class: ErrorClass::Busy,
        });
        assert_eq!(code(&err), BUSY);
    }
}
