//! Typed error taxonomy for the verification runtime.
//!
//! `ProjectNotFound` is the one benign variant: it signals that a revision
//! lookup missed because the history was reset while an operation was in
//! flight. It is always caught at the boundary nearest its origin and never
//! surfaced to the user. Everything else is a real failure.

use crucible_common::UnexpectedStep;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A revision lookup missed. Expected whenever the history was cleared
    /// or reset concurrently with an in-flight poll; callers swallow this
    /// and abort the operation silently.
    #[error("Could not find project having revision {revision}")]
    ProjectNotFound { revision: i64 },

    /// The source encoder found no `mod <name>` declaration to derive a
    /// project name from.
    #[error("Could not find module name.")]
    InvalidModuleName,

    /// A stored source could not be base64-decoded.
    #[error("Could not decode project source: {0}")]
    InvalidEncodedSource(#[from] base64::DecodeError),

    /// An unrecognized step reached a dispatch site. Fatal to the calling
    /// operation, never recovered.
    #[error(transparent)]
    UnexpectedStep(#[from] UnexpectedStep),

    /// The remote service could not be reached or returned a non-JSON body.
    #[error("Request to the verification service failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RuntimeError {
    /// True for the benign concurrent-reset signal.
    pub fn is_project_not_found(&self) -> bool {
        matches!(self, RuntimeError::ProjectNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_not_found_carries_revision() {
        let err = RuntimeError::ProjectNotFound { revision: 42 };
        assert!(err.is_project_not_found());
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn unexpected_step_converts_transparently() {
        let err: RuntimeError = UnexpectedStep::new("staticAnalysis").into();
        assert!(!err.is_project_not_found());
        match &err {
            RuntimeError::UnexpectedStep(inner) => assert_eq!(inner.step, "staticAnalysis"),
            _ => panic!("Expected UnexpectedStep variant"),
        }
    }

    #[test]
    fn all_variants_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&RuntimeError::InvalidModuleName);
        assert_std_error(&RuntimeError::ProjectNotFound { revision: 1 });
    }
}
