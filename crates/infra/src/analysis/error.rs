//! Submission-level errors.

use thiserror::Error;

use critique_core::{DocumentId, JobId};

use crate::stores::StoreError;

/// Errors that reject a request before any task starts, or address an unknown job.
///
/// Per-persona failures are never reported through this type; they are
/// recorded on the task (`TaskError`) and surface in the job report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("at least one persona must be requested")]
    EmptySelection,

    #[error("persona requested more than once: {0}")]
    DuplicatePersona(String),

    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    #[error("persona is not active: {0}")]
    PersonaInactive(String),

    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("document has no extracted content: {0}")]
    DocumentEmpty(DocumentId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("store error: {0}")]
    Store(String),
}

impl AnalysisError {
    /// Whether the error names something that does not exist (as opposed to a malformed request).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AnalysisError::PersonaNotFound(_)
                | AnalysisError::DocumentNotFound(_)
                | AnalysisError::JobNotFound(_)
        )
    }
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PersonaNotFound(name) => AnalysisError::PersonaNotFound(name),
            StoreError::DocumentNotFound(id) => AnalysisError::DocumentNotFound(id),
            other => AnalysisError::Store(other.to_string()),
        }
    }
}
