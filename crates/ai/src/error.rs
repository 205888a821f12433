use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category surfaced to callers for a failed persona.
///
/// Serialized names are part of the observable response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    RateLimited,
    TransientNetworkError,
    InvalidPersonaConfig,
    ContentRejected,
    Timeout,
    /// The task was stopped because every job waiting on it was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Transient kinds are retried with backoff; everything else fails the task immediately.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::TransientNetworkError | ErrorKind::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::TransientNetworkError => "TransientNetworkError",
            ErrorKind::InvalidPersonaConfig => "InvalidPersonaConfig",
            ErrorKind::ContentRejected => "ContentRejected",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by one call to the generation capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("invalid persona configuration: {0}")]
    InvalidPersonaConfig(String),

    #[error("content rejected: {0}")]
    ContentRejected(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::RateLimited(_) => ErrorKind::RateLimited,
            GenerationError::TransientNetwork(_) => ErrorKind::TransientNetworkError,
            GenerationError::InvalidPersonaConfig(_) => ErrorKind::InvalidPersonaConfig,
            GenerationError::ContentRejected(_) => ErrorKind::ContentRejected,
            GenerationError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}
