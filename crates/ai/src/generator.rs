use std::time::Duration;

use async_trait::async_trait;

use crate::error::GenerationError;

/// Input for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// The persona's system instruction.
    pub system_instruction: &'a str,
    /// The document text under critique (sent as the user message).
    pub document_text: &'a str,
    /// Per-call deadline the provider should honour.
    pub timeout: Duration,
}

/// The external text-generation capability.
///
/// Implementations perform exactly one outbound call per invocation; retry,
/// backoff and concurrency limits are the caller's concern.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError>;
}
