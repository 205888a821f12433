use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use critique_core::{DocumentId, JobId, Persona, PersonaId, PersonaTraits};
use critique_infra::analysis::{JobStatus, PersonaSelection};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnalysisRequest {
    pub document_id: String,
    /// `"A"`, `"A,B"` or `["A", "B"]`.
    pub personas: PersonaSelection,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct DocumentCreatedResponse {
    pub document_id: DocumentId,
}

#[derive(Debug, Serialize)]
pub struct JobAcceptedResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct PersonaView {
    pub id: PersonaId,
    pub name: String,
    pub description: Option<String>,
    pub traits: PersonaTraits,
    pub is_active: bool,
}

impl From<Persona> for PersonaView {
    fn from(p: Persona) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            traits: p.traits,
            is_active: p.is_active,
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_document_id(s: &str) -> Result<DocumentId, axum::response::Response> {
    s.trim()
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid document id"))
}

pub fn parse_job_id(s: &str) -> Result<JobId, axum::response::Response> {
    s.trim()
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"))
}
