use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use critique_infra::analysis::AnalysisError;

pub fn analysis_error_to_response(err: AnalysisError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        AnalysisError::EmptySelection => json_error(StatusCode::BAD_REQUEST, "empty_selection", message),
        AnalysisError::DuplicatePersona(_) => {
            json_error(StatusCode::BAD_REQUEST, "duplicate_persona", message)
        }
        AnalysisError::PersonaInactive(_) => {
            json_error(StatusCode::BAD_REQUEST, "persona_inactive", message)
        }
        AnalysisError::DocumentEmpty(_) => json_error(StatusCode::BAD_REQUEST, "document_empty", message),
        AnalysisError::PersonaNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "persona_not_found", message)
        }
        AnalysisError::DocumentNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "document_not_found", message)
        }
        AnalysisError::JobNotFound(_) => json_error(StatusCode::NOT_FOUND, "job_not_found", message),
        AnalysisError::Store(_) => {
            tracing::error!(error = %message, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
