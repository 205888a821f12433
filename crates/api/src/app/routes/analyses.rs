use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_analysis))
        .route("/:id", get(get_analysis).delete(cancel_analysis))
        .route("/:id/events", get(analysis_events))
}

/// POST /analyses: accepted immediately, results are polled or streamed.
pub async fn submit_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SubmitAnalysisRequest>,
) -> axum::response::Response {
    let document_id = match dto::parse_document_id(&body.document_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .analysis
        .submit_analysis(document_id, &body.personas)
        .await
    {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(dto::JobAcceptedResponse { job_id })).into_response(),
        Err(e) => errors::analysis_error_to_response(e),
    }
}

/// GET /analyses/:id: status plus per-persona results in request order.
pub async fn get_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match dto::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.analysis.get_job_status(job_id) {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::analysis_error_to_response(e),
    }
}

/// DELETE /analyses/:id: cancel; a finished job is left as is.
pub async fn cancel_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match dto::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.analysis.cancel_job(job_id) {
        Ok(status) => Json(dto::CancelJobResponse { job_id, status }).into_response(),
        Err(e) => errors::analysis_error_to_response(e),
    }
}

/// GET /analyses/:id/events: server-sent events until the job finishes.
pub async fn analysis_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match dto::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if !services.analysis.job_exists(job_id) {
        return errors::analysis_error_to_response(
            critique_infra::analysis::AnalysisError::JobNotFound(job_id),
        );
    }
    services::job_sse_stream(services, job_id).into_response()
}
