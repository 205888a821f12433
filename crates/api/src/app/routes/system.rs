use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /stats: worker pool counters.
pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.analysis.stats())
}
