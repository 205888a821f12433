use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", post(create_document))
}

/// POST /documents: register already-extracted text.
pub async fn create_document(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateDocumentRequest>,
) -> axum::response::Response {
    match services.documents.insert(body.text) {
        Ok(document_id) => (
            StatusCode::CREATED,
            Json(dto::DocumentCreatedResponse { document_id }),
        )
            .into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}
