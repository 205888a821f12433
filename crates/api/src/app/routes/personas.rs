use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};

use crate::app::dto::PersonaView;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(list_personas))
}

pub async fn list_personas(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.analysis.list_personas().await {
        Ok(personas) => {
            Json(personas.into_iter().map(PersonaView::from).collect::<Vec<_>>()).into_response()
        }
        Err(e) => errors::analysis_error_to_response(e),
    }
}
