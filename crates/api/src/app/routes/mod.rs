use axum::{routing::get, Router};

pub mod analyses;
pub mod documents;
pub mod personas;
pub mod system;

/// Router for all API endpoints except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/stats", get(system::stats))
        .nest("/personas", personas::router())
        .nest("/documents", documents::router())
        .nest("/analyses", analyses::router())
}
