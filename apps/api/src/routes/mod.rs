pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::resumes::handlers;
use crate::state::AppState;

/// Room for the text fields and multipart framing around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.resumes.limits().max_file_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/resumes",
            get(handlers::handle_list)
                .post(handlers::handle_create)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/v1/resumes/:id",
            patch(handlers::handle_rename).delete(handlers::handle_delete),
        )
        .route(
            "/api/v1/resumes/:id/download",
            get(handlers::handle_download),
        )
        .route(
            "/api/v1/resumes/:id/preview",
            post(handlers::handle_refresh_preview),
        )
        .with_state(state)
}
