//! Defines the HTTP surface of the service.
//!
//! ## Structure
//! - `GET  /`                  — liveness text
//! - `POST /upload`            — single file + name/email, notifies the owner
//! - `POST /upload-multiple`   — up to five files under `files`
//! - `GET  /uploads/{file}`    — read-only access to stored files
//! - anything else             — `404 {"error":"Not Found"}`

use crate::{
    errors::panic_response,
    handlers::{
        health_handlers::{not_found, root},
        upload_handlers::{upload_multiple, upload_single},
    },
    models::stored_file::PUBLIC_PREFIX,
    routes::layers::{cors_layer, origin_guard, security_headers},
    services::upload_service::MAX_BATCH_FILES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    middleware,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};

/// Room for text fields and multipart framing on top of the file bytes.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Build the router for the API endpoints only.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload_single))
        .route("/upload-multiple", post(upload_multiple))
}

/// Build the complete application: routes, static files and every layer.
///
/// Layers run outermost first: security headers, tracing, the origin gate,
/// CORS, the panic catcher, then the body limit.
pub fn app(state: AppState) -> Router {
    let static_files =
        ServeDir::new(&state.uploads.base_path).not_found_service(not_found.into_service());

    let body_limit = state
        .uploads
        .max_file_size
        .saturating_mul(MAX_BATCH_FILES as u64)
        .saturating_add(FORM_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let router = routes()
        .nest_service(PUBLIC_PREFIX, static_files)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn_with_state(state.clone(), origin_guard))
        .layer(TraceLayer::new_for_http());

    security_headers(router).with_state(state)
}
