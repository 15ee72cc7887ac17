//! Cross-cutting HTTP layers: security headers and the cross-origin policy.

use crate::{errors::AppError, state::AppState};
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};

static X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");

/// Stamp the fixed security headers on every response, errors included.
pub fn security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_XSS_PROTECTION.clone(),
            HeaderValue::from_static("1; mode=block"),
        ))
}

/// Credentialed GET/POST with `content-type` for allow-listed origins.
pub fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins.to_vec())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Reject browser requests from origins outside the allow-list.
///
/// Requests without an `Origin` header (curl, server-to-server) pass.
pub async fn origin_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        if !state.allowed_origins.iter().any(|allowed| allowed == origin) {
            tracing::warn!(origin = ?origin, "Blocked by CORS");
            return AppError::forbidden("Not allowed by CORS").into_response();
        }
    }
    next.run(request).await
}
