//! Root liveness text and the not-found fallback.

use crate::errors::AppError;

/// `GET /`
///
/// Plain-text liveness answer. Performs no I/O.
pub async fn root() -> &'static str {
    "Backend is running"
}

/// Fallback for every unmatched route and missing static file.
pub async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}
