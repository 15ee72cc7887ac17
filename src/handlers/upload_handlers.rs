//! HTTP handlers for the upload endpoints.
//! Parsing and storage are delegated to `UploadService`; the single upload
//! path also hands an owner notification to the mailer once it has answered.

use crate::{
    errors::AppError,
    models::{
        notification::{NotificationMessage, Submitter},
        upload::{BatchFile, BatchUploadResponse, UploadResponse, UploadedFile},
    },
    services::{
        notification_service::{PendingNotification, respond_then_notify},
        upload_service::{FileField, MAX_BATCH_FILES},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::Response,
};
use tracing::info;

const SINGLE_FILE: FileField = FileField::single("file");
const BATCH_FILES: FileField = FileField::array("files", MAX_BATCH_FILES);

/// `POST /upload` — one file plus the submitter's name and e-mail.
///
/// The file is already on disk when the field checks run, so a request
/// rejected for a missing name or e-mail leaves its file behind.
pub async fn upload_single(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let parsed = state.uploads.accept(multipart?, SINGLE_FILE).await?;

    if let Some(rejection) = &parsed.rejection {
        return Err(AppError::bad_request(rejection.to_string()));
    }

    let (Some(name), Some(email)) = (parsed.field("name"), parsed.field("email")) else {
        return Err(AppError::bad_request("Name and email are required"));
    };

    let Some(file) = parsed.files.first() else {
        return Err(AppError::bad_request("Please upload a file"));
    };

    info!(
        filename = %file.filename,
        original = %file.original_name,
        size = file.size,
        "accepted upload"
    );

    let body = UploadResponse {
        message: "File uploaded successfully",
        file: UploadedFile::from(file),
    };

    let submitter = Submitter {
        name: name.to_string(),
        email: email.to_string(),
    };
    let message = NotificationMessage::new_upload(
        state.notify.owner_email.as_deref(),
        &state.notify.site_name,
        &submitter,
        file,
    );

    respond_then_notify(
        StatusCode::OK,
        &body,
        PendingNotification::new(state.mailer.clone(), message),
    )
}

/// `POST /upload-multiple` — up to `MAX_BATCH_FILES` files, no notification.
pub async fn upload_multiple(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchUploadResponse>, AppError> {
    let parsed = state.uploads.accept(multipart?, BATCH_FILES).await?;

    if let Some(rejection) = &parsed.rejection {
        return Err(AppError::bad_request(rejection.to_string()));
    }

    if parsed.files.is_empty() {
        return Err(AppError::bad_request("Please upload at least one file"));
    }

    info!(count = parsed.files.len(), "accepted batch upload");

    Ok(Json(BatchUploadResponse {
        message: "Files uploaded successfully",
        files: parsed.files.iter().map(BatchFile::from).collect(),
    }))
}
