//! Response-then-notify plumbing for the single upload endpoint.
//!
//! The notification rides along inside the response body. It is released
//! when the connection drops that body, which happens after the last byte
//! was handed off (or when the client went away). The send then runs as a
//! detached task and its outcome is only logged.

use crate::{
    errors::AppError,
    models::notification::NotificationMessage,
    services::mail_service::Mailer,
};
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

/// A notification waiting for the response to finish.
///
/// Dropping it starts the send.
pub struct PendingNotification {
    mailer: Arc<dyn Mailer>,
    message: Option<NotificationMessage>,
}

impl PendingNotification {
    pub fn new(mailer: Arc<dyn Mailer>, message: NotificationMessage) -> Self {
        Self {
            mailer,
            message: Some(message),
        }
    }

    /// Drop without sending.
    pub fn cancel(mut self) {
        if let Some(message) = self.message.take() {
            warn!(subject = %message.subject, "notification cancelled");
        }
    }
}

impl Drop for PendingNotification {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            spawn_notification(self.mailer.clone(), message);
        }
    }
}

/// Fire-and-forget delivery. Failures are logged, never returned.
pub fn spawn_notification(mailer: Arc<dyn Mailer>, message: NotificationMessage) {
    let Ok(handle) = Handle::try_current() else {
        warn!(subject = %message.subject, "no async runtime available; notification dropped");
        return;
    };

    handle.spawn(async move {
        let label = message
            .attachments
            .first()
            .map(|a| a.filename.clone())
            .unwrap_or_else(|| message.subject.clone());

        match mailer.send(message).await {
            Ok(receipt) => info!(
                message_id = ?receipt.message_id,
                response = %receipt.response,
                "Email sent for {}",
                label
            ),
            Err(err) => error!("Email failed for {}: {}", label, err),
        }
    });
}

/// Serialize `body` as JSON and attach `pending` to the response body.
///
/// If the body cannot be serialized no response goes out, so the
/// notification is cancelled rather than sent.
pub fn respond_then_notify<T: Serialize>(
    status: StatusCode,
    body: &T,
    pending: PendingNotification,
) -> Result<Response, AppError> {
    let json = match serde_json::to_vec(body) {
        Ok(json) => json,
        Err(err) => {
            pending.cancel();
            return Err(AppError::internal(format!("serializing response: {}", err)));
        }
    };
    let len = json.len();

    let stream = stream::iter([Ok::<_, Infallible>(Bytes::from(json))]).map(move |chunk| {
        // Keeps the notification alive exactly as long as the body stream.
        let _pending = &pending;
        chunk
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}
