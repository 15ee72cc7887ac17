//! Shared fixtures for the HTTP integration tests.
//!
//! The router is driven in-process with `oneshot`; uploads land in a
//! temporary directory and notifications are captured by `RecordingMailer`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::stream;
use serde_json::Value;
use std::{collections::HashMap, convert::Infallible, path::Path, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use upload_notify::{
    config::{AppConfig, Args},
    models::notification::NotificationMessage,
    routes::routes::app,
    services::mail_service::{DeliveryReceipt, MailError, MailResult, Mailer},
    state::AppState,
};

pub const OWNER: &str = "owner@luzlens.test";
const BOUNDARY: &str = "----upload-notify-test-boundary";

/// Captures every message instead of talking to an SMTP server.
pub struct RecordingMailer {
    tx: mpsc::UnboundedSender<NotificationMessage>,
    fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: NotificationMessage) -> MailResult<DeliveryReceipt> {
        let _ = self.tx.send(message);
        if self.fail {
            return Err(MailError::MissingConfig("MAIL_FROM"));
        }
        Ok(DeliveryReceipt {
            message_id: Some("<test@luzlens.test>".into()),
            response: "250 OK".into(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub dir: TempDir,
    pub sent: mpsc::UnboundedReceiver<NotificationMessage>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(&[], false).await
    }

    /// App whose mailer records the message and then reports a failure.
    pub async fn with_failing_mailer() -> Self {
        Self::build(&[], true).await
    }

    pub async fn with_env(extra: &[(&str, &str)]) -> Self {
        Self::build(extra, false).await
    }

    async fn build(extra: &[(&str, &str)], fail: bool) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let upload_dir = dir.path().join("uploads");

        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("UPLOAD_DIR".into(), upload_dir.display().to_string());
        vars.insert("OWNER_EMAIL".into(), OWNER.into());
        vars.insert("MAX_FILE_SIZE_MB".into(), "1".into());
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        let cfg = AppConfig::from_sources(Args::default(), move |k| vars.get(k).cloned())
            .expect("test config");

        let (tx, sent) = mpsc::unbounded_channel();
        let state = AppState::from_config(&cfg, Arc::new(RecordingMailer { tx, fail }));
        state
            .uploads
            .ensure_storage_dir()
            .await
            .expect("create upload dir");

        Self {
            router: app(state),
            dir,
            sent,
        }
    }

    pub fn upload_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("uploads")
    }

    /// Names currently present in the storage directory.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.upload_dir())
            .expect("read upload dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.send(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn post_form(&self, path: &str, form: MultipartForm) -> Response {
        self.send(form.into_request(path)).await
    }

    /// Wait briefly for the next captured notification.
    pub async fn next_notification(&mut self) -> Option<NotificationMessage> {
        tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, path: &str) -> Request<Body> {
        self.close();
        multipart_request(path, Body::from(self.body))
    }

    /// Same body, delivered in `chunk_size` pieces like a slow client would.
    pub fn into_chunked_request(mut self, path: &str, chunk_size: usize) -> Request<Body> {
        self.close();
        let chunks: Vec<Result<Bytes, Infallible>> = self
            .body
            .chunks(chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        multipart_request(path, Body::from_stream(stream::iter(chunks)))
    }

    /// Ends the body inside a text part that never gets its closing boundary.
    pub fn into_truncated_request(mut self, path: &str, name: &str, partial: &str) -> Request<Body> {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{partial}")
                .as_bytes(),
        );
        multipart_request(path, Body::from(self.body))
    }

    fn close(&mut self) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    }
}

fn multipart_request(path: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .expect("build multipart request")
}

pub async fn read_json(response: Response) -> (StatusCode, HeaderMap, Value) {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

pub async fn read_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub fn assert_security_headers(headers: &HeaderMap) {
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
}

pub fn jpeg(size: usize) -> Vec<u8> {
    let mut bytes = vec![0xAB; size];
    bytes[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    bytes
}

pub fn file_bytes(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("read stored file")
}
