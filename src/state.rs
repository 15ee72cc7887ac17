//! Shared state handed to every handler.

use crate::{
    config::AppConfig,
    services::{mail_service::Mailer, upload_service::UploadService},
};
use axum::http::HeaderValue;
use std::sync::Arc;

/// Where and how owner notifications are addressed.
#[derive(Clone, Debug)]
pub struct NotifySettings {
    pub owner_email: Option<String>,
    pub site_name: String,
}

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub mailer: Arc<dyn Mailer>,
    pub notify: NotifySettings,
    pub allowed_origins: Arc<[HeaderValue]>,
}

impl AppState {
    /// Wire the state from configuration and an already constructed mailer.
    pub fn from_config(cfg: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        let allowed_origins = cfg
            .allowed_origins()
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!("ignoring invalid origin `{}`: {}", origin, err);
                    None
                }
            })
            .collect();

        Self {
            uploads: UploadService::new(
                cfg.upload_dir.clone(),
                cfg.max_file_size_bytes,
                cfg.allowed_mime_types.clone(),
            ),
            mailer,
            notify: NotifySettings {
                owner_email: cfg.owner_email.clone(),
                site_name: cfg.site_name.clone(),
            },
            allowed_origins,
        }
    }
}
