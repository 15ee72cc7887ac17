//! The owner notification sent after a successful single upload.

use super::stored_file::StoredFile;
use std::path::PathBuf;

/// A file to attach, referenced by its location on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Name shown to the recipient.
    pub filename: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// A fully formed e-mail, consumed exactly once by a `Mailer`.
#[derive(Clone, Debug)]
pub struct NotificationMessage {
    /// `None` when no owner address is configured; sending then fails.
    pub to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<AttachmentRef>,
}

/// Who submitted the upload, as typed into the form.
#[derive(Clone, Debug)]
pub struct Submitter {
    pub name: String,
    pub email: String,
}

impl NotificationMessage {
    /// Build the "new upload" message for the site owner.
    pub fn new_upload(
        owner: Option<&str>,
        site_name: &str,
        submitter: &Submitter,
        file: &StoredFile,
    ) -> Self {
        let size = format_kib(file.size);
        let subject = format!("New Upload - {}", site_name);

        let text = format!(
            "Uploader: {} ({})\nFile: {}\nSize: {} KB",
            submitter.name, submitter.email, file.original_name, size
        );

        let html = format!(
            concat!(
                r#"<div style="font-family: Arial, sans-serif;">"#,
                r#"<h2 style="color: #2c3e50;">{subject}</h2>"#,
                r#"<div style="margin: 20px 0; padding: 15px; background-color: #f8f9fa; border-radius: 5px;">"#,
                r#"<h3 style="color: #34495e;">Uploader Details:</h3>"#,
                r#"<ul><li><strong>Name:</strong> {name}</li>"#,
                r#"<li><strong>Email:</strong> {email}</li></ul>"#,
                r#"<h3 style="color: #34495e;">File Details:</h3>"#,
                r#"<ul><li><strong>Filename:</strong> {filename}</li>"#,
                r#"<li><strong>Size:</strong> {size} KB</li></ul>"#,
                r#"</div></div>"#
            ),
            subject = html_escape(&subject),
            name = html_escape(&submitter.name),
            email = html_escape(&submitter.email),
            filename = html_escape(&file.original_name),
            size = size,
        );

        Self {
            to: owner.map(str::to_string),
            subject,
            text,
            html,
            attachments: vec![AttachmentRef {
                filename: file.original_name.clone(),
                path: file.path.clone(),
                content_type: file.content_type.clone(),
            }],
        }
    }
}

/// Size in KiB with two decimals, e.g. `200.00`.
fn format_kib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1024.0)
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
