//! src/services/upload_service.rs
//!
//! UploadService — reads multipart bodies, enforces the file count, size and
//! media-type rules, and streams accepted files into one flat storage
//! directory. Rejections are returned as values inside `ParsedUpload`; only
//! transport and disk faults are errors.

use crate::models::stored_file::StoredFile;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use chrono::Utc;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on files accepted by the batch endpoint.
pub const MAX_BATCH_FILES: usize = 5;

const MAX_EXTENSION_LEN: usize = 10;
const MAX_NAME_ATTEMPTS: usize = 8;
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Types a browser would render or execute when served from our origin.
/// Files of these types are stored without an extension so they come back
/// as `application/octet-stream`.
const ACTIVE_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "image/svg+xml",
    "text/xml",
    "application/xml",
    "text/javascript",
    "application/javascript",
];

/// Request-level rejection produced by the validator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("File type `{0}` is not allowed")]
    DisallowedType(String),
    #[error("File too large. Maximum size is {limit_mb} MB")]
    TooLarge { limit_mb: u64 },
    #[error("Too many files. A maximum of {0} files is allowed")]
    TooManyFiles(usize),
    #[error("Unexpected field `{0}`")]
    UnexpectedField(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Which multipart field carries files, and how many it may carry.
#[derive(Clone, Copy, Debug)]
pub struct FileField {
    pub name: &'static str,
    pub max_count: usize,
}

impl FileField {
    pub const fn single(name: &'static str) -> Self {
        Self { name, max_count: 1 }
    }

    pub const fn array(name: &'static str, max_count: usize) -> Self {
        Self { name, max_count }
    }
}

/// Everything the validator learned about one request.
#[derive(Debug, Default)]
pub struct ParsedUpload {
    /// Text parts, last value wins.
    pub fields: HashMap<String, String>,
    /// Accepted files in upload order. Empty when `rejection` is set.
    pub files: Vec<StoredFile>,
    pub rejection: Option<UploadRejection>,
}

impl ParsedUpload {
    /// Text field value, `None` when missing or blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

enum Stored {
    File(StoredFile),
    TooLarge,
}

/// Validates and stores multipart uploads.
///
/// Cheap to clone; every request shares the same directory and limits.
#[derive(Clone, Debug)]
pub struct UploadService {
    /// Directory every accepted file is written to.
    pub base_path: PathBuf,

    /// Per-file byte limit.
    pub max_file_size: u64,

    allowed_types: Arc<[String]>,
}

impl UploadService {
    pub fn new(base_path: impl Into<PathBuf>, max_file_size: u64, allowed_types: Vec<String>) -> Self {
        Self {
            base_path: base_path.into(),
            max_file_size,
            allowed_types: allowed_types
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_storage_dir(&self) -> UploadResult<()> {
        if fs::metadata(&self.base_path).await.is_err() {
            fs::create_dir_all(&self.base_path).await?;
            tracing::info!("Created storage directory at {}", self.base_path.display());
        }
        Ok(())
    }

    /// Read the whole multipart body, storing files found under `spec.name`.
    ///
    /// Files are on disk before this returns. If any file is rejected, or
    /// the body fails part-way, every file this request already wrote is
    /// removed and parsing stops.
    pub async fn accept(
        &self,
        mut multipart: Multipart,
        spec: FileField,
    ) -> UploadResult<ParsedUpload> {
        let mut parsed = ParsedUpload::default();

        match self.read_parts(&mut multipart, spec, &mut parsed).await {
            Ok(None) => Ok(parsed),
            Ok(Some(rejection)) => Ok(self.reject(parsed, rejection).await),
            Err(err) => {
                self.discard(&parsed.files).await;
                Err(err)
            }
        }
    }

    /// Walk the parts until the body ends or a file is rejected.
    async fn read_parts(
        &self,
        multipart: &mut Multipart,
        spec: FileField,
        parsed: &mut ParsedUpload,
    ) -> UploadResult<Option<UploadRejection>> {
        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();

            let Some(original_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                parsed.fields.insert(field_name, value);
                continue;
            };

            // Browsers send an empty filename when no file was chosen.
            if original_name.is_empty() {
                drain(field).await?;
                continue;
            }

            let content_type = field
                .content_type()
                .unwrap_or(FALLBACK_CONTENT_TYPE)
                .to_string();

            if field_name != spec.name {
                return Ok(Some(UploadRejection::UnexpectedField(field_name)));
            }
            if parsed.files.len() >= spec.max_count {
                return Ok(Some(if spec.max_count == 1 {
                    UploadRejection::UnexpectedField(field_name)
                } else {
                    UploadRejection::TooManyFiles(spec.max_count)
                }));
            }
            if !self.is_allowed_type(&content_type) {
                return Ok(Some(UploadRejection::DisallowedType(content_type)));
            }

            match self.store_field(field, original_name, content_type).await? {
                Stored::File(file) => {
                    debug!(
                        filename = %file.filename,
                        size = file.size,
                        "stored upload {}",
                        file.path.display()
                    );
                    parsed.files.push(file);
                }
                Stored::TooLarge => {
                    let limit_mb = self.max_file_size / (1024 * 1024);
                    return Ok(Some(UploadRejection::TooLarge { limit_mb }));
                }
            }
        }

        Ok(None)
    }

    /// Check a declared media type against the allow-list.
    ///
    /// Parameters (`; charset=...`) are ignored; entries ending in `/*`
    /// match a whole top-level type.
    pub fn is_allowed_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        self.allowed_types.iter().any(|allowed| match allowed.strip_suffix("/*") {
            Some(top) => essence
                .split_once('/')
                .is_some_and(|(t, sub)| t == top && !sub.is_empty()),
            None => *allowed == essence,
        })
    }

    async fn reject(&self, mut parsed: ParsedUpload, rejection: UploadRejection) -> ParsedUpload {
        debug!("rejecting upload: {}", rejection);
        self.discard(&parsed.files).await;
        parsed.files.clear();
        parsed.rejection = Some(rejection);
        parsed
    }

    /// Stream one file part to a freshly created file.
    ///
    /// Removes the partial file on any failure or when the size limit is hit.
    async fn store_field(
        &self,
        mut field: Field<'_>,
        original_name: String,
        content_type: String,
    ) -> UploadResult<Stored> {
        let extension = stored_extension(&original_name, &content_type);
        let (filename, path, mut file) = self.create_unique(&extension).await?;

        let mut size: u64 = 0;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    drop(file);
                    remove_quietly(&path).await;
                    return Err(UploadError::Multipart(err));
                }
            };
            size += chunk.len() as u64;
            if size > self.max_file_size {
                drop(file);
                remove_quietly(&path).await;
                return Ok(Stored::TooLarge);
            }
            if let Err(err) = file.write_all(&chunk).await {
                drop(file);
                remove_quietly(&path).await;
                return Err(UploadError::Io(err));
            }
        }

        if let Err(err) = file.flush().await {
            remove_quietly(&path).await;
            return Err(UploadError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            remove_quietly(&path).await;
            return Err(UploadError::Io(err));
        }

        Ok(Stored::File(StoredFile {
            filename,
            original_name,
            size,
            path,
            content_type,
        }))
    }

    /// Open a new file with a generated name, never reusing an existing one.
    async fn create_unique(&self, extension: &str) -> UploadResult<(String, PathBuf, File)> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = generate_filename(extension);
            let path = self.base_path.join(&filename);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((filename, path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    warn!("generated filename {} already exists, retrying", filename);
                }
                Err(err) => return Err(UploadError::Io(err)),
            }
        }
        Err(UploadError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "could not generate a unique filename",
        )))
    }

    async fn discard(&self, files: &[StoredFile]) {
        for file in files {
            remove_quietly(&file.path).await;
        }
    }
}

async fn drain(mut field: Field<'_>) -> UploadResult<()> {
    while field.chunk().await?.is_some() {}
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != ErrorKind::NotFound {
            debug!("failed to remove {}: {}", path.display(), err);
        }
    }
}

/// `<unix-millis>-<uuid>` plus the extension, if any.
fn generate_filename(extension: &str) -> String {
    format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

/// Pick the extension a stored file is saved (and later served) under.
///
/// The extension always agrees with the accepted media type: the client's
/// own extension is kept only when it maps back to that type, otherwise one
/// is taken from the type itself. Active content gets none.
fn stored_extension(original_name: &str, content_type: &str) -> String {
    let essence = media_essence(content_type);
    if ACTIVE_CONTENT_TYPES.contains(&essence.as_str()) {
        return String::new();
    }
    let serves_as = |ext: &str| mime_guess::from_ext(ext).first_raw() == Some(essence.as_str());

    let claimed = sanitized_extension(original_name);
    if claimed.len() > 1 && serves_as(&claimed[1..]) {
        return claimed;
    }
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.iter().copied().find(|ext| serves_as(ext)))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// `Image/JPEG; charset=x` -> `image/jpeg`.
fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Derive a safe `.ext` from an untrusted filename.
///
/// Keeps ASCII alphanumerics only, lowercased and truncated, so the result
/// can never contain a path separator or `..`. Returns `""` if nothing
/// usable is left.
fn sanitized_extension(original_name: &str) -> String {
    // Client names may use either separator; only the last segment counts.
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let Some((stem, ext)) = base.rsplit_once('.') else {
        return String::new();
    };
    if stem.is_empty() {
        return String::new();
    }
    let cleaned: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        String::new()
    } else {
        format!(".{}", cleaned)
    }
}
