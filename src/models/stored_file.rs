//! Represents a file accepted by the upload validator and written to disk.

use serde::Serialize;
use std::path::PathBuf;

/// Public URL prefix under which the storage directory is served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// A single uploaded file after it has been persisted.
///
/// The record is never mutated; the bytes on disk outlive the request.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Generated, collision-free name inside the storage directory.
    pub filename: String,

    /// Name supplied by the client. Untrusted; used for display only.
    pub original_name: String,

    /// Size in bytes.
    pub size: u64,

    /// Absolute or relative path of the stored payload.
    #[serde(skip)]
    pub path: PathBuf,

    /// Media type declared by the client for this part.
    pub content_type: String,
}

impl StoredFile {
    /// Path under which the file is reachable over HTTP.
    pub fn public_path(&self) -> String {
        format!("{}/{}", PUBLIC_PREFIX, self.filename)
    }
}
