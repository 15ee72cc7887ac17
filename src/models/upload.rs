//! JSON bodies returned by the upload endpoints.

use super::stored_file::StoredFile;
use serde::Serialize;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub size: u64,
}

impl From<&StoredFile> for UploadedFile {
    fn from(file: &StoredFile) -> Self {
        Self {
            filename: file.filename.clone(),
            original_name: file.original_name.clone(),
            path: file.public_path(),
            size: file.size,
        }
    }
}

/// Entry in the batch response. Omits the original name.
#[derive(Serialize, Debug)]
pub struct BatchFile {
    pub filename: String,
    pub path: String,
    pub size: u64,
}

impl From<&StoredFile> for BatchFile {
    fn from(file: &StoredFile) -> Self {
        Self {
            filename: file.filename.clone(),
            path: file.public_path(),
            size: file.size,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub message: &'static str,
    pub file: UploadedFile,
}

#[derive(Serialize, Debug)]
pub struct BatchUploadResponse {
    pub message: &'static str,
    pub files: Vec<BatchFile>,
}
