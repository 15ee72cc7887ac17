//! Data carried through an upload request.
//!
//! `StoredFile` is what the validator leaves on disk, `NotificationMessage`
//! is what the mailer consumes, and `upload` holds the JSON response bodies.

pub mod notification;
pub mod stored_file;
pub mod upload;
