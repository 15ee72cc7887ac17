//! File upload service that stores submissions on local disk and e-mails the
//! site owner a copy of every single-file upload.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
