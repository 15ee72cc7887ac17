pub mod mail_service;
pub mod notification_service;
pub mod upload_service;
