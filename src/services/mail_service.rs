//! Outgoing mail over SMTP.
//!
//! One `SmtpMailer` is built at startup and shared by every request through
//! the `Mailer` trait. Sends are never retried; failures go back to the caller.

use crate::{
    config::{SmtpConfig, SmtpSecurity},
    models::notification::NotificationMessage,
};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, header::ContentType},
    transport::smtp::{
        AsyncSmtpTransportBuilder,
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use std::io;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required mail setting: {0}")]
    MissingConfig(&'static str),
    #[error("invalid e-mail address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("could not read attachment `{path}`: {source}")]
    Attachment {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid attachment content type: {0}")]
    ContentType(String),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),
}

pub type MailResult<T> = Result<T, MailError>;

/// What the server told us about an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
    /// Final SMTP reply, e.g. `250 2.0.0 OK`.
    pub response: String,
}

/// Anything that can deliver a notification.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: NotificationMessage) -> MailResult<DeliveryReceipt>;
}

/// Production mailer backed by lettre's async SMTP transport.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Option<String>,
}

impl SmtpMailer {
    /// Build the transport. No connection is opened until the first send.
    pub fn new(cfg: &SmtpConfig) -> MailResult<Self> {
        let builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(cfg.host.as_str())
            .port(cfg.port)
            .timeout(Some(cfg.timeout));
        let builder = apply_security(builder, cfg)?;
        let builder = match (&cfg.user, &cfg.password) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.clone(), password.clone()))
            }
            _ => builder,
        };

        tracing::info!(
            host = %cfg.host,
            port = cfg.port,
            security = ?cfg.security,
            "SMTP mailer initialized"
        );

        Ok(Self {
            transport: builder.build(),
            from: cfg.from.clone().or_else(|| cfg.user.clone()),
        })
    }
}

fn apply_security(
    builder: AsyncSmtpTransportBuilder,
    cfg: &SmtpConfig,
) -> MailResult<AsyncSmtpTransportBuilder> {
    if cfg.security == SmtpSecurity::None {
        return Ok(builder);
    }
    let params = TlsParameters::builder(cfg.host.clone())
        .dangerous_accept_invalid_certs(cfg.accept_invalid_certs)
        .build()?;
    Ok(match cfg.security {
        SmtpSecurity::Tls => builder.tls(Tls::Wrapper(params)),
        SmtpSecurity::StartTls => builder.tls(Tls::Required(params)),
        SmtpSecurity::None => builder,
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: NotificationMessage) -> MailResult<DeliveryReceipt> {
        let from = self.from.as_deref().ok_or(MailError::MissingConfig("MAIL_FROM"))?;
        let to = message
            .to
            .as_deref()
            .ok_or(MailError::MissingConfig("OWNER_EMAIL"))?;

        let email = build_message(parse_mailbox(from)?, parse_mailbox(to)?, message).await?;
        let message_id = email.headers().get_raw("Message-ID").map(str::to_string);

        let response = self.transport.send(email).await?;
        let reply = format!(
            "{} {}",
            response.code(),
            response.message().collect::<Vec<_>>().join(" ")
        );
        debug!(?message_id, reply = %reply, "SMTP server accepted message");

        Ok(DeliveryReceipt {
            message_id,
            response: reply,
        })
    }
}

fn parse_mailbox(address: &str) -> MailResult<Mailbox> {
    address.parse().map_err(|source| MailError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}

/// Assemble `multipart/mixed`: the text/html alternative, then attachments.
///
/// Attachment bytes are read from disk here, at send time.
pub async fn build_message(
    from: Mailbox,
    to: Mailbox,
    message: NotificationMessage,
) -> MailResult<Message> {
    let mut body = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(
        message.text,
        message.html,
    ));

    for attachment in message.attachments {
        let bytes = fs::read(&attachment.path)
            .await
            .map_err(|source| MailError::Attachment {
                path: attachment.path.display().to_string(),
                source,
            })?;
        let content_type = ContentType::parse(&attachment.content_type)
            .or_else(|_| ContentType::parse("application/octet-stream"))
            .map_err(|err| MailError::ContentType(err.to_string()))?;
        body = body.singlepart(Attachment::new(attachment.filename).body(bytes, content_type));
    }

    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject)
        .multipart(body)?)
}
