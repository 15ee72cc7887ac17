use anyhow::{Context, Result, bail};
use clap::Parser;
use lettre::message::Mailbox;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

/// Origins that may always call the API from a browser.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "https://luz-lens.vercel.app",
    "http://127.0.0.1:5500",
    "http://localhost:3000",
];

/// Media types accepted when `ALLOWED_MIME_TYPES` is not set.
pub const DEFAULT_ALLOWED_MIME_TYPES: [&str; 9] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
    "video/mp4",
    "video/quicktime",
    "video/webm",
];

const DEFAULT_SITE_NAME: &str = "Luz&Lens";
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;
const DEFAULT_MAIL_HOST: &str = "smtp.gmail.com";
const DEFAULT_MAIL_PORT: u16 = 587;
const DEFAULT_MAIL_TIMEOUT_SECS: u64 = 30;
const IMPLICIT_TLS_PORT: u16 = 465;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub frontend_url: Option<String>,
    pub owner_email: Option<String>,
    pub site_name: String,
    pub max_file_size_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub smtp: SmtpConfig,
}

/// Connection parameters for the outgoing mail server.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

// Hand-written so the password never reaches the startup log.
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte (usually port 465).
    Tls,
    /// Plain connection upgraded with STARTTLS.
    StartTls,
    /// No transport security at all.
    None,
}

impl FromStr for SmtpSecurity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "true" => Ok(Self::Tls),
            "starttls" | "false" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::None),
            other => bail!("unknown SMTP security mode `{}`", other),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File upload service with owner e-mail notifications")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploads are stored (overrides UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Per-file size limit in megabytes (overrides MAX_FILE_SIZE_MB)
    #[arg(long)]
    pub max_file_size_mb: Option<u64>,
}

impl AppConfig {
    /// Load `.env`, parse CLI args and read the process environment.
    pub fn from_env_and_args() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("loading .env file");
            }
        }
        let args = Args::parse();
        Self::from_sources(args, |key| env::var(key).ok())
    }

    /// Build the configuration from parsed arguments and a variable lookup.
    pub fn from_sources<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env_port = parse_var(&var, "PORT")?.unwrap_or(3000);
        let env_max_mb = parse_var(&var, "MAX_FILE_SIZE_MB")?.unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);
        let max_file_size_mb = args.max_file_size_mb.unwrap_or(env_max_mb);
        if max_file_size_mb == 0 {
            bail!("MAX_FILE_SIZE_MB must be greater than zero");
        }
        let Some(max_file_size_bytes) = max_file_size_mb.checked_mul(1024 * 1024) else {
            bail!("MAX_FILE_SIZE_MB value {} is too large", max_file_size_mb);
        };

        let allowed_mime_types = match var("ALLOWED_MIME_TYPES") {
            Some(list) => list
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            None => DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        };

        let owner_email = var("OWNER_EMAIL");
        if let Some(owner) = &owner_email {
            owner
                .parse::<Mailbox>()
                .with_context(|| format!("parsing OWNER_EMAIL value `{}`", owner))?;
        }

        let smtp_port = parse_var(&var, "MAIL_PORT")?.unwrap_or(DEFAULT_MAIL_PORT);
        let security = match var("MAIL_SECURITY") {
            Some(mode) => mode.parse().context("parsing MAIL_SECURITY")?,
            None if smtp_port == IMPLICIT_TLS_PORT => SmtpSecurity::Tls,
            None => SmtpSecurity::StartTls,
        };
        let from = var("MAIL_FROM");
        if let Some(from) = &from {
            from.parse::<Mailbox>()
                .with_context(|| format!("parsing MAIL_FROM value `{}`", from))?;
        }

        let smtp = SmtpConfig {
            host: var("MAIL_HOST").unwrap_or_else(|| DEFAULT_MAIL_HOST.into()),
            port: smtp_port,
            security,
            user: var("MAIL_USER"),
            password: var("MAIL_PASS"),
            from,
            timeout: Duration::from_secs(
                parse_var(&var, "MAIL_TIMEOUT_SECS")?.unwrap_or(DEFAULT_MAIL_TIMEOUT_SECS),
            ),
            accept_invalid_certs: parse_var(&var, "MAIL_ACCEPT_INVALID_CERTS")?.unwrap_or(false),
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            upload_dir: args
                .upload_dir
                .or_else(|| var("UPLOAD_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            frontend_url: var("FRONTEND_URL"),
            owner_email,
            site_name: var("SITE_NAME").unwrap_or_else(|| DEFAULT_SITE_NAME.into()),
            max_file_size_bytes,
            allowed_mime_types,
            smtp,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fixed allow-list plus the configured front-end origin.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|o| o.to_string())
            .collect();
        if let Some(url) = &self.frontend_url {
            let url = url.trim_end_matches('/').to_string();
            if !origins.contains(&url) {
                origins.push(url);
            }
        }
        origins
    }

    /// Warn about settings whose absence only shows up when mail is sent.
    pub fn log_warnings(&self) {
        if self.owner_email.is_none() {
            tracing::warn!("OWNER_EMAIL is not set; upload notifications will fail");
        }
        if self.smtp.user.is_none() || self.smtp.password.is_none() {
            tracing::warn!(
                host = %self.smtp.host,
                "MAIL_USER/MAIL_PASS not set; sending without SMTP authentication"
            );
        }
        if self.smtp.from.is_none() && self.smtp.user.is_none() {
            tracing::warn!("neither MAIL_FROM nor MAIL_USER is set; notifications have no sender");
        }
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_sources(Args::default(), move |k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(cfg.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.smtp.host, "smtp.gmail.com");
        assert_eq!(cfg.smtp.port, 587);
        assert_eq!(cfg.smtp.security, SmtpSecurity::StartTls);
        assert!(!cfg.smtp.accept_invalid_certs);
        assert!(cfg.owner_email.is_none());
        assert!(cfg.allowed_mime_types.contains(&"image/jpeg".to_string()));
    }

    #[test]
    fn port_465_implies_implicit_tls() {
        let cfg = load(&[("MAIL_PORT", "465")]).unwrap();
        assert_eq!(cfg.smtp.security, SmtpSecurity::Tls);

        let cfg = load(&[("MAIL_PORT", "465"), ("MAIL_SECURITY", "none")]).unwrap();
        assert_eq!(cfg.smtp.security, SmtpSecurity::None);
    }

    #[test]
    fn invalid_values_fail_eagerly() {
        assert!(load(&[("PORT", "eighty")]).is_err());
        assert!(load(&[("OWNER_EMAIL", "not an address")]).is_err());
        assert!(load(&[("MAIL_SECURITY", "quantum")]).is_err());
        assert!(load(&[("MAX_FILE_SIZE_MB", "0")]).is_err());
    }

    #[test]
    fn file_size_limits_that_overflow_bytes_are_refused() {
        let err = load(&[("MAX_FILE_SIZE_MB", "18446744073709551615")]).unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);

        let args = Args {
            max_file_size_mb: Some(u64::MAX / 1024),
            ..Args::default()
        };
        assert!(AppConfig::from_sources(args, |_| None).is_err());

        let cfg = load(&[("MAX_FILE_SIZE_MB", "17592186044415")]).unwrap();
        assert_eq!(cfg.max_file_size_bytes, 17_592_186_044_415 * 1024 * 1024);
    }

    #[test]
    fn cli_arguments_override_environment() {
        let args = Args {
            port: Some(8080),
            upload_dir: Some(PathBuf::from("/srv/files")),
            ..Args::default()
        };
        let cfg = AppConfig::from_sources(args, |k| match k {
            "PORT" => Some("9000".into()),
            "UPLOAD_DIR" => Some("/tmp/other".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.upload_dir, PathBuf::from("/srv/files"));
    }

    #[test]
    fn frontend_url_joins_the_allow_list_once() {
        let cfg = load(&[("FRONTEND_URL", "https://studio.example/")]).unwrap();
        let origins = cfg.allowed_origins();
        assert_eq!(origins.len(), DEFAULT_ALLOWED_ORIGINS.len() + 1);
        assert!(origins.contains(&"https://studio.example".to_string()));

        let cfg = load(&[("FRONTEND_URL", "http://localhost:3000")]).unwrap();
        assert_eq!(cfg.allowed_origins().len(), DEFAULT_ALLOWED_ORIGINS.len());
    }

    #[test]
    fn allowed_mime_types_are_normalized() {
        let cfg = load(&[("ALLOWED_MIME_TYPES", "Image/PNG, application/pdf ,")]).unwrap();
        assert_eq!(cfg.allowed_mime_types, vec!["image/png", "application/pdf"]);
    }

    #[test]
    fn debug_output_redacts_the_password() {
        let cfg = load(&[("MAIL_PASS", "hunter2")]).unwrap();
        let rendered = format!("{:?}", cfg.smtp);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
