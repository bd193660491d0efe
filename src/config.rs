//! Gateway configuration — positional arguments plus environment overrides.
//!
//! Invocation matches the `/etc/aliases` pipe convention:
//! `docgate SECRETKEY [APIURL [BCC_ADDR]] <MAILFILE`. Mail-relay knobs that
//! don't belong on an alias line come from `DOCGATE_*` environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default base URL of the document-processing API.
pub const DEFAULT_API_URL: &str = "https://us.api.rossum.ai";

/// Do not process more than this number of attachments per message.
///
/// The MTA kills the delivery command after its own timeout (postfix
/// defaults to 1000s); at a conservative 60s per document, 15 keeps a
/// full run inside that window.
pub const MAX_ATTACHMENTS: usize = 15;

/// Gateway configuration, built from CLI arguments and environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API secret key, sent as the `Authorization` header.
    pub secret_key: SecretString,
    /// API base URL, without a trailing slash.
    pub api_url: String,
    /// Optional debug address BCC'd on every outgoing report.
    pub bcc: Option<String>,
    /// Local mail relay host.
    pub smtp_host: String,
    /// Local mail relay port.
    pub smtp_port: u16,
    /// From header on outgoing reports.
    pub from_address: String,
    /// Attachment cap per inbound message.
    pub max_attachments: usize,
    /// Delay between job status polls.
    pub poll_interval: Duration,
    /// Delay before each document submission.
    pub submit_delay: Duration,
}

impl GatewayConfig {
    /// Build config from positional arguments (program name already
    /// stripped): secret key (required), API base URL (optional), BCC
    /// debug address (optional).
    pub fn from_args<I>(mut args: I) -> Result<Self, ConfigError>
    where
        I: Iterator<Item = String>,
    {
        let secret_key = args.next().ok_or_else(|| ConfigError::MissingRequired {
            key: "SECRETKEY".into(),
            hint: "Usage: docgate SECRETKEY [APIURL [BCC_ADDR]] <MAILFILE".into(),
        })?;
        let api_url = args.next().unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let bcc = args.next();

        let smtp_host =
            std::env::var("DOCGATE_SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = env_parse("DOCGATE_SMTP_PORT", 25)?;
        let from_address = std::env::var("DOCGATE_FROM_ADDRESS")
            .unwrap_or_else(|_| "Document Gateway <docgate@localhost>".to_string());
        let max_attachments = env_parse("DOCGATE_MAX_ATTACHMENTS", MAX_ATTACHMENTS)?;
        let poll_interval = Duration::from_secs(env_parse("DOCGATE_POLL_INTERVAL_SECS", 2)?);
        let submit_delay = Duration::from_secs(env_parse("DOCGATE_SUBMIT_DELAY_SECS", 1)?);

        Ok(Self {
            secret_key: SecretString::from(secret_key),
            api_url: api_url.trim_end_matches('/').to_string(),
            bcc,
            smtp_host,
            smtp_port,
            from_address,
            max_attachments,
            poll_interval,
            submit_delay,
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
