//! Error types for the gateway.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required argument: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Document-API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Inbound-parsing and outbound-delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Could not parse inbound message")]
    Unparseable,

    #[error("Inbound message has no Reply-To or From address")]
    NoReplyAddress,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build reply: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Send(String),
}

/// Report-rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV flush failed: {0}")]
    Flush(String),

    #[error("Report is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
