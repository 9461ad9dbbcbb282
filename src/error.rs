//! Error taxonomy for the conversion client.
//!
//! Every failure a caller can observe is a [`ClientError`]. Local validation
//! errors are raised before any network traffic; transport and HTTP errors
//! come out of the single-request executor; [`ClientError::LogicalFailure`]
//! is produced when the service answers 200 but reports `success: false`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`ClientError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormat,
    FileTooLarge,
    InvalidQuality,
    Timeout,
    Network,
    HttpClient,
    HttpServer,
    LogicalFailure,
    Decode,
    Io,
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidFormat => "invalid-format",
            ErrorKind::FileTooLarge => "file-too-large",
            ErrorKind::InvalidQuality => "invalid-quality",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::HttpClient => "http-client",
            ErrorKind::HttpServer => "http-server",
            ErrorKind::LogicalFailure => "logical-failure",
            ErrorKind::Decode => "decode",
            ErrorKind::Io => "io",
            ErrorKind::InvalidConfig => "invalid-config",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// File name does not carry one of the accepted extensions.
    #[error("Unsupported file '{filename}': expected one of {accepted}")]
    InvalidFormat { filename: String, accepted: String },

    /// File size is known and exceeds the configured maximum.
    #[error("File '{filename}' is too large: {size} bytes (max {max} bytes)")]
    FileTooLarge {
        filename: String,
        size: u64,
        max: u64,
    },

    /// Quality must lie within `0.0..=1.0`.
    #[error("Invalid quality {quality}: must be between 0.0 and 1.0")]
    InvalidQuality { quality: f32 },

    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Network error contacting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP 4xx. Not retried.
    #[error("HTTP {status} from {url}: {body}")]
    HttpClient {
        url: String,
        status: u16,
        body: String,
    },

    /// HTTP 5xx or any other non-2xx status.
    #[error("HTTP {status} from {url}: {body}")]
    HttpServer {
        url: String,
        status: u16,
        body: String,
    },

    /// The service answered but flagged the operation as failed.
    #[error("Service reported failure: {message}")]
    LogicalFailure {
        message: String,
        detail: Option<String>,
    },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            ClientError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            ClientError::InvalidQuality { .. } => ErrorKind::InvalidQuality,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Network { .. } => ErrorKind::Network,
            ClientError::HttpClient { .. } => ErrorKind::HttpClient,
            ClientError::HttpServer { .. } => ErrorKind::HttpServer,
            ClientError::LogicalFailure { .. } => ErrorKind::LogicalFailure,
            ClientError::Decode { .. } => ErrorKind::Decode,
            ClientError::Io { .. } => ErrorKind::Io,
            ClientError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Whether another attempt of the same request could succeed.
    ///
    /// Transport failures and server-side errors are retryable; anything
    /// the caller has to fix (bad input, 4xx, explicit service refusal) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::HttpServer | ErrorKind::Decode
        )
    }

    /// HTTP status code, when the error came from a completed response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpClient { status, .. } | ClientError::HttpServer { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Extra diagnostic text beyond the display message, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::HttpClient { body, .. } | ClientError::HttpServer { body, .. }
                if !body.is_empty() =>
            {
                Some(body.as_str())
            }
            ClientError::LogicalFailure { detail, .. } => detail.as_deref(),
            ClientError::Decode { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Builds the error for a non-2xx response.
    pub(crate) fn from_status(url: &str, status: u16, body: String) -> Self {
        if (400..500).contains(&status) {
            ClientError::HttpClient {
                url: url.to_string(),
                status,
                body,
            }
        } else {
            ClientError::HttpServer {
                url: url.to_string(),
                status,
                body,
            }
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
