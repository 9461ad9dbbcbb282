//! Client configuration.
//!
//! A [`ClientConfig`] is built once at startup and shared by reference; it
//! is never mutated afterwards. Only the base URL can come from the
//! environment, everything else is set in code.

use log::debug;
use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::http::RetryPolicy;

/// Environment variable overriding the service base URL.
pub const API_URL_ENV: &str = "HEICCONV_API_URL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_QUALITY: f32 = 0.9;
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["heic", "heif"];

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    max_file_size: u64,
    accepted_extensions: Vec<String>,
    default_quality: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            accepted_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            default_quality: DEFAULT_QUALITY,
        }
    }
}

impl ClientConfig {
    /// Defaults, with the base URL taken from `HEICCONV_API_URL` when set.
    pub fn from_env() -> Self {
        match env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => {
                debug!("Using API base URL from {}: {}", API_URL_ENV, url);
                Self::default().with_base_url(url)
            }
            _ => Self::default(),
        }
    }

    /// Trailing slashes are stripped so endpoint paths can be appended as-is.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Extensions are compared case-insensitively; a leading dot is optional.
    pub fn with_accepted_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.accepted_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_default_quality(mut self, quality: f32) -> Self {
        self.default_quality = quality;
        self
    }

    /// Checks the invariants a client needs before it sends anything.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::InvalidConfig(format!(
                "base URL '{}' must start with http:// or https://",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.accepted_extensions.is_empty() {
            return Err(ClientError::InvalidConfig(
                "at least one accepted extension is required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.default_quality) {
            return Err(ClientError::InvalidConfig(format!(
                "default quality {} must be between 0.0 and 1.0",
                self.default_quality
            )));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn accepted_extensions(&self) -> &[String] {
        &self.accepted_extensions
    }

    pub fn default_quality(&self) -> f32 {
        self.default_quality
    }

    /// Case-insensitive suffix check on a file name.
    pub fn accepts(&self, filename: &str) -> bool {
        let lower = filename.to_ascii_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext)))
    }

    /// Human-readable list such as `.heic, .heif`.
    pub fn accepted_list(&self) -> String {
        self.accepted_extensions
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
