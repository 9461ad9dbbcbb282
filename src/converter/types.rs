use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// `GET /health`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub status: String,
}

/// `GET /`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
}

/// Raw body of `POST /api/v1/convert`, before the `success` flag is checked.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ConvertResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub original_size: u64,
    #[serde(default)]
    pub converted_size: u64,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default, alias = "error")]
    pub detail: Option<String>,
}

impl ConvertResponse {
    /// The one place the `success` flag is inspected.
    pub fn into_result(self) -> Result<ConvertedImage, ClientError> {
        if !self.success {
            let message = if self.message.is_empty() {
                "service reported failure".to_string()
            } else {
                self.message
            };
            return Err(ClientError::LogicalFailure {
                message,
                detail: self.detail,
            });
        }

        let payload = if self.data.is_some() || self.data_url.is_some() {
            Payload::Inline {
                data: self.data,
                data_url: self.data_url,
            }
        } else {
            Payload::None
        };

        Ok(ConvertedImage {
            filename: self.filename,
            original_size: self.original_size,
            converted_size: self.converted_size,
            payload,
        })
    }
}

/// Converted image content carried in a success response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Payload {
    /// Base64 data and/or a `data:` URL.
    Inline {
        data: Option<String>,
        data_url: Option<String>,
    },
    /// No inline content; the bytes were fetched separately.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedImage {
    pub filename: String,
    pub original_size: u64,
    pub converted_size: u64,
    pub payload: Payload,
}

impl ConvertedImage {
    /// Decodes the inline payload into image bytes.
    ///
    /// Returns `Ok(None)` when the response carried no inline content.
    pub fn decode_bytes(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        let encoded = match &self.payload {
            Payload::Inline {
                data: Some(data), ..
            } => data.as_str(),
            Payload::Inline {
                data_url: Some(url),
                ..
            } => url.split_once(',').map(|(_, b64)| b64).unwrap_or(url.as_str()),
            _ => return Ok(None),
        };
        STANDARD.decode(encoded.trim()).map(Some)
    }

    /// Size reduction as a fraction of the original (negative if it grew).
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        1.0 - self.converted_size as f64 / self.original_size as f64
    }
}

/// `image_info` object of `POST /api/v1/info`. Unknown keys are kept in
/// `extra`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub has_transparency: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw body of `POST /api/v1/info`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ImageInfoResponse {
    pub success: bool,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub image_info: Option<ImageInfo>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "error")]
    pub detail: Option<String>,
}

/// Decoded result of the info endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub filename: String,
    pub size: u64,
    pub info: ImageInfo,
}

impl ImageInfoResponse {
    pub fn into_result(self) -> Result<ImageMetadata, ClientError> {
        match (self.success, self.image_info) {
            (true, Some(info)) => Ok(ImageMetadata {
                filename: self.filename,
                size: self.size,
                info,
            }),
            (true, None) => Err(ClientError::LogicalFailure {
                message: "response is missing image_info".to_string(),
                detail: self.detail,
            }),
            (false, _) => Err(ClientError::LogicalFailure {
                message: self
                    .message
                    .unwrap_or_else(|| "service reported failure".to_string()),
                detail: self.detail,
            }),
        }
    }
}

/// Why one file in a batch did not convert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionFailure {
    pub message: String,
    pub detail: Option<String>,
    pub status: Option<u16>,
}

impl From<&ClientError> for ConversionFailure {
    fn from(err: &ClientError) -> Self {
        Self {
            message: err.to_string(),
            detail: err.detail().map(str::to_string),
            status: err.status(),
        }
    }
}

/// Result of converting one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConversionOutcome {
    Success(ConvertedImage),
    Failure(ConversionFailure),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success(_))
    }

    pub fn as_success(&self) -> Option<&ConvertedImage> {
        match self {
            ConversionOutcome::Success(image) => Some(image),
            ConversionOutcome::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ConversionFailure> {
        match self {
            ConversionOutcome::Success(_) => None,
            ConversionOutcome::Failure(failure) => Some(failure),
        }
    }
}

impl From<Result<ConvertedImage, ClientError>> for ConversionOutcome {
    fn from(result: Result<ConvertedImage, ClientError>) -> Self {
        match result {
            Ok(image) => ConversionOutcome::Success(image),
            Err(err) => ConversionOutcome::Failure(ConversionFailure::from(&err)),
        }
    }
}
