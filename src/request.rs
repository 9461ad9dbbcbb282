//! Conversion requests and the multipart forms built from them.
//!
//! Building a form is a pure step: nothing here touches the network, and
//! path-backed files are only read when the executor materialises the form.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Output image format understood by the conversion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Jpeg,
    Png,
}

impl TargetFormat {
    /// Value of the `format` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            other => Err(format!(
                "unsupported target format '{}', expected 'jpeg' or 'png'",
                other
            )),
        }
    }
}

/// Where the bytes of a [`FileRef`] live.
#[derive(Debug, Clone, PartialEq)]
pub enum FileData {
    Bytes(Bytes),
    /// Read lazily when the request is sent.
    Path(PathBuf),
}

/// A file to upload: a handle plus the name and MIME type sent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    name: String,
    mime_type: String,
    size: Option<u64>,
    data: FileData,
}

impl FileRef {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        Self {
            mime_type: mime_for(&name).to_string(),
            size: Some(bytes.len() as u64),
            data: FileData::Bytes(bytes),
            name,
        }
    }

    /// References a file on disk without touching it; the size is unknown.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_name(&path);
        Self {
            mime_type: mime_for(&name).to_string(),
            size: None,
            data: FileData::Path(path),
            name,
        }
    }

    /// Like [`FileRef::from_path`], but stats the file so its size is known
    /// before upload.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| ClientError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self::from_path(path).with_size(metadata.len()))
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn data(&self) -> &FileData {
        &self.data
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn mime_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".heif") {
        "image/heif"
    } else {
        "image/heic"
    }
}

/// One file to convert.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertRequest {
    pub file: FileRef,
    pub format: TargetFormat,
    pub quality: Option<f32>,
}

impl ConvertRequest {
    pub fn new(file: FileRef, format: TargetFormat) -> Self {
        Self {
            file,
            format,
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Transport-ready multipart body. Cloning is cheap, so every retry
/// attempt can rebuild its own `reqwest` form from the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub file: FileRef,
    pub fields: Vec<(&'static str, String)>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Materialises the `reqwest` form, reading the file from disk if needed.
    pub(crate) async fn to_multipart(&self) -> Result<reqwest::multipart::Form> {
        let bytes = match &self.file.data {
            FileData::Bytes(bytes) => bytes.clone(),
            FileData::Path(path) => {
                let contents = tokio::fs::read(path)
                    .await
                    .map_err(|source| ClientError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Bytes::from(contents)
            }
        };

        let len = bytes.len() as u64;
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(bytes), len)
            .file_name(self.file.name.clone())
            .mime_str(&self.file.mime_type)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid MIME type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (name, value) in &self.fields {
            form = form.text(*name, value.clone());
        }
        Ok(form)
    }
}

/// Checks the file name and the size (when known) against the config.
pub fn validate_file(config: &ClientConfig, file: &FileRef) -> Result<()> {
    if !config.accepts(&file.name) {
        return Err(ClientError::InvalidFormat {
            filename: file.name.clone(),
            accepted: config.accepted_list(),
        });
    }

    match file.size {
        Some(size) if size > config.max_file_size() => {
            return Err(ClientError::FileTooLarge {
                filename: file.name.clone(),
                size,
                max: config.max_file_size(),
            });
        }
        _ => {}
    }

    Ok(())
}

/// Builds the body for the convert and convert-download endpoints.
///
/// `quality` is only sent when the caller set one.
pub fn build_convert_form(config: &ClientConfig, request: &ConvertRequest) -> Result<UploadForm> {
    validate_file(config, &request.file)?;

    let mut fields = vec![("format", request.format.as_str().to_string())];
    if let Some(quality) = request.quality {
        if !(0.0..=1.0).contains(&quality) {
            return Err(ClientError::InvalidQuality { quality });
        }
        fields.push(("quality", quality.to_string()));
    }

    Ok(UploadForm {
        file: request.file.clone(),
        fields,
    })
}

/// Builds the body for the info endpoint: the file part only.
pub fn build_info_form(config: &ClientConfig, file: &FileRef) -> Result<UploadForm> {
    validate_file(config, file)?;
    Ok(UploadForm {
        file: file.clone(),
        fields: Vec::new(),
    })
}
