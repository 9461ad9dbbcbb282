use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use reqwest::Client;

use super::types::{
    ConvertResponse, ConvertedImage, HealthStatus, ImageInfoResponse, ImageMetadata, ServiceInfo,
};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::{ApiRequest, HttpClient, RequestOptions};
use crate::request::{ConvertRequest, FileRef, build_convert_form, build_info_form};

pub const HEALTH_PATH: &str = "/health";
pub const ROOT_PATH: &str = "/";
pub const CONVERT_PATH: &str = "/api/v1/convert";
pub const CONVERT_DOWNLOAD_PATH: &str = "/api/v1/convert-download";
pub const INFO_PATH: &str = "/api/v1/info";

/// Operations offered by the conversion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConvertApi: Send + Sync {
    /// Uploads one file and returns the JSON-wrapped result.
    async fn convert_file(&self, request: &ConvertRequest) -> Result<ConvertedImage>;

    /// Uploads one file and returns the converted image bytes directly.
    async fn convert_and_download(&self, request: &ConvertRequest) -> Result<Bytes>;

    async fn get_image_info(&self, file: &FileRef) -> Result<ImageMetadata>;

    async fn health(&self) -> Result<HealthStatus>;

    async fn service_info(&self) -> Result<ServiceInfo>;
}

/// Client for the conversion service. Holds only immutable state, so one
/// instance can be shared by reference across the application.
#[derive(Clone)]
pub struct ConverterClient {
    http: HttpClient,
    config: ClientConfig,
}

impl ConverterClient {
    /// Validates `config` and builds the underlying HTTP client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(concat!("heicconv/", env!("HEICCONV_VERSION")))
            .build()
            .map_err(|e| {
                crate::error::ClientError::InvalidConfig(format!(
                    "failed to build HTTP client: {}",
                    e
                ))
            })?;
        Ok(Self::with_http(HttpClient::new(client), config))
    }

    pub fn with_http(http: HttpClient, config: ClientConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn options(&self) -> RequestOptions {
        RequestOptions::from_config(&self.config)
    }

    /// Best-effort probe of `/health`. Never fails; any error means `false`.
    #[tracing::instrument(skip(self))]
    pub async fn is_service_available(&self) -> bool {
        match self.health().await {
            Ok(status) => {
                debug!("Service healthy: {}", status.status);
                true
            }
            Err(e) => {
                debug!("Service unavailable: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ConvertApi for ConverterClient {
    #[tracing::instrument(skip(self, request), fields(file = %request.file.name()))]
    async fn convert_file(&self, request: &ConvertRequest) -> Result<ConvertedImage> {
        let form = build_convert_form(&self.config, request)?;
        let api_request = ApiRequest::post_form(self.config.endpoint(CONVERT_PATH), form);

        info!(
            "Converting {} to {}...",
            request.file.name(),
            request.format
        );
        let response: ConvertResponse = self.http.send_json(&api_request, self.options()).await?;
        let image = response.into_result()?;
        info!(
            "Converted {} -> {} ({} -> {} bytes)",
            request.file.name(),
            image.filename,
            image.original_size,
            image.converted_size
        );
        Ok(image)
    }

    #[tracing::instrument(skip(self, request), fields(file = %request.file.name()))]
    async fn convert_and_download(&self, request: &ConvertRequest) -> Result<Bytes> {
        let form = build_convert_form(&self.config, request)?;
        let api_request =
            ApiRequest::post_form(self.config.endpoint(CONVERT_DOWNLOAD_PATH), form);

        info!(
            "Converting {} to {} (download)...",
            request.file.name(),
            request.format
        );
        let bytes = self.http.send_bytes(&api_request, self.options()).await?;
        info!("Downloaded {} bytes for {}", bytes.len(), request.file.name());
        Ok(bytes)
    }

    #[tracing::instrument(skip(self, file), fields(file = %file.name()))]
    async fn get_image_info(&self, file: &FileRef) -> Result<ImageMetadata> {
        let form = build_info_form(&self.config, file)?;
        let api_request = ApiRequest::post_form(self.config.endpoint(INFO_PATH), form);

        let response: ImageInfoResponse =
            self.http.send_json(&api_request, self.options()).await?;
        response.into_result()
    }

    #[tracing::instrument(skip(self))]
    async fn health(&self) -> Result<HealthStatus> {
        let request = ApiRequest::get(self.config.endpoint(HEALTH_PATH));
        self.http.send_json(&request, self.options()).await
    }

    #[tracing::instrument(skip(self))]
    async fn service_info(&self) -> Result<ServiceInfo> {
        let request = ApiRequest::get(self.config.endpoint(ROOT_PATH));
        self.http.send_json(&request, self.options()).await
    }
}
