//! Conversion service client: the endpoint operations, the sequential batch
//! orchestrator, and the wire/outcome types they exchange.

mod batch;
mod client;
mod types;

pub use batch::{BatchObserver, BatchResult, FnObserver, NoopObserver, convert_batch, run_batch};
pub use client::{
    CONVERT_DOWNLOAD_PATH, CONVERT_PATH, ConvertApi, ConverterClient, HEALTH_PATH, INFO_PATH,
    ROOT_PATH,
};
pub use types::{
    ConversionFailure, ConversionOutcome, ConvertResponse, ConvertedImage, HealthStatus,
    ImageInfo, ImageInfoResponse, ImageMetadata, Payload, ServiceInfo,
};
