//! Client for a HEIC/HEIF conversion service.
//!
//! Uploads files as multipart requests with a hard per-attempt timeout,
//! retries transient failures with linear backoff, and converts batches
//! sequentially while reporting progress per file.
//!
//! ```rust,no_run
//! use heicconv::{ClientConfig, ConvertRequest, ConverterClient, FileRef, NoopObserver, TargetFormat};
//!
//! # async fn run() -> Result<(), heicconv::ClientError> {
//! let client = ConverterClient::new(ClientConfig::from_env())?;
//! let requests = vec![ConvertRequest::new(FileRef::open("IMG_0001.HEIC").await?, TargetFormat::Jpeg)];
//! let result = heicconv::convert_batch(&client, &requests, &NoopObserver).await;
//! println!("{}/{} converted", result.successful, result.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod http;
pub mod request;

pub use config::ClientConfig;
pub use converter::{
    BatchObserver, BatchResult, ConversionFailure, ConversionOutcome, ConvertApi,
    ConvertedImage, ConverterClient, FnObserver, ImageMetadata, NoopObserver, convert_batch,
    run_batch,
};
pub use error::{ClientError, ErrorKind};
pub use http::{RequestOptions, RetryPolicy};
pub use request::{ConvertRequest, FileRef, TargetFormat};
