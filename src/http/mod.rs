//! HTTP layer: single-attempt executor with a hard timeout, and bounded
//! linear-backoff retry around it.

mod client;
mod retry;

pub use client::{ApiRequest, HttpClient, RequestOptions};
pub use retry::{RetryPolicy, with_retry};
