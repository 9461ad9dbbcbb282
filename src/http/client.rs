//! HTTP executor with a hard per-attempt timeout and retry on top.

use bytes::Bytes;
use log::debug;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::retry::{RetryPolicy, with_retry};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::UploadForm;

/// Timeout and retry settings for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl RequestOptions {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.timeout(), config.retry())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A request that can be sent more than once.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub form: Option<UploadForm>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            form: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: UploadForm) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            form: Some(form),
        }
    }
}

/// HTTP client with a per-attempt timeout and built-in retry.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// One attempt, no retry. The whole exchange including the body read
    /// must finish within `timeout`, otherwise the request is dropped and
    /// [`ClientError::Timeout`] is returned.
    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    pub async fn execute(&self, request: &ApiRequest, timeout: Duration) -> Result<Bytes> {
        with_deadline(&request.url, timeout, self.execute_once(request)).await
    }

    /// One attempt, decoding the body as JSON.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<T> {
        let body = self.execute(request, timeout).await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
            url: request.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Sends `request` under the retry policy and decodes a JSON body.
    #[tracing::instrument(skip(self, request, options), fields(url = %request.url))]
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        options: RequestOptions,
    ) -> Result<T> {
        let name = format!("{} {}", request.method, request.url);
        with_retry(options.retry, &name, || {
            self.execute_json::<T>(request, options.timeout)
        })
        .await
    }

    /// Sends `request` under the retry policy and returns the raw body.
    #[tracing::instrument(skip(self, request, options), fields(url = %request.url))]
    pub async fn send_bytes(&self, request: &ApiRequest, options: RequestOptions) -> Result<Bytes> {
        let name = format!("{} {}", request.method, request.url);
        with_retry(options.retry, &name, || {
            self.execute(request, options.timeout)
        })
        .await
    }

    async fn execute_once(&self, request: &ApiRequest) -> Result<Bytes> {
        debug!("{} {}...", request.method, request.url);

        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(form) = &request.form {
            builder = builder.multipart(form.to_multipart().await?);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| network_error(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Failed to read error body from {}: {}", request.url, e);
                    String::new()
                }
            };
            return Err(ClientError::from_status(
                &request.url,
                status.as_u16(),
                body,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(&request.url, e))?;
        debug!("{} {} -> {} ({} bytes)", request.method, request.url, status, body.len());
        Ok(body)
    }
}

/// Runs `fut` until it finishes or `timeout` elapses. On expiry both the
/// in-flight future and its timer are dropped before returning.
async fn with_deadline<T, F>(url: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_elapsed) => {
            debug!("{} timed out after {:?}", url, timeout);
            Err(ClientError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

fn network_error(url: &str, source: reqwest::Error) -> ClientError {
    ClientError::Network {
        url: url.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ConvertRequest, FileRef, TargetFormat, build_convert_form};
    use mockito::Matcher;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn fast_options(attempts: u32) -> RequestOptions {
        RequestOptions::new(
            Duration::from_secs(5),
            RetryPolicy::new(attempts, Duration::from_millis(1)),
        )
    }

    /// Accepts connections and never answers.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_execute_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "ok"}"#)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let request = ApiRequest::get(format!("{}/health", server.url()));
        let value: serde_json::Value = client
            .execute_json(&request, Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_execute_client_error_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("no such route")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let request = ApiRequest::get(format!("{}/missing", server.url()));
        let err = client
            .execute(&request, Duration::from_secs(5))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ClientError::HttpClient { status: 404, .. }));
        assert_eq!(err.detail(), Some("no such route"));
    }

    #[tokio::test]
    async fn test_execute_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let err = client
            .execute(&ApiRequest::get(server.url()), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::HttpServer { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_execute_json_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let err = client
            .execute_json::<serde_json::Value>(&ApiRequest::get(server.url()), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_execute_times_out_promptly() {
        let (url, server) = silent_server().await;
        let client = HttpClient::new(Client::new());

        let started = Instant::now();
        let err = client
            .execute(&ApiRequest::get(url), Duration::from_millis(50))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        server.abort();
        assert!(matches!(err, ClientError::Timeout { timeout_ms: 50, .. }));
        assert!(elapsed < Duration::from_millis(200), "took {:?}", elapsed);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_drops_pending_work_and_timer() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let stalled = async move {
            let _guard = guard;
            std::future::pending::<Result<()>>().await
        };

        let started = tokio::time::Instant::now();
        let err = with_deadline("http://stalled", Duration::from_millis(50), stalled)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { timeout_ms: 50, .. }));
        assert_eq!(started.elapsed(), Duration::from_millis(50));
        assert!(dropped.load(Ordering::SeqCst));

        // Nothing is left armed: the next timer to fire is this one.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(started.elapsed(), Duration::from_millis(50) + Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_early_result() {
        let value = with_deadline("http://fast", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_truncated_error_body_still_reports_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 100\r\n\r\npartial")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = HttpClient::new(Client::new());
        let err = client
            .execute(
                &ApiRequest::get(format!("http://{}/convert", addr)),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, ClientError::HttpServer { status: 502, .. }));
        assert_eq!(err.detail(), None);
    }

    #[tokio::test]
    async fn test_execute_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::new(Client::new());
        let err = client
            .execute(
                &ApiRequest::get(format!("http://{}/health", addr)),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Network { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_post_form_sends_multipart_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/convert-download")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"filename="a\.heic""#.to_string()),
                Matcher::Regex(r#"name="format"\r\n\r\npng"#.to_string()),
                Matcher::Regex(r#"name="quality"\r\n\r\n0\.5"#.to_string()),
                Matcher::Regex("HEICDATA".to_string()),
            ]))
            .with_status(200)
            .with_body("PNGBYTES")
            .create_async()
            .await;

        let config = crate::config::ClientConfig::default();
        let request = ConvertRequest::new(
            FileRef::from_bytes("a.heic", b"HEICDATA".to_vec()),
            TargetFormat::Png,
        )
        .with_quality(0.5);
        let form = build_convert_form(&config, &request).unwrap();

        let client = HttpClient::new(Client::new());
        let body = client
            .send_bytes(
                &ApiRequest::post_form(format!("{}/api/v1/convert-download", server.url()), form),
                fast_options(0),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], b"PNGBYTES");
    }

    #[tokio::test]
    async fn test_send_retries_server_errors_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(500)
            .with_body("still broken")
            .expect(4)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let err = client
            .send_json::<serde_json::Value>(
                &ApiRequest::get(format!("{}/flaky", server.url())),
                fast_options(3),
            )
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.detail(), Some("still broken"));
    }

    #[tokio::test]
    async fn test_send_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let err = client
            .send_json::<serde_json::Value>(
                &ApiRequest::get(format!("{}/gone", server.url())),
                fast_options(3),
            )
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_send_retries_timeouts() {
        let (url, server) = silent_server().await;
        let client = HttpClient::new(Client::new());

        let started = Instant::now();
        let err = client
            .send_bytes(
                &ApiRequest::get(url),
                RequestOptions::new(
                    Duration::from_millis(30),
                    RetryPolicy::new(2, Duration::from_millis(5)),
                ),
            )
            .await
            .unwrap_err();

        server.abort();
        assert!(matches!(err, ClientError::Timeout { .. }));
        // three 30ms attempts plus 5ms + 10ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(105));
    }
}
