//! HTTP client on top of `reqwest`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpRequest, HttpResponse, HttpStream, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("musicboom/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based [`HttpClient`].
///
/// Catalog requests are buffered and retried on 5xx/429 with exponential
/// backoff. Audio downloads are streamed and never retried here; the caller
/// owns cancellation and cleanup of partial files.
pub struct ReqwestHttpClient {
    client: Client,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Client with a custom timeout for buffered requests.
    ///
    /// Streamed downloads are bounded by the connect timeout only, since a
    /// single track can take minutes on a slow link.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client configuration");
                Client::new()
            });

        Self::with_client(client).request_timeout(timeout)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Policy used by [`HttpClient::execute`]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .get(&request.url)
            .timeout(request.timeout.unwrap_or(self.request_timeout));
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(Self::map_send_error)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;

        Ok(HttpResponse::new(status, body))
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, self.retry_policy.clone())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(attempt, max_attempts = attempts, "Sending HTTP request");

            match self.send_once(&request).await {
                Ok(response) if !response.is_retryable() || attempt >= attempts => {
                    return Ok(response)
                }
                Ok(response) => {
                    warn!(status = response.status, attempt, "Retryable HTTP status");
                }
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                }
            }

            let delay = policy.delay_after(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn download_stream(&self, url: String) -> Result<HttpStream> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP error: {}",
                response.status().as_u16()
            )));
        }

        let content_length = response.content_length();
        debug!(?content_length, "Opened download stream");

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(HttpStream::new(content_length, Box::new(reader)))
    }
}
