//! HTTP Client Abstraction
//!
//! The core only reads from the network: media-server catalog calls are
//! buffered GET requests ([`HttpClient::execute`]), while stream-cache fills
//! and download transfers read the audio body incrementally
//! ([`HttpClient::download_stream`]).

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// A buffered GET request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Overrides the client's default request timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn accept_json(self) -> Self {
        self.header("Accept", "application/json")
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 and 5xx: worth another attempt after a pause
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

/// Streamed response body
///
/// `content_length` comes from the `Content-Length` header when the server
/// sends one; download progress falls back to the catalog size otherwise.
pub struct HttpStream {
    pub content_length: Option<u64>,
    pub reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
}

impl HttpStream {
    pub fn new(
        content_length: Option<u64>,
        reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
    ) -> Self {
        Self {
            content_length,
            reader,
        }
    }

    /// Wrap an in-memory body, mostly useful for tests and mocks
    pub fn from_bytes(body: Bytes) -> Self {
        let len = body.len() as u64;
        Self::new(Some(len), Box::new(std::io::Cursor::new(body)))
    }
}

impl fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStream")
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// How often, and how patiently, a buffered request is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Pause before attempt `attempt + 1`: doubles from `base_delay`, capped at `max_delay`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Network access provided by the host.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn ping(client: &dyn HttpClient, base: &str) -> Result<bool> {
///     let response = client.execute(HttpRequest::get(format!("{}rest/ping", base))).await?;
///     Ok(response.is_success())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a buffered request with the client's default retry behavior.
    ///
    /// Non-2xx responses are returned, not turned into errors; transport
    /// failures (DNS, TLS, timeout) are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Like [`execute`](Self::execute) with an explicit retry policy
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Open a streamed GET download
    ///
    /// Non-2xx responses are errors. The body is not buffered, so audio files
    /// can be copied to disk chunk by chunk.
    async fn download_stream(&self, url: String) -> Result<HttpStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://music.example.com/rest/ping")
            .accept_json()
            .bearer_token("jwt")
            .timeout(Duration::from_secs(15));

        assert_eq!(request.url, "https://music.example.com/rest/ping");
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer jwt")
        );
        assert_eq!(
            request.headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_response_classification() {
        assert!(HttpResponse::new(204, Bytes::new()).is_success());
        assert!(!HttpResponse::new(404, Bytes::new()).is_retryable());
        assert!(HttpResponse::new(429, Bytes::new()).is_retryable());
        assert!(HttpResponse::new(502, Bytes::new()).is_retryable());
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse::new(200, r#"{"status":"ok"}"#);
        let value: HashMap<String, String> = response.json().unwrap();
        assert_eq!(value["status"], "ok");

        assert!(HttpResponse::new(200, "not json").json::<HashMap<String, String>>().is_err());
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(8), Duration::from_millis(500));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_stream_from_bytes() {
        use tokio::io::AsyncReadExt;

        let mut stream = HttpStream::from_bytes(Bytes::from_static(b"ID3 audio"));
        assert_eq!(stream.content_length, Some(9));

        let mut body = Vec::new();
        stream.reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"ID3 audio");
    }
}
