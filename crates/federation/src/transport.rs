//! Outbound HTTP transport.
//!
//! Every network call the engine makes goes through [`Transport`], so tests
//! can substitute a recording fake (see `test_utils::MockTransport`).

#![allow(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tern_common::AppError;
use tracing::debug;
use url::Url;

/// Largest response body read from a remote server. Actor documents and
/// `WebFinger` replies are a few KiB.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Transport error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        Self::ExternalService(e.to_string())
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Uppercase method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// A GET with an `Accept` header.
    #[must_use]
    pub fn get(url: Url, accept: &str, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: vec![("Accept".to_string(), accept.to_string())],
            body: None,
            timeout,
        }
    }

    /// A POST carrying `body`.
    #[must_use]
    pub const fn post(url: Url, body: Vec<u8>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body: Some(body),
            timeout,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, matched case-insensitively.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response. Any status, including 4xx/5xx, is a successful transport call.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Body as lossy UTF-8, for logs.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests and returns responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request, honoring `request.timeout`.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    user_agent: String,
    max_response_bytes: usize,
}

impl ReqwestTransport {
    /// Create a transport identifying itself as this instance.
    pub fn new(domain: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent(domain),
            max_response_bytes: MAX_RESPONSE_BYTES,
        })
    }

    /// Override the response size cap.
    #[must_use]
    pub const fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    /// The `User-Agent` sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Append `chunk` to `body` unless that would pass `limit`.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<(), TransportError> {
    if body.len().saturating_add(chunk.len()) > limit {
        return Err(TransportError::BodyTooLarge(limit));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

/// `tern/<version> (+https://{domain})`.
#[must_use]
pub fn user_agent(domain: &str) -> String {
    format!("tern/{} (+https://{domain})", env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = request.method.as_str(), url = %request.url, "Sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        builder = builder
            .timeout(request.timeout)
            .header("User-Agent", &self.user_agent);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();

        let limit = self.max_response_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(TransportError::BodyTooLarge(limit));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            append_capped(&mut body, &chunk, limit)?;
        }

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent() {
        let ua = user_agent("example.com");
        assert!(ua.starts_with("tern/"));
        assert!(ua.ends_with("(+https://example.com)"));
    }

    #[test]
    fn test_body_cap() {
        let mut body = Vec::new();
        append_capped(&mut body, b"abcd", 6).unwrap();
        append_capped(&mut body, b"ef", 6).unwrap();
        assert_eq!(body, b"abcdef");

        let err = append_capped(&mut body, b"g", 6).unwrap_err();
        assert_eq!(err, TransportError::BodyTooLarge(6));
        assert_eq!(body.len(), 6);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let url = Url::parse("https://remote.example/inbox").unwrap();
        let req = HttpRequest::post(url, Vec::new(), Duration::from_secs(1))
            .header("Content-Type", "application/activity+json");
        assert_eq!(
            req.header_value("content-type"),
            Some("application/activity+json")
        );
    }
}
