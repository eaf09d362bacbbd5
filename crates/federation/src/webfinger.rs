//! `WebFinger` client (RFC 7033) for resolving `@user@domain` handles.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tern_common::AppError;
use tern_common::config::FederationConfig;
use tracing::debug;
use url::Url;

use crate::transport::{HttpRequest, Transport, TransportError};

/// Media types accepted for the `self` link.
const ACTIVITY_TYPES: [&str; 2] = [
    "application/activity+json",
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
];

/// `WebFinger` error type.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum WebFingerError {
    #[error("No ActivityPub self link for {0}")]
    NoCompatibleLink(String),
    #[error("WebFinger returned status {0}")]
    Status(u16),
    #[error("WebFinger transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Malformed WebFinger response: {0}")]
    Malformed(String),
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl From<WebFingerError> for AppError {
    fn from(e: WebFingerError) -> Self {
        match e {
            WebFingerError::NoCompatibleLink(msg) => Self::NotFound(msg),
            WebFingerError::InvalidHandle(msg) => Self::BadRequest(msg),
            WebFingerError::Transport(t) => t.into(),
            other => Self::ExternalService(other.to_string()),
        }
    }
}

/// JRD document, reduced to what resolution reads.
#[derive(Debug, Deserialize)]
struct Jrd {
    #[serde(default)]
    links: Vec<JrdLink>,
}

#[derive(Debug, Deserialize)]
struct JrdLink {
    rel: String,
    #[serde(rename = "type")]
    link_type: Option<String>,
    href: Option<String>,
}

/// Split `@user@domain` (leading `@` optional) into its parts.
pub fn parse_handle(handle: &str) -> Result<(String, String), WebFingerError> {
    let trimmed = handle.trim().trim_start_matches('@');
    match trimmed.split_once('@') {
        Some((user, domain))
            if !user.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok((user.to_string(), domain.to_lowercase()))
        }
        _ => Err(WebFingerError::InvalidHandle(handle.to_string())),
    }
}

/// Resolves handles to actor URIs. No caching at this layer.
#[derive(Clone)]
pub struct WebFingerResolver {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl WebFingerResolver {
    /// Create a resolver with a per-request timeout.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Resolver with the timeout from the `federation` config section.
    #[must_use]
    pub fn from_config(transport: Arc<dyn Transport>, config: &FederationConfig) -> Self {
        Self::new(transport, config.webfinger_timeout())
    }

    /// Resolve `username@domain` to the actor URI.
    pub async fn resolve(&self, username: &str, domain: &str) -> Result<Url, WebFingerError> {
        let acct = format!("{username}@{domain}");
        let mut url = Url::parse(&format!("https://{domain}/.well-known/webfinger"))
            .map_err(|_| WebFingerError::InvalidHandle(acct.clone()))?;
        url.query_pairs_mut()
            .append_pair("resource", &format!("acct:{acct}"));

        debug!(acct = %acct, "Performing WebFinger lookup");

        let response = self
            .transport
            .execute(HttpRequest::get(url, "application/jrd+json", self.timeout))
            .await?;

        if !response.is_success() {
            return Err(WebFingerError::Status(response.status));
        }

        let jrd: Jrd = serde_json::from_slice(&response.body)
            .map_err(|e| WebFingerError::Malformed(e.to_string()))?;

        let href = jrd
            .links
            .into_iter()
            .find(|link| {
                link.rel == "self"
                    && link
                        .link_type
                        .as_deref()
                        .is_some_and(|t| ACTIVITY_TYPES.contains(&t))
            })
            .and_then(|link| link.href)
            .ok_or_else(|| WebFingerError::NoCompatibleLink(acct.clone()))?;

        Url::parse(&href).map_err(|e| WebFingerError::Malformed(format!("{href}: {e}")))
    }

    /// Resolve a `@user@domain` handle.
    pub async fn resolve_handle(&self, handle: &str) -> Result<Url, WebFingerError> {
        let (username, domain) = parse_handle(handle)?;
        self.resolve(&username, &domain).await
    }
}
