//! Test doubles for the federation engine.
//!
//! [`MockTransport`] serves canned responses per URL and records every
//! request; [`RecordingDelivery`] captures what the publisher queues.
//! Both are used by this crate's tests and by the queue crate's
//! integration tests.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rsa::pkcs1v15::VerifyingKey;
use serde_json::{Value, json};
use sha2::Sha256;
use signature::Verifier;
use tern_common::{AppError, AppResult};
use tern_common::crypto::parse_public_key;

use crate::activities::Activity;
use crate::delivery::ActivityDelivery;
use crate::signature::{SIGNED_HEADERS, signing_string, verify_digest};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
enum Canned {
    Response(u16, Vec<u8>),
    Error(TransportError),
}

/// Transport that answers from a URL table.
///
/// Unregistered URLs fail with [`TransportError::Connect`]. Responses are
/// served for every matching request until replaced.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for `url`.
    pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        lock(&self.routes).insert(url.to_string(), Canned::Response(status, body.into()));
    }

    /// Serve a JSON document for `url`.
    pub fn respond_json(&self, url: &str, status: u16, body: &Value) {
        self.respond(url, status, body.to_string());
    }

    /// Fail requests to `url` with `error`.
    pub fn fail(&self, url: &str, error: TransportError) {
        lock(&self.routes).insert(url.to_string(), Canned::Error(error));
    }

    /// Every request seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Requests whose URL is `url`.
    #[must_use]
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.url.as_str() == url)
            .cloned()
            .collect()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let canned = lock(&self.routes).get(request.url.as_str()).cloned();
        let url = request.url.to_string();
        lock(&self.requests).push(request);

        match canned {
            Some(Canned::Response(status, body)) => Ok(HttpResponse { status, body }),
            Some(Canned::Error(e)) => Err(e),
            None => Err(TransportError::Connect(format!("no route to {url}"))),
        }
    }
}

/// [`ActivityDelivery`] that records instead of queueing.
///
/// After [`RecordingDelivery::set_failing`] every hand-over is refused and
/// nothing is recorded.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    deliveries: Mutex<Vec<(Activity, Vec<String>)>>,
    failing: AtomicBool,
}

impl RecordingDelivery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(activity, inboxes)` pair handed over.
    #[must_use]
    pub fn deliveries(&self) -> Vec<(Activity, Vec<String>)> {
        lock(&self.deliveries).clone()
    }

    /// Refuse (or accept again) every following hand-over.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The most recent hand-over.
    #[must_use]
    pub fn last(&self) -> Option<(Activity, Vec<String>)> {
        lock(&self.deliveries).last().cloned()
    }
}

#[async_trait]
impl ActivityDelivery for RecordingDelivery {
    async fn deliver(&self, activity: &Activity, inboxes: Vec<String>) -> AppResult<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Queue("delivery queue unavailable".to_string()));
        }
        let count = inboxes.len();
        lock(&self.deliveries).push((activity.clone(), inboxes));
        Ok(count)
    }
}

/// A minimal actor document as served by Mastodon-like servers.
#[must_use]
pub fn actor_document(uri: &str, username: &str, public_key_pem: &str) -> Value {
    json!({
        "@context": ["https://www.w3.org/ns/activitystreams", "https://w3id.org/security/v1"],
        "id": uri,
        "type": "Person",
        "preferredUsername": username,
        "inbox": format!("{uri}/inbox"),
        "outbox": format!("{uri}/outbox"),
        "followers": format!("{uri}/followers"),
        "publicKey": {
            "id": format!("{uri}#main-key"),
            "owner": uri,
            "publicKeyPem": public_key_pem
        }
    })
}

/// A `WebFinger` response pointing at `actor_uri`.
#[must_use]
pub fn webfinger_document(acct: &str, actor_uri: &str) -> Value {
    json!({
        "subject": format!("acct:{acct}"),
        "links": [
            {"rel": "self", "type": "application/activity+json", "href": actor_uri}
        ]
    })
}

/// `WebFinger` URL the resolver requests for `user@domain`.
#[must_use]
pub fn webfinger_url(username: &str, domain: &str) -> String {
    format!(
        "https://{domain}/.well-known/webfinger?resource=acct%3A{username}%40{domain}"
    )
}

/// Check a signed request the way a receiving server would: the digest
/// matches the body and the signature verifies over the fixed header set.
#[must_use]
pub fn verify_signed_request(public_key_pem: &str, request: &HttpRequest) -> bool {
    let (Some(host), Some(date), Some(digest), Some(signature)) = (
        request.header_value("Host"),
        request.header_value("Date"),
        request.header_value("Digest"),
        request.header_value("Signature"),
    ) else {
        return false;
    };

    if !verify_digest(request.body.as_deref().unwrap_or_default(), digest) {
        return false;
    }

    let params: HashMap<&str, &str> = signature
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')))
        .collect();
    if params.get("headers") != Some(&SIGNED_HEADERS) {
        return false;
    }
    let Some(raw) = params.get("signature").and_then(|s| BASE64.decode(s).ok()) else {
        return false;
    };

    let Ok(public_key) = parse_public_key(public_key_pem) else {
        return false;
    };
    let Ok(sig) = rsa::pkcs1v15::Signature::try_from(raw.as_slice()) else {
        return false;
    };

    let expected = signing_string(
        request.method.as_str(),
        &request.url,
        host,
        date,
        digest,
    );
    VerifyingKey::<Sha256>::new(public_key)
        .verify(expected.as_bytes(), &sig)
        .is_ok()
}
