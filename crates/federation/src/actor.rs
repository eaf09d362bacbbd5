//! Remote actor resolution with a store-backed cache.
//!
//! Actors are fetched over HTTP and upserted into the store keyed by their
//! URI. A cached row is served until it is older than the TTL (24 hours by
//! default); Update activities can force a refetch via
//! [`ActorResolver::invalidate`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tern_common::config::FederationConfig;
use tern_common::{AppError, Clock, IdGenerator, authority, last_path_segment};
use tern_db::{RemoteActor, Store, StoreError};
use tracing::{debug, info};
use url::Url;

use crate::transport::{HttpRequest, Transport, TransportError};

const ACTIVITY_ACCEPT: &str = "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Actor resolution error.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Actor fetch transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Actor fetch returned status {0}")]
    Status(u16),
    #[error("Actor document is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("Actor document is missing `{0}`")]
    MissingField(&'static str),
    #[error("Invalid actor URI: {0}")]
    InvalidUri(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ActorError> for AppError {
    fn from(e: ActorError) -> Self {
        match e {
            ActorError::Transport(t) => t.into(),
            ActorError::Store(s) => s.into(),
            ActorError::MissingField(_) | ActorError::MalformedJson(_) => {
                Self::Federation(e.to_string())
            }
            ActorError::InvalidUri(msg) => Self::BadRequest(msg),
            ActorError::Status(_) => Self::ExternalService(e.to_string()),
        }
    }
}

/// Fields read from an actor document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorDocument {
    /// `id`.
    pub id: String,
    /// `preferredUsername`, or the last path segment of the URI.
    pub username: String,
    /// `inbox`.
    pub inbox: String,
    /// `endpoints.sharedInbox`.
    pub shared_inbox: Option<String>,
    /// `outbox`.
    pub outbox: Option<String>,
    /// `name`.
    pub display_name: Option<String>,
    /// `summary`.
    pub summary: Option<String>,
    /// `icon.url`, or `icon` when it is a bare string.
    pub avatar_url: Option<String>,
    /// `publicKey.publicKeyPem`.
    pub public_key_pem: String,
}

fn str_field(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(Value::as_str).map(String::from)
}

impl ActorDocument {
    /// Read an actor document fetched from `uri`.
    pub fn parse(uri: &Url, json: &Value) -> Result<Self, ActorError> {
        let id = str_field(json, "id").ok_or(ActorError::MissingField("id"))?;
        let inbox = str_field(json, "inbox").ok_or(ActorError::MissingField("inbox"))?;
        let public_key_pem = json
            .get("publicKey")
            .and_then(|k| k.get("publicKeyPem"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or(ActorError::MissingField("publicKey.publicKeyPem"))?;

        let username = str_field(json, "preferredUsername")
            .or_else(|| last_path_segment(uri).map(String::from))
            .ok_or(ActorError::MissingField("preferredUsername"))?;

        let shared_inbox = json
            .get("endpoints")
            .and_then(|e| e.get("sharedInbox"))
            .and_then(Value::as_str)
            .map(String::from);

        let avatar_url = json
            .get("icon")
            .and_then(|icon| {
                if icon.is_object() {
                    icon.get("url").and_then(Value::as_str)
                } else {
                    icon.as_str()
                }
            })
            .map(String::from);

        Ok(Self {
            id,
            username,
            inbox,
            shared_inbox,
            outbox: str_field(json, "outbox"),
            display_name: str_field(json, "name"),
            summary: str_field(json, "summary"),
            avatar_url,
            public_key_pem,
        })
    }
}

/// Resolves remote actors, caching them in the store.
#[derive(Clone)]
pub struct ActorResolver {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
    ttl: chrono::Duration,
    timeout: Duration,
}

impl ActorResolver {
    /// Create a resolver. `ttl` bounds how long a cached row is served;
    /// `timeout` applies to each fetch.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            id_gen: IdGenerator::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            timeout,
        }
    }

    /// Resolver with the TTL and fetch timeout from the `federation` config
    /// section.
    #[must_use]
    pub fn from_config(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: &FederationConfig,
    ) -> Self {
        Self::new(
            store,
            transport,
            clock,
            config.actor_ttl(),
            config.fetch_timeout(),
        )
    }

    /// Fetch `uri` and upsert it into the cache, keeping the existing
    /// surrogate id when the actor is already known.
    pub async fn fetch(&self, uri: &Url) -> Result<RemoteActor, ActorError> {
        debug!(actor_url = %uri, "Fetching remote actor");

        let response = self
            .transport
            .execute(HttpRequest::get(uri.clone(), ACTIVITY_ACCEPT, self.timeout))
            .await?;

        if !response.is_success() {
            return Err(ActorError::Status(response.status));
        }

        let json: Value = serde_json::from_slice(&response.body)
            .map_err(|e| ActorError::MalformedJson(e.to_string()))?;
        let doc = ActorDocument::parse(uri, &json)?;

        let host = authority(uri);
        if host.is_empty() {
            return Err(ActorError::InvalidUri(uri.to_string()));
        }

        let id = match self.store.find_remote_actor_by_uri(uri.as_str()).await? {
            Some(existing) => existing.id,
            None => self.id_gen.generate(),
        };

        let actor = self
            .store
            .upsert_remote_actor(RemoteActor {
                id,
                uri: uri.to_string(),
                username: doc.username,
                host,
                inbox: doc.inbox,
                shared_inbox: doc.shared_inbox,
                outbox: doc.outbox,
                display_name: doc.display_name,
                summary: doc.summary,
                avatar_url: doc.avatar_url,
                public_key_pem: doc.public_key_pem,
                last_fetched_at: self.clock.now(),
            })
            .await?;

        info!(
            actor_id = %actor.id,
            username = %actor.username,
            host = %actor.host,
            "Cached remote actor"
        );

        Ok(actor)
    }

    /// Cached actor if fresh, otherwise a fetch.
    pub async fn get_or_fetch(&self, uri: &Url) -> Result<RemoteActor, ActorError> {
        if let Some(cached) = self.store.find_remote_actor_by_uri(uri.as_str()).await? {
            if self.is_fresh(cached.last_fetched_at) {
                debug!(actor_url = %uri, "Remote actor cache hit");
                return Ok(cached);
            }
            debug!(actor_url = %uri, "Remote actor cache entry is stale");
        }
        self.fetch(uri).await
    }

    /// Same as [`Self::get_or_fetch`].
    pub async fn refresh_if_stale(&self, uri: &Url) -> Result<RemoteActor, ActorError> {
        self.get_or_fetch(uri).await
    }

    /// Mark a cached actor stale so the next lookup refetches it.
    /// Returns whether the actor was cached.
    pub async fn invalidate(&self, uri: &str) -> Result<bool, ActorError> {
        let Some(mut cached) = self.store.find_remote_actor_by_uri(uri).await? else {
            return Ok(false);
        };
        cached.last_fetched_at = DateTime::<Utc>::UNIX_EPOCH;
        self.store.upsert_remote_actor(cached).await?;
        debug!(actor_url = %uri, "Invalidated remote actor cache entry");
        Ok(true)
    }

    fn is_fresh(&self, last_fetched_at: DateTime<Utc>) -> bool {
        self.clock.now() - last_fetched_at < self.ttl
    }
}
