//! Canonical IRIs for local actors and objects.

use url::Url;

/// The `ActivityStreams` public collection.
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Builds every IRI this instance publishes.
///
/// All local IRIs live under `https://{domain}`; an actor's identity is
/// `https://{domain}/users/{username}` and the trailing path segment is how
/// the delivery queue finds the signing account again.
#[derive(Debug, Clone)]
pub struct LocalUris {
    domain: String,
}

impl LocalUris {
    /// Create a builder for `domain` (host, optionally with port).
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    /// The local domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Actor IRI of a local account.
    #[must_use]
    pub fn actor(&self, username: &str) -> String {
        format!("https://{}/users/{username}", self.domain)
    }

    /// Followers collection of a local account.
    #[must_use]
    pub fn followers(&self, username: &str) -> String {
        format!("{}/followers", self.actor(username))
    }

    /// IRI of a local note.
    #[must_use]
    pub fn note(&self, id: &str) -> String {
        format!("https://{}/notes/{id}", self.domain)
    }

    /// IRI of an outbound activity.
    #[must_use]
    pub fn activity(&self, id: &str) -> String {
        format!("https://{}/activities/{id}", self.domain)
    }

    /// IRI of a hashtag page.
    #[must_use]
    pub fn tag(&self, name: &str) -> String {
        format!("https://{}/tags/{}", self.domain, name.to_lowercase())
    }

    /// Whether `url` is served by this instance.
    #[must_use]
    pub fn is_local(&self, url: &Url) -> bool {
        authority(url).eq_ignore_ascii_case(&self.domain)
    }

    /// Whether a bare domain names this instance.
    #[must_use]
    pub fn is_local_domain(&self, domain: &str) -> bool {
        domain.eq_ignore_ascii_case(&self.domain)
    }
}

/// Public key id of an actor, used in `Signature` headers.
#[must_use]
pub fn key_id(actor_uri: &str) -> String {
    format!("{actor_uri}#main-key")
}

/// Host plus non-default port, as used for `Host` headers and home domains.
#[must_use]
pub fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Last non-empty path segment of a URL.
#[must_use]
pub fn last_path_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.rev().find(|s| !s.is_empty())
}
