//! Domain rows exchanged through [`crate::Store`].

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local account. Owns the signing key for everything it publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    /// PKCS#8 (or legacy PKCS#1) PEM.
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub created_at: DateTime<Utc>,
}

/// Cached copy of a remote actor document.
///
/// `id` is a local surrogate that other rows point at; it survives refetches.
/// `uri` is the actor's identity and the lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteActor {
    pub id: String,
    pub uri: String,
    pub username: String,
    /// Home domain, taken from the authority of `uri`.
    pub host: String,
    pub inbox: String,
    pub shared_inbox: Option<String>,
    pub outbox: Option<String>,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    pub avatar_url: Option<String>,
    pub public_key_pem: String,
    pub last_fetched_at: DateTime<Utc>,
}

impl RemoteActor {
    /// The inbox deliveries should go to: the shared inbox when the server
    /// advertises one, otherwise the personal inbox.
    #[must_use]
    pub fn delivery_inbox(&self) -> &str {
        self.shared_inbox.as_deref().unwrap_or(&self.inbox)
    }
}

/// A follow relationship. Either side may be local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    /// The follower.
    pub account_id: String,
    /// The followee.
    pub target_id: String,
    /// Id of the Follow activity that created the relationship.
    pub uri: String,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

/// A row in the outbound delivery queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub id: String,
    pub inbox: String,
    /// Serialized activity, stored verbatim.
    pub payload: String,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Note visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    /// Public but kept off public timelines.
    Unlisted,
    Followers,
}

impl Visibility {
    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Followers => "followers",
        }
    }

    /// Parse the column representation. Unknown values fall back to the most
    /// restrictive visibility.
    #[must_use]
    pub fn from_column(value: &str) -> Self {
        match value {
            "public" => Self::Public,
            "unlisted" => Self::Unlisted,
            _ => Self::Followers,
        }
    }
}

/// A note authored by a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub account_id: String,
    pub uri: String,
    /// Source text as typed.
    pub source: String,
    /// Rendered, sanitized HTML.
    pub content: String,
    pub visibility: Visibility,
    pub in_reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An activity received from a remote server, kept for addressing lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundActivity {
    pub id: String,
    pub uri: String,
    pub activity_type: String,
    pub actor_uri: String,
    pub object_uri: String,
    pub received_at: DateTime<Utc>,
}

impl InboundActivity {
    /// Activity types whose actor is the author of their object.
    pub const AUTHORING_TYPES: [&'static str; 2] = ["Create", "Update"];

    /// Whether this activity's actor authored its object.
    #[must_use]
    pub fn is_authoring(&self) -> bool {
        Self::AUTHORING_TYPES.contains(&self.activity_type.as_str())
    }
}

/// A Like sent by a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub account_id: String,
    pub object_uri: String,
    /// Id of the Like activity, needed to Undo it.
    pub uri: String,
    pub created_at: DateTime<Utc>,
}
