//! Outbound activity publishing.
//!
//! The [`Publisher`] turns local actions into activities: it resolves
//! addressing (followers, reply parents, mentions), persists the local side
//! of the action, and hands one delivery per destination inbox to the queue
//! through [`ActivityDelivery`]. It never waits on delivery itself.

mod follow;
mod inbound;
mod like;
mod note;

pub use note::{NoteDraft, Published};

use std::collections::HashSet;
use std::sync::Arc;

use tern_common::{
    AppError, Clock, Config, IdGenerator, LocalUris, PUBLIC_COLLECTION, last_path_segment,
};
use tern_db::{Account, Store, StoreError, Visibility};
use tracing::{debug, warn};
use url::Url;

use crate::activities::{Activity, ActivityError};
use crate::actor::{ActorError, ActorResolver};
use crate::delivery::ActivityDelivery;
use crate::transport::Transport;
use crate::webfinger::{WebFingerError, WebFingerResolver};

/// Publishing error.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("An account cannot follow itself")]
    SelfFollow,
    #[error("Already following")]
    AlreadyFollowing,
    #[error("Follow request is still pending")]
    FollowPending,
    #[error("Not following")]
    NotFollowing,
    #[error("Already liked")]
    AlreadyLiked,
    #[error("Not liked")]
    NotLiked,
    #[error("Only the author may modify this note")]
    NotOwner,
    #[error("Note not found: {0}")]
    NoteNotFound(String),
    #[error("Follow not found: {0}")]
    FollowNotFound(String),
    #[error("Unknown local account: {0}")]
    UnknownAccount(String),
    #[error("Cannot resolve the author of {0}")]
    UnknownAuthor(String),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    InvalidActivity(#[from] ActivityError),
    #[error(transparent)]
    Actor(#[from] ActorError),
    #[error(transparent)]
    WebFinger(#[from] WebFingerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to queue delivery: {0}")]
    Delivery(String),
}

impl From<PublishError> for AppError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::SelfFollow
            | PublishError::InvalidTarget(_)
            | PublishError::UnknownAuthor(_) => Self::BadRequest(e.to_string()),
            PublishError::AlreadyFollowing
            | PublishError::FollowPending
            | PublishError::AlreadyLiked => Self::Conflict(e.to_string()),
            PublishError::NotFollowing
            | PublishError::NotLiked
            | PublishError::NoteNotFound(_)
            | PublishError::FollowNotFound(_)
            | PublishError::UnknownAccount(_) => Self::NotFound(e.to_string()),
            PublishError::NotOwner => Self::Forbidden(e.to_string()),
            PublishError::InvalidActivity(a) => a.into(),
            PublishError::Actor(a) => a.into(),
            PublishError::WebFinger(w) => w.into(),
            PublishError::Store(s) => s.into(),
            PublishError::Delivery(msg) => Self::Queue(msg),
        }
    }
}

/// Publish result type.
pub type PublishResult<T> = Result<T, PublishError>;

/// An actor an activity is addressed to, with the inbox to deliver to when
/// the actor is remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Recipient {
    pub uri: String,
    pub inbox: Option<String>,
}

/// Builds and fans out activities for local accounts.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn Store>,
    actors: ActorResolver,
    webfinger: WebFingerResolver,
    delivery: Arc<dyn ActivityDelivery>,
    clock: Arc<dyn Clock>,
    uris: LocalUris,
    id_gen: IdGenerator,
}

impl Publisher {
    /// Create a publisher for the local domain in `uris`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        actors: ActorResolver,
        webfinger: WebFingerResolver,
        delivery: Arc<dyn ActivityDelivery>,
        clock: Arc<dyn Clock>,
        uris: LocalUris,
    ) -> Self {
        Self {
            store,
            actors,
            webfinger,
            delivery,
            clock,
            uris,
            id_gen: IdGenerator::new(),
        }
    }

    /// Publisher for `server.domain`, with resolvers tuned by the
    /// `federation` config section.
    #[must_use]
    pub fn from_config(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        delivery: Arc<dyn ActivityDelivery>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let actors = ActorResolver::from_config(
            store.clone(),
            transport.clone(),
            clock.clone(),
            &config.federation,
        );
        let webfinger = WebFingerResolver::from_config(transport, &config.federation);
        Self::new(
            store,
            actors,
            webfinger,
            delivery,
            clock,
            LocalUris::new(&config.server.domain),
        )
    }

    /// Local IRI builder.
    #[must_use]
    pub const fn uris(&self) -> &LocalUris {
        &self.uris
    }

    /// A fresh activity id.
    fn new_activity_id(&self) -> String {
        self.uris.activity(&self.id_gen.generate())
    }

    /// Validate and hand over. An empty inbox set queues nothing.
    async fn dispatch(&self, activity: &Activity, inboxes: Vec<String>) -> PublishResult<usize> {
        activity.validate()?;
        if inboxes.is_empty() {
            debug!(activity_id = activity.id().unwrap_or_default(), "No remote recipients");
            return Ok(0);
        }
        self.delivery
            .deliver(activity, inboxes)
            .await
            .map_err(|e| PublishError::Delivery(e.to_string()))
    }

    /// The local account an IRI on this domain names, if any.
    async fn local_account_for(&self, url: &Url) -> PublishResult<Option<Account>> {
        let Some(username) = last_path_segment(url) else {
            return Ok(None);
        };
        if !self.uris.is_local(url) || self.uris.actor(username) != url.as_str() {
            return Ok(None);
        }
        Ok(self.store.find_account_by_username(username).await?)
    }

    /// Resolve the author of an object: first from a recorded inbound
    /// Create or Update of it, then from local notes. `None` when neither
    /// knows.
    async fn resolve_object_author(&self, object_uri: &str) -> PublishResult<Option<Recipient>> {
        if let Some(inbound) = self.store.find_authoring_activity(object_uri).await? {
            return Ok(Some(self.recipient_for_actor(&inbound.actor_uri).await));
        }

        if let Some(note) = self.store.find_note_by_uri(object_uri).await? {
            if let Some(author) = self.store.find_account_by_id(&note.account_id).await? {
                return Ok(Some(Recipient {
                    uri: self.uris.actor(&author.username),
                    inbox: None,
                }));
            }
        }

        Ok(None)
    }

    /// Addressing entry for an actor URI. Remote actors are resolved for
    /// their delivery inbox; a failed resolution keeps the URI and drops the
    /// inbox.
    async fn recipient_for_actor(&self, actor_uri: &str) -> Recipient {
        let Ok(url) = Url::parse(actor_uri) else {
            warn!(actor_uri = %actor_uri, "Ignoring unparseable actor URI");
            return Recipient {
                uri: actor_uri.to_string(),
                inbox: None,
            };
        };
        if self.uris.is_local(&url) {
            return Recipient {
                uri: actor_uri.to_string(),
                inbox: None,
            };
        }
        match self.actors.get_or_fetch(&url).await {
            Ok(actor) => Recipient {
                uri: actor.uri.clone(),
                inbox: Some(actor.delivery_inbox().to_string()),
            },
            Err(e) => {
                warn!(actor_uri = %actor_uri, error = %e, "Could not resolve actor inbox");
                Recipient {
                    uri: actor_uri.to_string(),
                    inbox: None,
                }
            }
        }
    }

    /// Delivery inboxes of an account's accepted remote followers, shared
    /// inbox preferred.
    async fn follower_inboxes(&self, account: &Account) -> PublishResult<Vec<String>> {
        let mut inboxes = Vec::new();
        for follow in self.store.accepted_followers(&account.id).await? {
            if let Some(actor) = self.store.find_remote_actor_by_id(&follow.account_id).await? {
                inboxes.push(actor.delivery_inbox().to_string());
            }
        }
        Ok(inboxes)
    }
}

/// `to`/`cc` for a note's visibility, before reply-parent and mentions.
pub(crate) fn base_addressing(visibility: Visibility, followers: String) -> (Vec<String>, Vec<String>) {
    let public = PUBLIC_COLLECTION.to_string();
    match visibility {
        Visibility::Public => (vec![public], vec![followers]),
        Visibility::Unlisted => (vec![followers], vec![public]),
        Visibility::Followers => (vec![followers], vec![]),
    }
}

/// Order-preserving dedup.
pub(crate) fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
