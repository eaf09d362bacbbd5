//! The persistence interface the federation engine consumes.
//!
//! Components receive an `Arc<dyn Store>` at construction. Two
//! implementations ship with this crate: [`crate::MemoryStore`] and
//! [`crate::DbStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tern_common::AppError;

use crate::models::{
    Account, DeliveryItem, Follow, InboundActivity, Like, Note, RemoteActor,
};

/// Store error type.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Row not found: {0}")]
    NotFound(String),
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(msg) => Self::Database(msg),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
        }
    }
}

/// CRUD over every row the federation engine reads or writes.
///
/// Callers mint ids (see `tern_common::IdGenerator`); stores never do.
#[async_trait]
pub trait Store: Send + Sync {
    // === Accounts ===

    /// Find a local account by id.
    async fn find_account_by_id(&self, id: &str) -> StoreResult<Option<Account>>;

    /// Find a local account by username (case-sensitive).
    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Insert a local account. Fails with `Conflict` on a duplicate username.
    async fn insert_account(&self, account: Account) -> StoreResult<Account>;

    // === Remote actor cache ===

    /// Find a cached remote actor by identity URI.
    async fn find_remote_actor_by_uri(&self, uri: &str) -> StoreResult<Option<RemoteActor>>;

    /// Find a cached remote actor by surrogate id.
    async fn find_remote_actor_by_id(&self, id: &str) -> StoreResult<Option<RemoteActor>>;

    /// Insert or update keyed by `uri`.
    ///
    /// When a row with the same uri exists its id is kept and every other
    /// field is overwritten; the returned row carries the stored id.
    async fn upsert_remote_actor(&self, actor: RemoteActor) -> StoreResult<RemoteActor>;

    /// Administrative purge. Returns whether a row was removed.
    async fn purge_remote_actor(&self, uri: &str) -> StoreResult<bool>;

    // === Follows ===

    /// Find the follow from `account_id` to `target_id`.
    async fn find_follow(&self, account_id: &str, target_id: &str) -> StoreResult<Option<Follow>>;

    /// Find a follow by the id of its Follow activity.
    async fn find_follow_by_uri(&self, uri: &str) -> StoreResult<Option<Follow>>;

    /// Insert a follow. Fails with `Conflict` if the pair already exists.
    async fn insert_follow(&self, follow: Follow) -> StoreResult<Follow>;

    /// Mark a follow accepted.
    async fn set_follow_accepted(&self, id: &str) -> StoreResult<()>;

    /// Delete a follow. Deleting a missing row is not an error.
    async fn delete_follow(&self, id: &str) -> StoreResult<()>;

    /// Accepted follows whose target is `target_id`.
    async fn accepted_followers(&self, target_id: &str) -> StoreResult<Vec<Follow>>;

    // === Delivery queue ===

    /// Insert a queue row.
    async fn insert_delivery(&self, item: DeliveryItem) -> StoreResult<DeliveryItem>;

    /// Atomically select up to `limit` rows with `next_retry_at <= now` and
    /// push their `next_retry_at` to `lease_until`, so a concurrent claimer
    /// does not see them. Returns the rows as they were before the claim.
    async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<DeliveryItem>>;

    /// Record a failed attempt: bump `attempts` from `previous_attempts` and
    /// set the next due time. Compare-and-set on the attempt count; returns
    /// `false` and changes nothing when the row is gone or another worker
    /// already recorded this attempt.
    async fn reschedule_delivery(
        &self,
        id: &str,
        previous_attempts: u32,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Remove a queue row.
    async fn delete_delivery(&self, id: &str) -> StoreResult<()>;

    /// Remove every row targeting `inbox`. Returns the number removed.
    async fn purge_deliveries_for_inbox(&self, inbox: &str) -> StoreResult<u64>;

    /// Number of rows in the queue, due or not.
    async fn count_deliveries(&self) -> StoreResult<u64>;

    // === Notes ===

    /// Insert a local note.
    async fn insert_note(&self, note: Note) -> StoreResult<Note>;

    /// Find a local note by id.
    async fn find_note_by_id(&self, id: &str) -> StoreResult<Option<Note>>;

    /// Find a local note by IRI.
    async fn find_note_by_uri(&self, uri: &str) -> StoreResult<Option<Note>>;

    /// Replace a note's mutable fields.
    async fn update_note(&self, note: Note) -> StoreResult<Note>;

    /// Delete a note.
    async fn delete_note(&self, id: &str) -> StoreResult<()>;

    // === Inbound activities ===

    /// Record an activity received from a remote server.
    async fn insert_inbound_activity(&self, activity: InboundActivity) -> StoreResult<()>;

    /// Most recent inbound Create or Update whose object is `object_uri`.
    /// Announces, Likes and other activities about the object are ignored,
    /// so the result names the object's author.
    async fn find_authoring_activity(
        &self,
        object_uri: &str,
    ) -> StoreResult<Option<InboundActivity>>;

    // === Likes ===

    /// Insert a like.
    async fn insert_like(&self, like: Like) -> StoreResult<Like>;

    /// Find the like from `account_id` on `object_uri`.
    async fn find_like(&self, account_id: &str, object_uri: &str) -> StoreResult<Option<Like>>;

    /// Delete a like.
    async fn delete_like(&self, id: &str) -> StoreResult<()>;
}
