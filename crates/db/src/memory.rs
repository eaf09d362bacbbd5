//! In-process [`Store`] implementation.
//!
//! Backs tests and single-process development runs (`database.url =
//! "memory"`). All tables sit behind one lock, which makes every trait
//! method, including the queue claim, atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    Account, DeliveryItem, Follow, InboundActivity, Like, Note, RemoteActor,
};
use crate::store::{Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    remote_actors: HashMap<String, RemoteActor>,
    follows: HashMap<String, Follow>,
    // Ordered by id; ULIDs make this roughly insertion order.
    deliveries: BTreeMap<String, DeliveryItem>,
    notes: HashMap<String, Note>,
    inbound: Vec<InboundActivity>,
    likes: HashMap<String, Like>,
}

/// Memory-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the delivery queue, oldest first.
    pub async fn deliveries(&self) -> Vec<DeliveryItem> {
        self.tables.read().await.deliveries.values().cloned().collect()
    }

    /// Snapshot of every follow row.
    pub async fn follows(&self) -> Vec<Follow> {
        self.tables.read().await.follows.values().cloned().collect()
    }

    /// Snapshot of every local note.
    pub async fn notes(&self) -> Vec<Note> {
        self.tables.read().await.notes.values().cloned().collect()
    }

    /// Snapshot of every cached remote actor.
    pub async fn remote_actors(&self) -> Vec<RemoteActor> {
        self.tables.read().await.remote_actors.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_account_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(id).cloned())
    }

    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .tables
            .read()
            .await
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn insert_account(&self, account: Account) -> StoreResult<Account> {
        let mut tables = self.tables.write().await;
        if tables.accounts.values().any(|a| a.username == account.username) {
            return Err(StoreError::Conflict(format!(
                "account username {}",
                account.username
            )));
        }
        tables.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn find_remote_actor_by_uri(&self, uri: &str) -> StoreResult<Option<RemoteActor>> {
        Ok(self
            .tables
            .read()
            .await
            .remote_actors
            .values()
            .find(|a| a.uri == uri)
            .cloned())
    }

    async fn find_remote_actor_by_id(&self, id: &str) -> StoreResult<Option<RemoteActor>> {
        Ok(self.tables.read().await.remote_actors.get(id).cloned())
    }

    async fn upsert_remote_actor(&self, mut actor: RemoteActor) -> StoreResult<RemoteActor> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.remote_actors.values().find(|a| a.uri == actor.uri) {
            actor.id = existing.id.clone();
        }
        tables.remote_actors.insert(actor.id.clone(), actor.clone());
        Ok(actor)
    }

    async fn purge_remote_actor(&self, uri: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.remote_actors.len();
        tables.remote_actors.retain(|_, a| a.uri != uri);
        Ok(tables.remote_actors.len() != before)
    }

    async fn find_follow(&self, account_id: &str, target_id: &str) -> StoreResult<Option<Follow>> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .values()
            .find(|f| f.account_id == account_id && f.target_id == target_id)
            .cloned())
    }

    async fn find_follow_by_uri(&self, uri: &str) -> StoreResult<Option<Follow>> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .values()
            .find(|f| f.uri == uri)
            .cloned())
    }

    async fn insert_follow(&self, follow: Follow) -> StoreResult<Follow> {
        let mut tables = self.tables.write().await;
        if tables
            .follows
            .values()
            .any(|f| f.account_id == follow.account_id && f.target_id == follow.target_id)
        {
            return Err(StoreError::Conflict(format!(
                "follow {} -> {}",
                follow.account_id, follow.target_id
            )));
        }
        tables.follows.insert(follow.id.clone(), follow.clone());
        Ok(follow)
    }

    async fn set_follow_accepted(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let follow = tables
            .follows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("follow {id}")))?;
        follow.accepted = true;
        Ok(())
    }

    async fn delete_follow(&self, id: &str) -> StoreResult<()> {
        self.tables.write().await.follows.remove(id);
        Ok(())
    }

    async fn accepted_followers(&self, target_id: &str) -> StoreResult<Vec<Follow>> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .values()
            .filter(|f| f.target_id == target_id && f.accepted)
            .cloned()
            .collect())
    }

    async fn insert_delivery(&self, item: DeliveryItem) -> StoreResult<DeliveryItem> {
        self.tables
            .write()
            .await
            .deliveries
            .insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<DeliveryItem>> {
        let mut tables = self.tables.write().await;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut claimed = Vec::new();
        for item in tables.deliveries.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if item.next_retry_at <= now {
                claimed.push(item.clone());
                item.next_retry_at = lease_until;
            }
        }
        Ok(claimed)
    }

    async fn reschedule_delivery(
        &self,
        id: &str,
        previous_attempts: u32,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.deliveries.get_mut(id) {
            Some(item) if item.attempts == previous_attempts => {
                item.attempts = previous_attempts.saturating_add(1);
                item.next_retry_at = next_retry_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_delivery(&self, id: &str) -> StoreResult<()> {
        self.tables.write().await.deliveries.remove(id);
        Ok(())
    }

    async fn purge_deliveries_for_inbox(&self, inbox: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.deliveries.len();
        tables.deliveries.retain(|_, d| d.inbox != inbox);
        Ok((before - tables.deliveries.len()) as u64)
    }

    async fn count_deliveries(&self) -> StoreResult<u64> {
        Ok(self.tables.read().await.deliveries.len() as u64)
    }

    async fn insert_note(&self, note: Note) -> StoreResult<Note> {
        self.tables
            .write()
            .await
            .notes
            .insert(note.id.clone(), note.clone());
        Ok(note)
    }

    async fn find_note_by_id(&self, id: &str) -> StoreResult<Option<Note>> {
        Ok(self.tables.read().await.notes.get(id).cloned())
    }

    async fn find_note_by_uri(&self, uri: &str) -> StoreResult<Option<Note>> {
        Ok(self
            .tables
            .read()
            .await
            .notes
            .values()
            .find(|n| n.uri == uri)
            .cloned())
    }

    async fn update_note(&self, note: Note) -> StoreResult<Note> {
        let mut tables = self.tables.write().await;
        if !tables.notes.contains_key(&note.id) {
            return Err(StoreError::NotFound(format!("note {}", note.id)));
        }
        tables.notes.insert(note.id.clone(), note.clone());
        Ok(note)
    }

    async fn delete_note(&self, id: &str) -> StoreResult<()> {
        self.tables.write().await.notes.remove(id);
        Ok(())
    }

    async fn insert_inbound_activity(&self, activity: InboundActivity) -> StoreResult<()> {
        self.tables.write().await.inbound.push(activity);
        Ok(())
    }

    async fn find_authoring_activity(
        &self,
        object_uri: &str,
    ) -> StoreResult<Option<InboundActivity>> {
        Ok(self
            .tables
            .read()
            .await
            .inbound
            .iter()
            .filter(|a| a.object_uri == object_uri && a.is_authoring())
            .max_by_key(|a| a.received_at)
            .cloned())
    }

    async fn insert_like(&self, like: Like) -> StoreResult<Like> {
        let mut tables = self.tables.write().await;
        if tables
            .likes
            .values()
            .any(|l| l.account_id == like.account_id && l.object_uri == like.object_uri)
        {
            return Err(StoreError::Conflict(format!(
                "like {} -> {}",
                like.account_id, like.object_uri
            )));
        }
        tables.likes.insert(like.id.clone(), like.clone());
        Ok(like)
    }

    async fn find_like(&self, account_id: &str, object_uri: &str) -> StoreResult<Option<Like>> {
        Ok(self
            .tables
            .read()
            .await
            .likes
            .values()
            .find(|l| l.account_id == account_id && l.object_uri == object_uri)
            .cloned())
    }

    async fn delete_like(&self, id: &str) -> StoreResult<()> {
        self.tables.write().await.likes.remove(id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn actor(id: &str, uri: &str, name: &str) -> RemoteActor {
        RemoteActor {
            id: id.to_string(),
            uri: uri.to_string(),
            username: "bob".to_string(),
            host: "remote.example".to_string(),
            inbox: format!("{uri}/inbox"),
            shared_inbox: None,
            outbox: None,
            display_name: Some(name.to_string()),
            summary: None,
            avatar_url: None,
            public_key_pem: "pem".to_string(),
            last_fetched_at: Utc::now(),
        }
    }

    fn delivery(id: &str, inbox: &str, next_retry_at: DateTime<Utc>) -> DeliveryItem {
        DeliveryItem {
            id: id.to_string(),
            inbox: inbox.to_string(),
            payload: "{}".to_string(),
            attempts: 0,
            next_retry_at,
            created_at: next_retry_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_surrogate_id() {
        let store = MemoryStore::new();
        let uri = "https://remote.example/users/bob";

        let first = store.upsert_remote_actor(actor("id-1", uri, "Bob")).await.unwrap();
        let second = store
            .upsert_remote_actor(actor("id-2", uri, "Robert"))
            .await
            .unwrap();

        assert_eq!(first.id, "id-1");
        assert_eq!(second.id, "id-1");
        let stored = store.find_remote_actor_by_uri(uri).await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Robert"));
        assert_eq!(store.remote_actors().await.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_hides_rows_until_lease_expires() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_delivery(delivery("a", "https://x/inbox", now)).await.unwrap();
        store
            .insert_delivery(delivery("b", "https://y/inbox", now + Duration::minutes(5)))
            .await
            .unwrap();

        let lease = now + Duration::minutes(2);
        let claimed = store.claim_due_deliveries(now, 10, lease).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, "a");

        // A second claimer at the same instant sees nothing.
        assert!(store.claim_due_deliveries(now, 10, lease).await.unwrap().is_empty());

        // After the lease both are due.
        let later = now + Duration::minutes(10);
        let reclaimed = store
            .claim_due_deliveries(later, 10, later + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 2);
    }

    #[tokio::test]
    async fn test_reschedule_is_compare_and_set() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_delivery(delivery("a", "https://x/inbox", now)).await.unwrap();

        let later = now + Duration::minutes(1);
        assert!(store.reschedule_delivery("a", 0, later).await.unwrap());
        assert!(!store.reschedule_delivery("a", 0, later).await.unwrap());
        assert!(!store.reschedule_delivery("missing", 0, later).await.unwrap());

        let rows = store.deliveries().await;
        assert_eq!(rows[0].attempts, 1);
        assert_eq!(rows[0].next_retry_at, later);
    }

    #[tokio::test]
    async fn test_claim_respects_limit() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store
                .insert_delivery(delivery(&format!("d{i}"), "https://x/inbox", now))
                .await
                .unwrap();
        }
        let claimed = store
            .claim_due_deliveries(now, 3, now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 3);
    }

    #[tokio::test]
    async fn test_purge_by_inbox() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_delivery(delivery("a", "https://relay/inbox", now)).await.unwrap();
        store.insert_delivery(delivery("b", "https://relay/inbox", now)).await.unwrap();
        store.insert_delivery(delivery("c", "https://other/inbox", now)).await.unwrap();

        let purged = store.purge_deliveries_for_inbox("https://relay/inbox").await.unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.count_deliveries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authoring_activity_ignores_announces() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let object = "https://remote.example/notes/42";
        let inbound = |id: &str, kind: &str, actor: &str, at| InboundActivity {
            id: id.to_string(),
            uri: format!("https://remote.example/activities/{id}"),
            activity_type: kind.to_string(),
            actor_uri: actor.to_string(),
            object_uri: object.to_string(),
            received_at: at,
        };
        store
            .insert_inbound_activity(inbound("1", "Create", "https://remote.example/users/bob", now))
            .await
            .unwrap();
        store
            .insert_inbound_activity(inbound(
                "2",
                "Announce",
                "https://other.example/users/carol",
                now + Duration::minutes(1),
            ))
            .await
            .unwrap();

        let found = store.find_authoring_activity(object).await.unwrap().unwrap();
        assert_eq!(found.actor_uri, "https://remote.example/users/bob");
        assert!(
            store
                .find_authoring_activity("https://remote.example/notes/7")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_follow_conflicts() {
        let store = MemoryStore::new();
        let follow = Follow {
            id: "f1".to_string(),
            account_id: "a".to_string(),
            target_id: "b".to_string(),
            uri: "https://example.com/activities/1".to_string(),
            accepted: false,
            created_at: Utc::now(),
        };
        store.insert_follow(follow.clone()).await.unwrap();
        let err = store
            .insert_follow(Follow {
                id: "f2".to_string(),
                ..follow
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
