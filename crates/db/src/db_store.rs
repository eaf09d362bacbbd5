//! `SeaORM`-backed [`Store`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};

use crate::entities::{
    account, delivery_queue, follow, inbound_activity, note, note_like, remote_actor, Account,
    DeliveryQueue, Follow as FollowEntity, InboundActivity as InboundActivityEntity,
    Note as NoteEntity, NoteLike, RemoteActor as RemoteActorEntity,
};
use crate::models::{
    Account as AccountRow, DeliveryItem, Follow, InboundActivity, Like, Note, RemoteActor,
    Visibility,
};
use crate::store::{Store, StoreError, StoreResult};

/// Relational store over a pooled database connection.
#[derive(Clone)]
pub struct DbStore {
    db: Arc<DatabaseConnection>,
}

impl DbStore {
    /// Wrap an open connection.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn db_err(e: DbErr) -> StoreError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => StoreError::Conflict(msg),
        _ => StoreError::Database(e.to_string()),
    }
}

fn to_db(dt: DateTime<Utc>) -> sea_orm::prelude::DateTimeWithTimeZone {
    dt.into()
}

fn from_db(dt: sea_orm::prelude::DateTimeWithTimeZone) -> DateTime<Utc> {
    dt.with_timezone(&Utc)
}

// === Row conversions ===

impl From<account::Model> for AccountRow {
    fn from(m: account::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            display_name: m.display_name,
            summary: m.summary,
            private_key_pem: m.private_key_pem,
            public_key_pem: m.public_key_pem,
            created_at: from_db(m.created_at),
        }
    }
}

impl From<remote_actor::Model> for RemoteActor {
    fn from(m: remote_actor::Model) -> Self {
        Self {
            id: m.id,
            uri: m.uri,
            username: m.username,
            host: m.host,
            inbox: m.inbox,
            shared_inbox: m.shared_inbox,
            outbox: m.outbox,
            display_name: m.display_name,
            summary: m.summary,
            avatar_url: m.avatar_url,
            public_key_pem: m.public_key_pem,
            last_fetched_at: from_db(m.last_fetched_at),
        }
    }
}

impl From<follow::Model> for Follow {
    fn from(m: follow::Model) -> Self {
        Self {
            id: m.id,
            account_id: m.account_id,
            target_id: m.target_id,
            uri: m.uri,
            accepted: m.accepted,
            created_at: from_db(m.created_at),
        }
    }
}

impl From<delivery_queue::Model> for DeliveryItem {
    fn from(m: delivery_queue::Model) -> Self {
        Self {
            id: m.id,
            inbox: m.inbox,
            payload: m.payload,
            attempts: u32::try_from(m.attempts).unwrap_or(0),
            next_retry_at: from_db(m.next_retry_at),
            created_at: from_db(m.created_at),
        }
    }
}

impl From<note::Model> for Note {
    fn from(m: note::Model) -> Self {
        Self {
            id: m.id,
            account_id: m.account_id,
            uri: m.uri,
            source: m.source,
            content: m.content,
            visibility: Visibility::from_column(&m.visibility),
            in_reply_to: m.in_reply_to,
            created_at: from_db(m.created_at),
            updated_at: m.updated_at.map(from_db),
        }
    }
}

impl From<inbound_activity::Model> for InboundActivity {
    fn from(m: inbound_activity::Model) -> Self {
        Self {
            id: m.id,
            uri: m.uri,
            activity_type: m.activity_type,
            actor_uri: m.actor_uri,
            object_uri: m.object_uri,
            received_at: from_db(m.received_at),
        }
    }
}

impl From<note_like::Model> for Like {
    fn from(m: note_like::Model) -> Self {
        Self {
            id: m.id,
            account_id: m.account_id,
            object_uri: m.object_uri,
            uri: m.uri,
            created_at: from_db(m.created_at),
        }
    }
}

fn remote_actor_active(actor: RemoteActor) -> remote_actor::ActiveModel {
    remote_actor::ActiveModel {
        id: Set(actor.id),
        uri: Set(actor.uri),
        username: Set(actor.username),
        host: Set(actor.host),
        inbox: Set(actor.inbox),
        shared_inbox: Set(actor.shared_inbox),
        outbox: Set(actor.outbox),
        display_name: Set(actor.display_name),
        summary: Set(actor.summary),
        avatar_url: Set(actor.avatar_url),
        public_key_pem: Set(actor.public_key_pem),
        last_fetched_at: Set(to_db(actor.last_fetched_at)),
    }
}

fn note_active(note: Note) -> note::ActiveModel {
    note::ActiveModel {
        id: Set(note.id),
        account_id: Set(note.account_id),
        uri: Set(note.uri),
        source: Set(note.source),
        content: Set(note.content),
        visibility: Set(note.visibility.as_str().to_string()),
        in_reply_to: Set(note.in_reply_to),
        created_at: Set(to_db(note.created_at)),
        updated_at: Set(note.updated_at.map(to_db)),
    }
}

#[async_trait]
impl Store for DbStore {
    async fn find_account_by_id(&self, id: &str) -> StoreResult<Option<AccountRow>> {
        let model = Account::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<AccountRow>> {
        let model = Account::find()
            .filter(account::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn insert_account(&self, row: AccountRow) -> StoreResult<AccountRow> {
        let model = account::ActiveModel {
            id: Set(row.id),
            username: Set(row.username),
            display_name: Set(row.display_name),
            summary: Set(row.summary),
            private_key_pem: Set(row.private_key_pem),
            public_key_pem: Set(row.public_key_pem),
            created_at: Set(to_db(row.created_at)),
        };
        let inserted = model.insert(self.db.as_ref()).await.map_err(db_err)?;
        Ok(inserted.into())
    }

    async fn find_remote_actor_by_uri(&self, uri: &str) -> StoreResult<Option<RemoteActor>> {
        let model = RemoteActorEntity::find()
            .filter(remote_actor::Column::Uri.eq(uri))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn find_remote_actor_by_id(&self, id: &str) -> StoreResult<Option<RemoteActor>> {
        let model = RemoteActorEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn upsert_remote_actor(&self, actor: RemoteActor) -> StoreResult<RemoteActor> {
        let uri = actor.uri.clone();

        // Every column but `id`; the surrogate key survives refetches.
        RemoteActorEntity::insert(remote_actor_active(actor))
            .on_conflict(
                OnConflict::column(remote_actor::Column::Uri)
                    .update_columns([
                        remote_actor::Column::Username,
                        remote_actor::Column::Host,
                        remote_actor::Column::Inbox,
                        remote_actor::Column::SharedInbox,
                        remote_actor::Column::Outbox,
                        remote_actor::Column::DisplayName,
                        remote_actor::Column::Summary,
                        remote_actor::Column::AvatarUrl,
                        remote_actor::Column::PublicKeyPem,
                        remote_actor::Column::LastFetchedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(db_err)?;

        self.find_remote_actor_by_uri(&uri)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("remote actor {uri}")))
    }

    async fn purge_remote_actor(&self, uri: &str) -> StoreResult<bool> {
        let result = RemoteActorEntity::delete_many()
            .filter(remote_actor::Column::Uri.eq(uri))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn find_follow(&self, account_id: &str, target_id: &str) -> StoreResult<Option<Follow>> {
        let model = FollowEntity::find()
            .filter(follow::Column::AccountId.eq(account_id))
            .filter(follow::Column::TargetId.eq(target_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn find_follow_by_uri(&self, uri: &str) -> StoreResult<Option<Follow>> {
        let model = FollowEntity::find()
            .filter(follow::Column::Uri.eq(uri))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn insert_follow(&self, row: Follow) -> StoreResult<Follow> {
        let model = follow::ActiveModel {
            id: Set(row.id),
            account_id: Set(row.account_id),
            target_id: Set(row.target_id),
            uri: Set(row.uri),
            accepted: Set(row.accepted),
            created_at: Set(to_db(row.created_at)),
        };
        let inserted = model.insert(self.db.as_ref()).await.map_err(db_err)?;
        Ok(inserted.into())
    }

    async fn set_follow_accepted(&self, id: &str) -> StoreResult<()> {
        let result = FollowEntity::update_many()
            .col_expr(follow::Column::Accepted, Expr::value(true))
            .filter(follow::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("follow {id}")));
        }
        Ok(())
    }

    async fn delete_follow(&self, id: &str) -> StoreResult<()> {
        FollowEntity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn accepted_followers(&self, target_id: &str) -> StoreResult<Vec<Follow>> {
        let models = FollowEntity::find()
            .filter(follow::Column::TargetId.eq(target_id))
            .filter(follow::Column::Accepted.eq(true))
            .order_by_asc(follow::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn insert_delivery(&self, item: DeliveryItem) -> StoreResult<DeliveryItem> {
        let model = delivery_queue::ActiveModel {
            id: Set(item.id),
            inbox: Set(item.inbox),
            payload: Set(item.payload),
            attempts: Set(i32::try_from(item.attempts).unwrap_or(i32::MAX)),
            next_retry_at: Set(to_db(item.next_retry_at)),
            created_at: Set(to_db(item.created_at)),
        };
        let inserted = model.insert(self.db.as_ref()).await.map_err(db_err)?;
        Ok(inserted.into())
    }

    async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<DeliveryItem>> {
        let txn = self.db.begin().await.map_err(db_err)?;

        // SKIP LOCKED lets concurrent drainers claim disjoint batches.
        let due = DeliveryQueue::find()
            .filter(delivery_queue::Column::NextRetryAt.lte(to_db(now)))
            .order_by_asc(delivery_queue::Column::NextRetryAt)
            .order_by_asc(delivery_queue::Column::Id)
            .limit(limit)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await
            .map_err(db_err)?;

        if due.is_empty() {
            txn.commit().await.map_err(db_err)?;
            return Ok(Vec::new());
        }

        let ids: Vec<String> = due.iter().map(|m| m.id.clone()).collect();
        DeliveryQueue::update_many()
            .col_expr(
                delivery_queue::Column::NextRetryAt,
                Expr::value(to_db(lease_until)),
            )
            .filter(delivery_queue::Column::Id.is_in(ids))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;
        Ok(due.into_iter().map(Into::into).collect())
    }

    async fn reschedule_delivery(
        &self,
        id: &str,
        previous_attempts: u32,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let previous = i32::try_from(previous_attempts).unwrap_or(i32::MAX);
        let result = DeliveryQueue::update_many()
            .col_expr(
                delivery_queue::Column::Attempts,
                Expr::value(previous.saturating_add(1)),
            )
            .col_expr(
                delivery_queue::Column::NextRetryAt,
                Expr::value(to_db(next_retry_at)),
            )
            .filter(delivery_queue::Column::Id.eq(id))
            .filter(delivery_queue::Column::Attempts.eq(previous))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected == 1)
    }

    async fn delete_delivery(&self, id: &str) -> StoreResult<()> {
        DeliveryQueue::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn purge_deliveries_for_inbox(&self, inbox: &str) -> StoreResult<u64> {
        let result = DeliveryQueue::delete_many()
            .filter(delivery_queue::Column::Inbox.eq(inbox))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn count_deliveries(&self) -> StoreResult<u64> {
        DeliveryQueue::find()
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn insert_note(&self, row: Note) -> StoreResult<Note> {
        let inserted = note_active(row)
            .insert(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(inserted.into())
    }

    async fn find_note_by_id(&self, id: &str) -> StoreResult<Option<Note>> {
        let model = NoteEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn find_note_by_uri(&self, uri: &str) -> StoreResult<Option<Note>> {
        let model = NoteEntity::find()
            .filter(note::Column::Uri.eq(uri))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn update_note(&self, row: Note) -> StoreResult<Note> {
        let id = row.id.clone();
        let updated = note_active(row)
            .update(self.db.as_ref())
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => StoreError::NotFound(format!("note {id}")),
                other => db_err(other),
            })?;
        Ok(updated.into())
    }

    async fn delete_note(&self, id: &str) -> StoreResult<()> {
        NoteEntity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_inbound_activity(&self, activity: InboundActivity) -> StoreResult<()> {
        let model = inbound_activity::ActiveModel {
            id: Set(activity.id),
            uri: Set(activity.uri),
            activity_type: Set(activity.activity_type),
            actor_uri: Set(activity.actor_uri),
            object_uri: Set(activity.object_uri),
            received_at: Set(to_db(activity.received_at)),
        };
        model.insert(self.db.as_ref()).await.map_err(db_err)?;
        Ok(())
    }

    async fn find_authoring_activity(
        &self,
        object_uri: &str,
    ) -> StoreResult<Option<InboundActivity>> {
        let model = InboundActivityEntity::find()
            .filter(inbound_activity::Column::ObjectUri.eq(object_uri))
            .filter(inbound_activity::Column::ActivityType.is_in(InboundActivity::AUTHORING_TYPES))
            .order_by_desc(inbound_activity::Column::ReceivedAt)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn insert_like(&self, like: Like) -> StoreResult<Like> {
        let model = note_like::ActiveModel {
            id: Set(like.id),
            account_id: Set(like.account_id),
            object_uri: Set(like.object_uri),
            uri: Set(like.uri),
            created_at: Set(to_db(like.created_at)),
        };
        let inserted = model.insert(self.db.as_ref()).await.map_err(db_err)?;
        Ok(inserted.into())
    }

    async fn find_like(&self, account_id: &str, object_uri: &str) -> StoreResult<Option<Like>> {
        let model = NoteLike::find()
            .filter(note_like::Column::AccountId.eq(account_id))
            .filter(note_like::Column::ObjectUri.eq(object_uri))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(model.map(Into::into))
    }

    async fn delete_like(&self, id: &str) -> StoreResult<()> {
        NoteLike::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
