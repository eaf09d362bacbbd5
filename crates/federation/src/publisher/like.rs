//! Like and Undo(Like).

use tern_db::{Account, Like};
use tracing::{info, warn};

use super::{PublishError, PublishResult, Publisher};
use crate::activities;

impl Publisher {
    /// Like `object_uri` and notify its author.
    ///
    /// The author is resolved the same way as a reply parent; an object
    /// whose author cannot be determined is rejected.
    pub async fn like(&self, account: &Account, object_uri: &str) -> PublishResult<Like> {
        if self.store.find_like(&account.id, object_uri).await?.is_some() {
            return Err(PublishError::AlreadyLiked);
        }

        let author = self
            .resolve_object_author(object_uri)
            .await?
            .ok_or_else(|| PublishError::UnknownAuthor(object_uri.to_string()))?;

        let like = self
            .store
            .insert_like(Like {
                id: self.id_gen.generate(),
                account_id: account.id.clone(),
                object_uri: object_uri.to_string(),
                uri: self.new_activity_id(),
                created_at: self.clock.now(),
            })
            .await?;

        let activity = activities::like(
            &like.uri,
            &self.uris.actor(&account.username),
            object_uri,
            &author.uri,
        );
        if let Err(e) = self.dispatch(&activity, author.inbox.into_iter().collect()).await {
            self.store.delete_like(&like.id).await?;
            return Err(e);
        }

        info!(account = %account.username, object = %object_uri, "Liked");
        Ok(like)
    }

    /// Withdraw a like with Undo(Like).
    pub async fn unlike(&self, account: &Account, object_uri: &str) -> PublishResult<()> {
        let like = self
            .store
            .find_like(&account.id, object_uri)
            .await?
            .ok_or(PublishError::NotLiked)?;
        self.store.delete_like(&like.id).await?;

        let Some(author) = self.resolve_object_author(object_uri).await? else {
            warn!(object = %object_uri, "Author no longer known; Undo not sent");
            return Ok(());
        };

        let actor = self.uris.actor(&account.username);
        let original = activities::like(&like.uri, &actor, object_uri, &author.uri);
        let activity = activities::undo(&self.new_activity_id(), &actor, original, &author.uri);
        if let Err(e) = self.dispatch(&activity, author.inbox.into_iter().collect()).await {
            self.store.insert_like(like).await?;
            return Err(e);
        }

        info!(account = %account.username, object = %object_uri, "Unliked");
        Ok(())
    }
}
