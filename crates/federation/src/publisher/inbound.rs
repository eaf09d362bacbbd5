//! Store-level hooks for the inbound side.
//!
//! Inbound dispatch lives outside this crate; these are the few writes it
//! must make so outbound addressing stays consistent.

use tern_db::{Account, Follow, InboundActivity};
use tracing::{debug, info};
use url::Url;

use super::{PublishError, PublishResult, Publisher};
use crate::activities::{Activity, ActivityError};

impl Publisher {
    /// Record a Follow received from `actor` for `account`, pending until
    /// [`Publisher::accept_follow`]. A repeated Follow returns the existing
    /// row.
    pub async fn record_inbound_follow(
        &self,
        account: &Account,
        actor: &Url,
        follow_uri: &str,
    ) -> PublishResult<Follow> {
        let follower = self.actors.get_or_fetch(actor).await?;

        if let Some(existing) = self.store.find_follow(&follower.id, &account.id).await? {
            debug!(follower = %follower.uri, "Follow already recorded");
            return Ok(existing);
        }

        let follow = self
            .store
            .insert_follow(Follow {
                id: self.id_gen.generate(),
                account_id: follower.id,
                target_id: account.id.clone(),
                uri: follow_uri.to_string(),
                accepted: false,
                created_at: self.clock.now(),
            })
            .await?;

        info!(follower = %follower.uri, account = %account.username, "Inbound follow recorded");
        Ok(follow)
    }

    /// Flip the follow created by `follow_uri` to accepted on receipt of a
    /// matching Accept.
    pub async fn on_follow_accepted(&self, follow_uri: &str) -> PublishResult<Follow> {
        let follow = self
            .store
            .find_follow_by_uri(follow_uri)
            .await?
            .ok_or_else(|| PublishError::FollowNotFound(follow_uri.to_string()))?;

        self.store.set_follow_accepted(&follow.id).await?;
        info!(follow_uri = %follow_uri, "Follow accepted");

        Ok(Follow {
            accepted: true,
            ..follow
        })
    }

    /// Remember a received activity so replies and likes can find the
    /// author of its object.
    pub async fn record_inbound_activity(&self, activity: &Activity) -> PublishResult<()> {
        activity.validate()?;
        let field = |key: &'static str| activity.str_field(key).ok_or(ActivityError::MissingKey(key));

        let object_uri = match activity.object() {
            Some(serde_json::Value::String(uri)) => uri.clone(),
            Some(object) => object
                .get("id")
                .and_then(serde_json::Value::as_str)
                .ok_or(ActivityError::MissingKey("object.id"))?
                .to_string(),
            None => return Err(ActivityError::MissingKey("object").into()),
        };

        self.store
            .insert_inbound_activity(InboundActivity {
                id: self.id_gen.generate(),
                uri: field("id")?.to_string(),
                activity_type: field("type")?.to_string(),
                actor_uri: field("actor")?.to_string(),
                object_uri,
                received_at: self.clock.now(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::tests::{fixture, serve_remote_actor};
    use super::*;
    use serde_json::json;
    use tern_db::Store;

    #[tokio::test]
    async fn test_inbound_follow_then_accept() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        let url = Url::parse(&bob).unwrap();

        let follow = f
            .publisher
            .record_inbound_follow(&f.alice, &url, "https://remote.example/f/1")
            .await
            .unwrap();
        assert!(!follow.accepted);
        assert_eq!(follow.target_id, f.alice.id);

        let again = f
            .publisher
            .record_inbound_follow(&f.alice, &url, "https://remote.example/f/2")
            .await
            .unwrap();
        assert_eq!(again.id, follow.id);

        let accepted = f
            .publisher
            .on_follow_accepted("https://remote.example/f/1")
            .await
            .unwrap();
        assert!(accepted.accepted);
        assert_eq!(f.store.accepted_followers(&f.alice.id).await.unwrap().len(), 1);

        let err = f.publisher.on_follow_accepted("https://remote.example/f/9").await.unwrap_err();
        assert!(matches!(err, PublishError::FollowNotFound(_)));
    }

    #[tokio::test]
    async fn test_record_inbound_activity_with_embedded_object() {
        let f = fixture().await;
        let activity = Activity::from_value(json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": "https://remote.example/activities/5",
            "type": "Create",
            "actor": "https://remote.example/users/bob",
            "object": {"id": "https://remote.example/notes/5", "type": "Note"}
        }))
        .unwrap();

        f.publisher.record_inbound_activity(&activity).await.unwrap();

        let stored = f
            .store
            .find_authoring_activity("https://remote.example/notes/5")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.actor_uri, "https://remote.example/users/bob");
        assert_eq!(stored.activity_type, "Create");
    }

    #[tokio::test]
    async fn test_record_inbound_activity_requires_object_id() {
        let f = fixture().await;
        let activity = Activity::from_value(json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": "https://remote.example/activities/6",
            "type": "Create",
            "actor": "https://remote.example/users/bob",
            "object": {"type": "Note"}
        }))
        .unwrap();

        let err = f.publisher.record_inbound_activity(&activity).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidActivity(ActivityError::MissingKey(_))));
    }
}
