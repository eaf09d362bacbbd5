//! Follow, Undo(Follow) and Accept.

use tern_db::{Account, Follow, RemoteActor};
use tracing::{debug, info};
use url::Url;

use super::{PublishError, PublishResult, Publisher};
use crate::activities;
use crate::webfinger::parse_handle;

/// The other side of a follow.
enum Target {
    Local(Account),
    Remote(RemoteActor),
}

impl Target {
    fn id(&self) -> &str {
        match self {
            Self::Local(account) => &account.id,
            Self::Remote(actor) => &actor.id,
        }
    }
}

impl Publisher {
    /// Follow `target_uri` as `account`.
    ///
    /// Remote targets get a pending follow and one queued Follow to their
    /// inbox. Local targets are recorded accepted with nothing queued.
    pub async fn follow(&self, account: &Account, target_uri: &str) -> PublishResult<Follow> {
        let url = Url::parse(target_uri)
            .map_err(|_| PublishError::InvalidTarget(target_uri.to_string()))?;

        let target = self.resolve_follow_target(&url, true).await?;
        if target.id() == account.id {
            return Err(PublishError::SelfFollow);
        }

        if let Some(existing) = self.store.find_follow(&account.id, target.id()).await? {
            return Err(if existing.accepted {
                PublishError::AlreadyFollowing
            } else {
                PublishError::FollowPending
            });
        }

        let remote = match target {
            Target::Local(local) => {
                let follow = self
                    .store
                    .insert_follow(Follow {
                        id: self.id_gen.generate(),
                        account_id: account.id.clone(),
                        target_id: local.id,
                        uri: self.new_activity_id(),
                        accepted: true,
                        created_at: self.clock.now(),
                    })
                    .await?;
                debug!(follower = %account.username, followee = %local.username, "Local follow recorded");
                return Ok(follow);
            }
            Target::Remote(actor) => actor,
        };

        let follow = self
            .store
            .insert_follow(Follow {
                id: self.id_gen.generate(),
                account_id: account.id.clone(),
                target_id: remote.id.clone(),
                uri: self.new_activity_id(),
                accepted: false,
                created_at: self.clock.now(),
            })
            .await?;

        let activity = activities::follow(
            &follow.uri,
            &self.uris.actor(&account.username),
            &remote.uri,
        );
        if let Err(e) = self.dispatch(&activity, vec![remote.inbox.clone()]).await {
            self.store.delete_follow(&follow.id).await?;
            return Err(e);
        }

        info!(follower = %account.username, target = %remote.uri, "Follow requested");
        Ok(follow)
    }

    /// Follow a `@user@domain` handle, resolving it with `WebFinger` first.
    pub async fn follow_handle(&self, account: &Account, handle: &str) -> PublishResult<Follow> {
        let (username, domain) = parse_handle(handle)?;
        let target_uri = if self.uris.is_local_domain(&domain) {
            self.uris.actor(&username)
        } else {
            self.webfinger.resolve(&username, &domain).await?.to_string()
        };
        self.follow(account, &target_uri).await
    }

    /// Stop following `target_uri`. Remote targets are sent an
    /// Undo(Follow).
    pub async fn unfollow(&self, account: &Account, target_uri: &str) -> PublishResult<()> {
        let url = Url::parse(target_uri)
            .map_err(|_| PublishError::InvalidTarget(target_uri.to_string()))?;

        let target = match self.resolve_follow_target(&url, false).await {
            Ok(target) => target,
            Err(PublishError::InvalidTarget(_)) => return Err(PublishError::NotFollowing),
            Err(e) => return Err(e),
        };
        let follow = self
            .store
            .find_follow(&account.id, target.id())
            .await?
            .ok_or(PublishError::NotFollowing)?;

        self.store.delete_follow(&follow.id).await?;

        if let Target::Remote(remote) = target {
            let actor = self.uris.actor(&account.username);
            let original = activities::follow(&follow.uri, &actor, &remote.uri);
            let activity = activities::undo(&self.new_activity_id(), &actor, original, &remote.uri);
            if let Err(e) = self.dispatch(&activity, vec![remote.inbox]).await {
                self.store.insert_follow(follow).await?;
                return Err(e);
            }
        }

        info!(follower = %account.username, target = %target_uri, "Unfollowed");
        Ok(())
    }

    /// Accept the incoming follow `follow_uri` addressed to `account`.
    pub async fn accept_follow(&self, account: &Account, follow_uri: &str) -> PublishResult<Follow> {
        let follow = self
            .store
            .find_follow_by_uri(follow_uri)
            .await?
            .ok_or_else(|| PublishError::FollowNotFound(follow_uri.to_string()))?;
        if follow.target_id != account.id {
            return Err(PublishError::InvalidTarget(follow_uri.to_string()));
        }

        // The Accept is queued before the row flips, so a failed hand-off
        // leaves the follow pending and the call can be repeated.
        if let Some(follower) = self.store.find_remote_actor_by_id(&follow.account_id).await? {
            let actor = self.uris.actor(&account.username);
            let original = activities::follow(&follow.uri, &follower.uri, &actor);
            let activity = activities::accept_follow(&self.new_activity_id(), &actor, original);
            self.dispatch(&activity, vec![follower.inbox]).await?;
            info!(account = %account.username, follower = %follower.uri, "Accepted follow");
        }

        self.store.set_follow_accepted(&follow.id).await?;

        Ok(Follow {
            accepted: true,
            ..follow
        })
    }

    /// The account or cached actor `url` names. Remote actors are fetched
    /// when `fetch` is set, otherwise only the cache is consulted.
    async fn resolve_follow_target(&self, url: &Url, fetch: bool) -> PublishResult<Target> {
        if self.uris.is_local(url) {
            return self
                .local_account_for(url)
                .await?
                .map(Target::Local)
                .ok_or_else(|| PublishError::InvalidTarget(url.to_string()));
        }

        let actor = if fetch {
            Some(self.actors.get_or_fetch(url).await?)
        } else {
            self.store.find_remote_actor_by_uri(url.as_str()).await?
        };
        actor
            .map(Target::Remote)
            .ok_or_else(|| PublishError::InvalidTarget(url.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::tests::{add_follower, fixture, insert_account, serve_remote_actor};
    use super::*;
    use crate::test_utils::{webfinger_document, webfinger_url};
    use serde_json::json;
    use tern_db::Store;

    #[tokio::test]
    async fn test_follow_remote_queues_one_delivery() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", Some("https://remote.example/inbox"));

        let follow = f.publisher.follow(&f.alice, &bob).await.unwrap();
        assert!(!follow.accepted);

        let deliveries = f.delivery.deliveries();
        assert_eq!(deliveries.len(), 1);
        let (activity, inboxes) = &deliveries[0];
        assert_eq!(inboxes, &vec![format!("{bob}/inbox")]);
        let value = activity.clone().into_value();
        assert_eq!(value["type"], "Follow");
        assert_eq!(value["id"], follow.uri);
        assert_eq!(value["actor"], "https://example.com/users/alice");
        assert_eq!(value["object"], bob);
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let f = fixture().await;
        let err = f
            .publisher
            .follow(&f.alice, "https://example.com/users/alice")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::SelfFollow));
        assert!(f.store.follows().await.is_empty());
        assert!(f.delivery.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_follow_is_rejected_by_state() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);

        let follow = f.publisher.follow(&f.alice, &bob).await.unwrap();
        let err = f.publisher.follow(&f.alice, &bob).await.unwrap_err();
        assert!(matches!(err, PublishError::FollowPending));

        f.publisher.on_follow_accepted(&follow.uri).await.unwrap();
        let err = f.publisher.follow(&f.alice, &bob).await.unwrap_err();
        assert!(matches!(err, PublishError::AlreadyFollowing));
        assert_eq!(f.delivery.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_follow_local_account_is_immediate() {
        let f = fixture().await;
        let carol = insert_account(&f.store, "carol").await;

        let follow = f
            .publisher
            .follow(&f.alice, "https://example.com/users/carol")
            .await
            .unwrap();
        assert!(follow.accepted);
        assert_eq!(follow.target_id, carol.id);
        assert!(f.delivery.deliveries().is_empty());

        let err = f
            .publisher
            .follow(&f.alice, "https://example.com/users/nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidTarget(_)));
    }

    #[tokio::test]
    async fn test_follow_handle_resolves_via_webfinger() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        f.transport.respond_json(
            &webfinger_url("bob", "remote.example"),
            200,
            &webfinger_document("bob@remote.example", &bob),
        );

        let follow = f.publisher.follow_handle(&f.alice, "@bob@remote.example").await.unwrap();
        let target = f.store.find_remote_actor_by_id(&follow.target_id).await.unwrap();
        assert_eq!(target.unwrap().uri, bob);
    }

    #[tokio::test]
    async fn test_unfollow_sends_undo_with_original_follow() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        let follow = f.publisher.follow(&f.alice, &bob).await.unwrap();

        f.publisher.unfollow(&f.alice, &bob).await.unwrap();

        assert!(f.store.follows().await.is_empty());
        let (activity, inboxes) = f.delivery.last().unwrap();
        assert_eq!(inboxes, vec![format!("{bob}/inbox")]);
        let value = activity.into_value();
        assert_eq!(value["type"], "Undo");
        assert_eq!(value["to"], json!([bob]));
        assert_eq!(value["object"]["type"], "Follow");
        assert_eq!(value["object"]["id"], follow.uri);
        assert!(value["object"].get("@context").is_none());

        let err = f.publisher.unfollow(&f.alice, &bob).await.unwrap_err();
        assert!(matches!(err, PublishError::NotFollowing));
        let err = f
            .publisher
            .unfollow(&f.alice, "https://unknown.example/users/x")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::NotFollowing));
    }

    #[tokio::test]
    async fn test_accept_follow_wraps_follow_and_flips_state() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", Some("https://remote.example/inbox"));
        let follow_uri = "https://remote.example/activities/follow-1";
        f.publisher
            .record_inbound_follow(&f.alice, &Url::parse(&bob).unwrap(), follow_uri)
            .await
            .unwrap();

        let follow = f.publisher.accept_follow(&f.alice, follow_uri).await.unwrap();
        assert!(follow.accepted);
        assert!(f.store.find_follow_by_uri(follow_uri).await.unwrap().unwrap().accepted);

        let (activity, inboxes) = f.delivery.last().unwrap();
        assert_eq!(inboxes, vec![format!("{bob}/inbox")]);
        let value = activity.into_value();
        assert_eq!(value["type"], "Accept");
        assert_eq!(value["actor"], "https://example.com/users/alice");
        assert_eq!(value["to"], json!([bob]));
        assert_eq!(value["object"]["id"], follow_uri);
        assert_eq!(value["object"]["actor"], bob);
        assert_eq!(value["object"]["object"], "https://example.com/users/alice");
    }

    #[tokio::test]
    async fn test_accept_follow_for_someone_else_is_rejected() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        add_follower(&f, &f.alice, &bob).await;
        let carol = insert_account(&f.store, "carol").await;

        let follow_uri = f.store.follows().await[0].uri.clone();
        let err = f.publisher.accept_follow(&carol, &follow_uri).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidTarget(_)));

        let err = f
            .publisher
            .accept_follow(&f.alice, "https://remote.example/activities/missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::FollowNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_undo_keeps_follow() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        let follow = f.publisher.follow(&f.alice, &bob).await.unwrap();
        f.delivery.set_failing(true);

        let err = f.publisher.unfollow(&f.alice, &bob).await.unwrap_err();
        assert!(matches!(err, PublishError::Delivery(_)));
        assert_eq!(f.store.follows().await, vec![follow]);

        f.delivery.set_failing(false);
        f.publisher.unfollow(&f.alice, &bob).await.unwrap();
        assert!(f.store.follows().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_accept_leaves_follow_pending() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        let follow_uri = "https://remote.example/activities/follow-2";
        f.publisher
            .record_inbound_follow(&f.alice, &Url::parse(&bob).unwrap(), follow_uri)
            .await
            .unwrap();
        f.delivery.set_failing(true);

        let err = f.publisher.accept_follow(&f.alice, follow_uri).await.unwrap_err();
        assert!(matches!(err, PublishError::Delivery(_)));
        assert!(!f.store.find_follow_by_uri(follow_uri).await.unwrap().unwrap().accepted);

        f.delivery.set_failing(false);
        f.publisher.accept_follow(&f.alice, follow_uri).await.unwrap();
        assert!(f.store.find_follow_by_uri(follow_uri).await.unwrap().unwrap().accepted);
    }

    #[tokio::test]
    async fn test_failed_follow_hand_off_removes_pending_row() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        f.delivery.set_failing(true);

        let err = f.publisher.follow(&f.alice, &bob).await.unwrap_err();
        assert!(matches!(err, PublishError::Delivery(_)));
        assert!(f.store.follows().await.is_empty());
    }
}
