//! Create, Update and Delete for local notes.

use tern_db::{Account, Note, Visibility};
use tern_markup::{Mention, RenderOptions, extract_hashtags, extract_mentions, to_html};
use tracing::{info, warn};
use url::Url;

use super::{PublishError, PublishResult, Publisher, Recipient, base_addressing, dedup};
use crate::activities::{self, Activity, NoteObject, Tag};

/// A note as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    /// Source text.
    pub body: String,
    /// Audience.
    pub visibility: Visibility,
    /// IRI of the note being replied to.
    pub in_reply_to: Option<String>,
}

impl NoteDraft {
    /// A public note with no parent.
    #[must_use]
    pub fn public(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Outcome of a note operation.
#[derive(Debug, Clone)]
pub struct Published {
    /// The note row as stored (or as it was, for deletes).
    pub note: Note,
    /// The activity handed to delivery.
    pub activity: Activity,
    /// Number of inboxes queued.
    pub queued: usize,
}

/// Rendered body and addressing for a note.
struct Composed {
    content: String,
    tags: Vec<Tag>,
    to: Vec<String>,
    cc: Vec<String>,
    inboxes: Vec<String>,
}

impl Publisher {
    /// Publish a new note and queue its Create to every destination inbox.
    pub async fn publish_note(&self, account: &Account, draft: NoteDraft) -> PublishResult<Published> {
        if let Some(parent) = &draft.in_reply_to {
            Url::parse(parent).map_err(|_| PublishError::InvalidTarget(parent.clone()))?;
        }

        let composed = self
            .compose(account, &draft.body, draft.visibility, draft.in_reply_to.as_deref())
            .await?;

        let id = self.id_gen.generate();
        let note = self
            .store
            .insert_note(Note {
                uri: self.uris.note(&id),
                id,
                account_id: account.id.clone(),
                source: draft.body,
                content: composed.content.clone(),
                visibility: draft.visibility,
                in_reply_to: draft.in_reply_to,
                created_at: self.clock.now(),
                updated_at: None,
            })
            .await?;

        let object = self.note_object(account, &note, &composed);
        let activity = activities::create_note(&self.new_activity_id(), &object);
        let queued = match self.dispatch(&activity, composed.inboxes).await {
            Ok(queued) => queued,
            Err(e) => {
                self.store.delete_note(&note.id).await?;
                return Err(e);
            }
        };

        info!(note_uri = %note.uri, queued, "Published note");
        Ok(Published {
            note,
            activity,
            queued,
        })
    }

    /// Replace a note's body and queue an Update. Only the author may edit.
    pub async fn update_note(
        &self,
        account: &Account,
        note_id: &str,
        new_body: &str,
    ) -> PublishResult<Published> {
        let previous = self.owned_note(account, note_id).await?;

        let composed = self
            .compose(account, new_body, previous.visibility, previous.in_reply_to.as_deref())
            .await?;

        let note = self
            .store
            .update_note(Note {
                source: new_body.to_string(),
                content: composed.content.clone(),
                updated_at: Some(self.clock.now()),
                ..previous.clone()
            })
            .await?;

        let object = self.note_object(account, &note, &composed);
        let activity = activities::update_note(&self.new_activity_id(), &object);
        let queued = match self.dispatch(&activity, composed.inboxes).await {
            Ok(queued) => queued,
            Err(e) => {
                self.store.update_note(previous).await?;
                return Err(e);
            }
        };

        info!(note_uri = %note.uri, queued, "Updated note");
        Ok(Published {
            note,
            activity,
            queued,
        })
    }

    /// Delete a note and queue a Delete to the author's followers.
    pub async fn delete_note(&self, account: &Account, note_id: &str) -> PublishResult<Published> {
        let note = self.owned_note(account, note_id).await?;
        self.store.delete_note(&note.id).await?;

        let actor = self.uris.actor(&account.username);
        let (to, cc) = base_addressing(note.visibility, self.uris.followers(&account.username));
        let activity =
            activities::delete_note(&self.new_activity_id(), &actor, &note.uri, &to, &cc);
        let inboxes = dedup(self.follower_inboxes(account).await?);
        let queued = match self.dispatch(&activity, inboxes).await {
            Ok(queued) => queued,
            Err(e) => {
                self.store.insert_note(note).await?;
                return Err(e);
            }
        };

        info!(note_uri = %note.uri, queued, "Deleted note");
        Ok(Published {
            note,
            activity,
            queued,
        })
    }

    async fn owned_note(&self, account: &Account, note_id: &str) -> PublishResult<Note> {
        let note = self
            .store
            .find_note_by_id(note_id)
            .await?
            .ok_or_else(|| PublishError::NoteNotFound(note_id.to_string()))?;
        if note.account_id != account.id {
            return Err(PublishError::NotOwner);
        }
        Ok(note)
    }

    fn note_object(&self, account: &Account, note: &Note, composed: &Composed) -> NoteObject {
        NoteObject {
            id: note.uri.clone(),
            attributed_to: self.uris.actor(&account.username),
            content: composed.content.clone(),
            source: note.source.clone(),
            published: note.created_at,
            updated: note.updated_at,
            in_reply_to: note.in_reply_to.clone(),
            to: composed.to.clone(),
            cc: composed.cc.clone(),
            tag: composed.tags.clone(),
        }
    }

    /// Render `body` and work out who receives it.
    async fn compose(
        &self,
        account: &Account,
        body: &str,
        visibility: Visibility,
        in_reply_to: Option<&str>,
    ) -> PublishResult<Composed> {
        let (to, mut cc) = base_addressing(visibility, self.uris.followers(&account.username));
        let mut inboxes = self.follower_inboxes(account).await?;

        if let Some(parent) = in_reply_to {
            match self.resolve_object_author(parent).await? {
                Some(author) => {
                    cc.push(author.uri);
                    inboxes.extend(author.inbox);
                }
                None => warn!(in_reply_to = %parent, "Reply parent author unknown; omitting"),
            }
        }

        let mut options = RenderOptions::for_domain(self.uris.domain());
        let mut tags = Vec::new();
        for mention in extract_mentions(body) {
            let Some(recipient) = self.resolve_mention(&mention).await? else {
                continue;
            };
            options = options.with_mention(&mention.acct, recipient.uri.clone());
            if !tags
                .iter()
                .any(|t| matches!(t, Tag::Mention { href, .. } if *href == recipient.uri))
            {
                tags.push(Tag::Mention {
                    href: recipient.uri.clone(),
                    name: format!("@{}", mention.acct),
                });
            }
            cc.push(recipient.uri);
            inboxes.extend(recipient.inbox);
        }

        tags.extend(extract_hashtags(body).into_iter().map(|tag| Tag::Hashtag {
            href: self.uris.tag(&tag),
            name: format!("#{tag}"),
        }));

        Ok(Composed {
            content: to_html(body, &options),
            tags,
            cc: dedup(cc.into_iter().filter(|uri| !to.contains(uri))),
            to,
            inboxes: dedup(inboxes),
        })
    }

    /// Resolve a mention to its actor. Unknown users and failed lookups are
    /// skipped with a warning.
    async fn resolve_mention(&self, mention: &Mention) -> PublishResult<Option<Recipient>> {
        let host = mention
            .host
            .as_deref()
            .filter(|host| !self.uris.is_local_domain(host));

        let Some(host) = host else {
            return Ok(self
                .store
                .find_account_by_username(&mention.username)
                .await?
                .map(|local| Recipient {
                    uri: self.uris.actor(&local.username),
                    inbox: None,
                })
                .or_else(|| {
                    warn!(mention = %mention.acct, "Mentioned local user does not exist");
                    None
                }));
        };

        match self.webfinger.resolve(&mention.username, host).await {
            Ok(actor_uri) => Ok(Some(self.recipient_for_actor(actor_uri.as_str()).await)),
            Err(e) => {
                warn!(mention = %mention.acct, error = %e, "Skipping unresolvable mention");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::tests::{DOMAIN, add_follower, fixture, insert_account, serve_remote_actor};
    use super::*;
    use crate::test_utils::{webfinger_document, webfinger_url};
    use chrono::Duration;
    use serde_json::json;
    use tern_common::{Clock, PUBLIC_COLLECTION};
    use tern_db::{InboundActivity, Store};

    #[tokio::test]
    async fn test_fan_out_dedups_shared_inbox() {
        let f = fixture().await;
        let shared = "https://remote.example/inbox";
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", Some(shared));
        let carol = serve_remote_actor(&f.transport, "remote.example", "carol", Some(shared));
        let dave = serve_remote_actor(&f.transport, "other.example", "dave", None);
        for follower in [&bob, &carol, &dave] {
            add_follower(&f, &f.alice, follower).await;
        }

        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("hello fediverse"))
            .await
            .unwrap();

        assert_eq!(published.queued, 2);
        let (activity, mut inboxes) = f.delivery.last().unwrap();
        assert_eq!(activity.kind(), Some("Create"));
        inboxes.sort();
        assert_eq!(
            inboxes,
            vec![format!("{dave}/inbox"), shared.to_string()]
        );
    }

    #[tokio::test]
    async fn test_public_note_addressing() {
        let f = fixture().await;
        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("hi"))
            .await
            .unwrap();

        let value = published.activity.into_value();
        assert_eq!(value["actor"], "https://example.com/users/alice");
        assert_eq!(value["to"], json!([PUBLIC_COLLECTION]));
        assert_eq!(value["cc"], json!(["https://example.com/users/alice/followers"]));
        assert_eq!(value["object"]["to"], value["to"]);
        assert_eq!(value["object"]["content"], "<p>hi</p>");
        assert!(
            value["id"]
                .as_str()
                .unwrap()
                .starts_with("https://example.com/activities/")
        );
    }

    #[tokio::test]
    async fn test_note_without_remote_recipients_queues_nothing() {
        let f = fixture().await;
        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("talking to myself"))
            .await
            .unwrap();

        assert_eq!(published.queued, 0);
        assert!(f.delivery.deliveries().is_empty());
        let stored = f.store.find_note_by_uri(&published.note.uri).await.unwrap();
        assert_eq!(stored.unwrap().source, "talking to myself");
    }

    #[tokio::test]
    async fn test_remote_mention_is_tagged_and_delivered() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        f.transport.respond_json(
            &webfinger_url("bob", "remote.example"),
            200,
            &webfinger_document("bob@remote.example", &bob),
        );

        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("hey @bob@remote.example"))
            .await
            .unwrap();

        let object = published.activity.object().unwrap().clone();
        assert_eq!(
            object["tag"],
            json!([{"type": "Mention", "href": bob, "name": "@bob@remote.example"}])
        );
        assert!(object["content"].as_str().unwrap().contains(&format!("href=\"{bob}\"")));
        assert_eq!(published.activity.audience("cc")[1], bob);
        assert_eq!(f.delivery.last().unwrap().1, vec![format!("{bob}/inbox")]);
    }

    #[tokio::test]
    async fn test_unresolvable_mention_is_skipped() {
        let f = fixture().await;
        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("hey @ghost@gone.example"))
            .await
            .unwrap();

        let object = published.activity.object().unwrap();
        assert!(object.get("tag").is_none());
        assert_eq!(published.activity.audience("cc").len(), 1);
        assert!(object["content"].as_str().unwrap().contains("@ghost@gone.example"));
    }

    #[tokio::test]
    async fn test_local_mention_is_tagged_without_delivery() {
        let f = fixture().await;
        insert_account(&f.store, "carol").await;

        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("cc @carol and @carol@example.com"))
            .await
            .unwrap();

        let carol = format!("https://{DOMAIN}/users/carol");
        let object = published.activity.object().unwrap();
        assert_eq!(object["tag"].as_array().unwrap().len(), 1);
        assert_eq!(published.activity.audience("cc"), vec![
            "https://example.com/users/alice/followers",
            carol.as_str(),
        ]);
        assert!(f.delivery.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_hashtags_dedup_case_insensitively() {
        let f = fixture().await;
        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("#Rust and #rust and #tokio"))
            .await
            .unwrap();

        let object = published.activity.object().unwrap();
        assert_eq!(
            object["tag"],
            json!([
                {"type": "Hashtag", "href": "https://example.com/tags/rust", "name": "#Rust"},
                {"type": "Hashtag", "href": "https://example.com/tags/tokio", "name": "#tokio"}
            ])
        );
    }

    #[tokio::test]
    async fn test_reply_to_inbound_note_addresses_its_author() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        let parent = "https://remote.example/notes/42";
        f.store
            .insert_inbound_activity(InboundActivity {
                id: "in1".to_string(),
                uri: "https://remote.example/activities/42".to_string(),
                activity_type: "Create".to_string(),
                actor_uri: bob.clone(),
                object_uri: parent.to_string(),
                received_at: f.clock.now(),
            })
            .await
            .unwrap();

        let draft = NoteDraft {
            body: "agreed".to_string(),
            visibility: Visibility::Public,
            in_reply_to: Some(parent.to_string()),
        };
        let published = f.publisher.publish_note(&f.alice, draft).await.unwrap();

        let value = published.activity.into_value();
        assert_eq!(value["object"]["inReplyTo"], parent);
        assert_eq!(value["cc"][1], bob);
        assert_eq!(f.delivery.last().unwrap().1, vec![format!("{bob}/inbox")]);
    }

    #[tokio::test]
    async fn test_reply_ignores_later_announce_of_parent() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        let carol = serve_remote_actor(&f.transport, "other.example", "carol", None);
        let parent = "https://remote.example/notes/42";
        for (id, kind, actor) in [("in1", "Create", &bob), ("in2", "Announce", &carol)] {
            f.store
                .insert_inbound_activity(InboundActivity {
                    id: id.to_string(),
                    uri: format!("https://remote.example/activities/{id}"),
                    activity_type: kind.to_string(),
                    actor_uri: actor.clone(),
                    object_uri: parent.to_string(),
                    received_at: f.clock.now(),
                })
                .await
                .unwrap();
            f.clock.advance(chrono::Duration::minutes(1));
        }

        let draft = NoteDraft {
            body: "agreed".to_string(),
            visibility: Visibility::Followers,
            in_reply_to: Some(parent.to_string()),
        };
        let published = f.publisher.publish_note(&f.alice, draft).await.unwrap();

        let cc = published.activity.audience("cc");
        assert!(cc.contains(&bob.as_str()));
        assert!(!cc.contains(&carol.as_str()));
        assert_eq!(f.delivery.last().unwrap().1, vec![format!("{bob}/inbox")]);
    }

    #[tokio::test]
    async fn test_reply_to_local_note_and_unknown_parent() {
        let f = fixture().await;
        let carol = insert_account(&f.store, "carol").await;
        let parent = f
            .publisher
            .publish_note(&carol, NoteDraft::public("first"))
            .await
            .unwrap();

        let reply = NoteDraft {
            in_reply_to: Some(parent.note.uri.clone()),
            ..NoteDraft::public("second")
        };
        let published = f.publisher.publish_note(&f.alice, reply).await.unwrap();
        assert_eq!(published.activity.audience("cc")[1], "https://example.com/users/carol");

        let orphan = NoteDraft {
            in_reply_to: Some("https://nowhere.example/notes/1".to_string()),
            ..NoteDraft::public("third")
        };
        let published = f.publisher.publish_note(&f.alice, orphan).await.unwrap();
        assert_eq!(published.activity.audience("cc").len(), 1);
        assert_eq!(
            published.activity.object().unwrap()["inReplyTo"],
            "https://nowhere.example/notes/1"
        );
    }

    #[tokio::test]
    async fn test_unlisted_and_followers_only_addressing() {
        let f = fixture().await;
        let followers = "https://example.com/users/alice/followers";

        let unlisted = NoteDraft {
            visibility: Visibility::Unlisted,
            ..NoteDraft::public("quiet")
        };
        let published = f.publisher.publish_note(&f.alice, unlisted).await.unwrap();
        assert_eq!(published.activity.audience("to"), vec![followers]);
        assert_eq!(published.activity.audience("cc"), vec![PUBLIC_COLLECTION]);

        let private = NoteDraft {
            visibility: Visibility::Followers,
            ..NoteDraft::public("secret")
        };
        let published = f.publisher.publish_note(&f.alice, private).await.unwrap();
        assert_eq!(published.activity.audience("to"), vec![followers]);
        assert!(published.activity.audience("cc").is_empty());
    }

    #[tokio::test]
    async fn test_update_note_sets_updated_and_checks_owner() {
        let f = fixture().await;
        let bob_follower = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        add_follower(&f, &f.alice, &bob_follower).await;
        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("typo"))
            .await
            .unwrap();

        let mallory = insert_account(&f.store, "mallory").await;
        let err = f
            .publisher
            .update_note(&mallory, &published.note.id, "hacked")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::NotOwner));

        f.clock.advance(Duration::minutes(5));
        let updated = f
            .publisher
            .update_note(&f.alice, &published.note.id, "fixed")
            .await
            .unwrap();
        assert_eq!(updated.note.source, "fixed");
        assert_eq!(updated.note.updated_at, Some(f.clock.now()));

        let value = updated.activity.into_value();
        assert_eq!(value["type"], "Update");
        assert_eq!(value["object"]["id"], published.note.uri);
        assert_eq!(value["object"]["content"], "<p>fixed</p>");
        assert!(value["object"]["updated"].is_string());
        assert_eq!(updated.queued, 1);
    }

    #[tokio::test]
    async fn test_delete_note_sends_tombstone_to_followers() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        add_follower(&f, &f.alice, &bob).await;
        let published = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("regret"))
            .await
            .unwrap();

        let deleted = f
            .publisher
            .delete_note(&f.alice, &published.note.id)
            .await
            .unwrap();

        let value = deleted.activity.into_value();
        assert_eq!(value["type"], "Delete");
        assert_eq!(
            value["object"],
            json!({"id": published.note.uri, "type": "Tombstone"})
        );
        assert_eq!(f.delivery.last().unwrap().1, vec![format!("{bob}/inbox")]);
        assert!(f.store.find_note_by_id(&published.note.id).await.unwrap().is_none());

        let err = f
            .publisher
            .delete_note(&f.alice, &published.note.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::NoteNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_reply_target() {
        let f = fixture().await;
        let draft = NoteDraft {
            in_reply_to: Some("not a uri".to_string()),
            ..NoteDraft::public("x")
        };
        let err = f.publisher.publish_note(&f.alice, draft).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidTarget(_)));
    }

    #[tokio::test]
    async fn test_failed_hand_off_leaves_notes_unchanged() {
        let f = fixture().await;
        let bob = serve_remote_actor(&f.transport, "remote.example", "bob", None);
        add_follower(&f, &f.alice, &bob).await;
        let kept = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("before"))
            .await
            .unwrap();
        f.delivery.set_failing(true);

        let err = f
            .publisher
            .publish_note(&f.alice, NoteDraft::public("lost"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Delivery(_)));
        assert_eq!(f.store.notes().await.len(), 1);

        let err = f
            .publisher
            .update_note(&f.alice, &kept.note.id, "after")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Delivery(_)));
        let stored = f.store.find_note_by_id(&kept.note.id).await.unwrap().unwrap();
        assert_eq!(stored, kept.note);

        let err = f.publisher.delete_note(&f.alice, &kept.note.id).await.unwrap_err();
        assert!(matches!(err, PublishError::Delivery(_)));
        assert!(f.store.find_note_by_id(&kept.note.id).await.unwrap().is_some());

        f.delivery.set_failing(false);
        f.publisher.delete_note(&f.alice, &kept.note.id).await.unwrap();
        assert!(f.store.notes().await.is_empty());
    }
}
