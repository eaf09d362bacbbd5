//! Publisher and delivery queue wired together over a mock network.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tern_common::{Clock, IdGenerator, LocalUris, ManualClock, generate_rsa_keypair};
use tern_db::{Account, MemoryStore, Store};
use tern_federation::test_utils::{
    MockTransport, actor_document, verify_signed_request, webfinger_document, webfinger_url,
};
use tern_federation::{ActorResolver, NoteDraft, Publisher, WebFingerResolver};
use tern_queue::{DeliveryQueue, DeliverySettings};
use url::Url;

const SHARED_INBOX: &str = "https://remote.example/inbox";

struct Instance {
    store: Arc<MemoryStore>,
    transport: Arc<MockTransport>,
    clock: Arc<ManualClock>,
    queue: DeliveryQueue,
    publisher: Publisher,
    alice: Account,
}

async fn instance() -> Instance {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let clock = Arc::new(ManualClock::default());

    let keypair = generate_rsa_keypair().unwrap();
    let alice = store
        .insert_account(Account {
            id: IdGenerator::new().generate(),
            username: "alice".to_string(),
            display_name: Some("Alice".to_string()),
            summary: None,
            private_key_pem: keypair.private_key_pem,
            public_key_pem: keypair.public_key_pem,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let queue = DeliveryQueue::new(
        store.clone(),
        transport.clone(),
        clock.clone(),
        DeliverySettings::default(),
    );
    let publisher = Publisher::new(
        store.clone(),
        ActorResolver::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            Duration::from_secs(24 * 3600),
            Duration::from_secs(10),
        ),
        WebFingerResolver::new(transport.clone(), Duration::from_secs(5)),
        Arc::new(queue.clone()),
        clock.clone(),
        LocalUris::new("example.com"),
    );

    Instance {
        store,
        transport,
        clock,
        queue,
        publisher,
        alice,
    }
}

/// Serve an actor on remote.example whose deliveries all land in the
/// server-wide inbox.
fn serve_actor(transport: &MockTransport, username: &str, shared: bool) -> String {
    let uri = format!("https://remote.example/users/{username}");
    let mut doc = actor_document(&uri, username, "PEM");
    if shared {
        doc["endpoints"] = serde_json::json!({"sharedInbox": SHARED_INBOX});
    } else {
        doc["inbox"] = Value::String(SHARED_INBOX.to_string());
    }
    transport.respond_json(&uri, 200, &doc);
    uri
}

#[tokio::test]
async fn test_follower_and_mention_share_one_inbox() {
    let it = instance().await;

    let carol = serve_actor(&it.transport, "carol", true);
    it.publisher
        .record_inbound_follow(&it.alice, &Url::parse(&carol).unwrap(), "https://remote.example/f/1")
        .await
        .unwrap();
    it.publisher
        .on_follow_accepted("https://remote.example/f/1")
        .await
        .unwrap();

    let bob = serve_actor(&it.transport, "bob", false);
    it.transport.respond_json(
        &webfinger_url("bob", "remote.example"),
        200,
        &webfinger_document("bob@remote.example", &bob),
    );

    it.publisher
        .publish_note(&it.alice, NoteDraft::public("hello #test @bob@remote.example"))
        .await
        .unwrap();

    let rows = it.store.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].inbox, SHARED_INBOX);
    assert_eq!(rows[0].attempts, 0);

    let activity: Value = serde_json::from_str(&rows[0].payload).unwrap();
    let cc: Vec<&str> = activity["cc"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(cc.contains(&"https://example.com/users/alice/followers"));
    assert!(cc.contains(&bob.as_str()));

    let tags = activity["object"]["tag"].as_array().unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags.iter().filter(|t| t["type"] == "Hashtag").count(), 1);
    assert_eq!(tags.iter().filter(|t| t["type"] == "Mention").count(), 1);

    it.transport.respond(SHARED_INBOX, 202, "");
    let report = it.queue.drain(10).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(it.queue.pending_count().await.unwrap(), 0);

    let posts = it.transport.requests_to(SHARED_INBOX);
    assert_eq!(posts.len(), 1);
    assert!(verify_signed_request(&it.alice.public_key_pem, &posts[0]));
}

#[tokio::test]
async fn test_follow_is_delivered_signed() {
    let it = instance().await;
    let bob = serve_actor(&it.transport, "bob", false);
    it.transport.respond(SHARED_INBOX, 202, "");

    let follow = it.publisher.follow(&it.alice, &bob).await.unwrap();
    it.queue.drain(10).await.unwrap();

    let posts = it.transport.requests_to(SHARED_INBOX);
    assert_eq!(posts.len(), 1);
    let body: Value = serde_json::from_slice(posts[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["type"], "Follow");
    assert_eq!(body["id"], follow.uri);
    assert!(verify_signed_request(&it.alice.public_key_pem, &posts[0]));
}

#[tokio::test]
async fn test_retry_ceiling_abandons_after_ten_attempts() {
    let it = instance().await;
    let bob = serve_actor(&it.transport, "bob", false);
    it.transport.respond(SHARED_INBOX, 500, "down");
    it.publisher.follow(&it.alice, &bob).await.unwrap();

    let mut abandoned = 0;
    for _ in 0..15 {
        let report = it.queue.drain(10).await.unwrap();
        abandoned += report.abandoned;
        it.clock.advance(chrono::Duration::hours(13));
    }

    assert_eq!(abandoned, 1);
    assert_eq!(it.transport.requests_to(SHARED_INBOX).len(), 10);
    assert_eq!(it.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_backoff_delays_grow() {
    let it = instance().await;
    let bob = serve_actor(&it.transport, "bob", false);
    it.transport.respond(SHARED_INBOX, 503, "");
    it.publisher.follow(&it.alice, &bob).await.unwrap();

    let mut delays = Vec::new();
    for _ in 0..4 {
        let start = it.clock.now();
        it.queue.drain(10).await.unwrap();
        let row = it.store.deliveries().await.remove(0);
        delays.push(row.next_retry_at - start);
        it.clock.set(row.next_retry_at);
    }

    assert_eq!(
        delays,
        vec![
            chrono::Duration::seconds(60),
            chrono::Duration::seconds(120),
            chrono::Duration::seconds(240),
            chrono::Duration::seconds(480),
        ]
    );
}
