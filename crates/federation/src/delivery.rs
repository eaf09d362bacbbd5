//! Hand-off point between activity construction and the delivery queue.
//!
//! The publisher only needs to queue payloads; the queue crate provides the
//! implementation, so this crate does not depend on it.

use async_trait::async_trait;
use tern_common::AppResult;

use crate::activities::Activity;

/// Queues an activity for delivery to a set of inboxes.
#[async_trait]
pub trait ActivityDelivery: Send + Sync {
    /// Queue one delivery per inbox. `inboxes` is already deduplicated.
    /// Returns the number of rows queued.
    async fn deliver(&self, activity: &Activity, inboxes: Vec<String>) -> AppResult<usize>;
}

