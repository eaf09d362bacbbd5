//! Durable outbound delivery queue.
//!
//! Rows live in the store. [`DeliveryQueue::drain`] claims due rows under a
//! lease, signs each payload as the local account named by its `actor`, and
//! POSTs it to the row's inbox. Successes are deleted; failures are
//! rescheduled with [`RetryPolicy`] backoff until the attempt ceiling, after
//! which the row is abandoned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tern_common::config::{FederationConfig, QueueConfig};
use tern_common::{AppError, AppResult, Clock, IdGenerator, key_id, last_path_segment};
use tern_db::{DeliveryItem, Store, StoreError};
use tern_federation::{
    Activity, ActivityDelivery, HttpRequest, HttpSigner, SignatureError, Transport,
    TransportError,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::retry::RetryPolicy;

const ACTIVITY_JSON: &str = "application/activity+json";

/// Why a single delivery attempt failed.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The row can never be delivered; it is dropped without retry.
    #[error("Undeliverable: {0}")]
    Permanent(String),
    /// The owning account's key cannot sign; dropped and logged at error.
    #[error("Signing key unusable: {0}")]
    Key(#[from] SignatureError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Inbox returned status {0}")]
    Status(u16),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status(_) | Self::Store(_))
    }
}

impl From<DeliveryError> for AppError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::Key(k) => k.into(),
            DeliveryError::Transport(t) => t.into(),
            DeliveryError::Store(s) => s.into(),
            other => Self::Queue(other.to_string()),
        }
    }
}

/// What happened to one claimed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx; row deleted.
    Delivered,
    /// Failed; rescheduled.
    Retry,
    /// Failed for the last time; row deleted.
    Abandoned,
    /// Permanently undeliverable; row deleted.
    Dropped,
}

/// Counts from one drain cycle.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub abandoned: usize,
    pub dropped: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Retry => self.retried += 1,
            DeliveryOutcome::Abandoned => self.abandoned += 1,
            DeliveryOutcome::Dropped => self.dropped += 1,
        }
    }
}

/// Tunables for [`DeliveryQueue`].
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Backoff and attempt ceiling.
    pub retry: RetryPolicy,
    /// Maximum deliveries in flight within one drain.
    pub concurrency: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Minimum time a claimed row stays invisible to other claimers.
    pub claim_lease: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 8,
            request_timeout: Duration::from_secs(30),
            claim_lease: Duration::from_secs(120),
        }
    }
}

impl DeliverySettings {
    /// Settings from the `queue` and `federation` config sections.
    #[must_use]
    pub fn from_config(queue: &QueueConfig, federation: &FederationConfig) -> Self {
        Self {
            retry: RetryPolicy::from(queue),
            concurrency: queue.concurrency.max(1),
            request_timeout: federation.delivery_timeout(),
            claim_lease: Duration::from_secs(queue.claim_lease_secs),
        }
    }

    /// Lease for a claim of `batch_size` rows.
    ///
    /// Rows wait in waves of `concurrency`, each wave bounded by the request
    /// timeout, so the lease covers every wave timing out plus one spare
    /// timeout for signing and store writes. Never below `claim_lease`.
    #[must_use]
    pub fn lease_for(&self, batch_size: u64) -> Duration {
        let concurrency = self.concurrency.max(1) as u64;
        let waves = batch_size.div_ceil(concurrency).saturating_add(1);
        let needed = self
            .request_timeout
            .saturating_mul(u32::try_from(waves).unwrap_or(u32::MAX));
        self.claim_lease.max(needed)
    }
}

/// Store-backed delivery queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    settings: DeliverySettings,
    id_gen: IdGenerator,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

impl DeliveryQueue {
    /// Create a queue.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            settings,
            id_gen: IdGenerator::new(),
        }
    }

    /// Queue `activity_json` for `inbox`, due immediately.
    pub async fn enqueue(&self, inbox: &str, activity_json: &str) -> AppResult<DeliveryItem> {
        let now = self.clock.now();
        let item = self
            .store
            .insert_delivery(DeliveryItem {
                id: self.id_gen.generate(),
                inbox: inbox.to_string(),
                payload: activity_json.to_string(),
                attempts: 0,
                next_retry_at: now,
                created_at: now,
            })
            .await?;
        debug!(inbox = %inbox, item_id = %item.id, "Queued delivery");
        Ok(item)
    }

    /// Claim up to `batch_size` due rows and attempt each once.
    pub async fn drain(&self, batch_size: u64) -> AppResult<DrainReport> {
        let now = self.clock.now();
        let lease_until = now + to_chrono(self.settings.lease_for(batch_size));
        let items = self
            .store
            .claim_due_deliveries(now, batch_size, lease_until)
            .await?;

        let mut report = DrainReport {
            claimed: items.len(),
            ..DrainReport::default()
        };
        if items.is_empty() {
            return Ok(report);
        }

        let outcomes: Vec<DeliveryOutcome> = stream::iter(items)
            .map(|item| self.process(item))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            report.record(outcome);
        }

        info!(
            claimed = report.claimed,
            delivered = report.delivered,
            retried = report.retried,
            abandoned = report.abandoned,
            dropped = report.dropped,
            "Drain cycle complete"
        );
        Ok(report)
    }

    /// Delete every row for `inbox`. Returns the number removed.
    pub async fn purge_inbox(&self, inbox: &str) -> AppResult<u64> {
        let removed = self.store.purge_deliveries_for_inbox(inbox).await?;
        info!(inbox = %inbox, removed, "Purged inbox from delivery queue");
        Ok(removed)
    }

    /// Rows in the queue, due or not.
    pub async fn pending_count(&self) -> AppResult<u64> {
        Ok(self.store.count_deliveries().await?)
    }

    /// Attempt one row and record the result in the store.
    async fn process(&self, item: DeliveryItem) -> DeliveryOutcome {
        match self.attempt(&item).await {
            Ok(()) => {
                info!(inbox = %item.inbox, attempt = item.attempts + 1, "Activity delivered");
                self.finish(&item, DeliveryOutcome::Delivered).await
            }
            Err(DeliveryError::Key(e)) => {
                error!(inbox = %item.inbox, item_id = %item.id, error = %e, "Private key unusable; dropping delivery");
                self.finish(&item, DeliveryOutcome::Dropped).await
            }
            Err(e) if !e.is_retryable() => {
                warn!(inbox = %item.inbox, item_id = %item.id, error = %e, "Dropping undeliverable item");
                self.finish(&item, DeliveryOutcome::Dropped).await
            }
            Err(e) => self.reschedule(&item, &e).await,
        }
    }

    async fn finish(&self, item: &DeliveryItem, outcome: DeliveryOutcome) -> DeliveryOutcome {
        if let Err(e) = self.store.delete_delivery(&item.id).await {
            // The lease expires and the row is tried again.
            error!(item_id = %item.id, error = %e, "Failed to delete delivery row");
        }
        outcome
    }

    async fn reschedule(&self, item: &DeliveryItem, cause: &DeliveryError) -> DeliveryOutcome {
        let attempts = item.attempts.saturating_add(1);
        let retry = &self.settings.retry;

        if !retry.should_retry(attempts) {
            error!(
                inbox = %item.inbox,
                item_id = %item.id,
                attempt = attempts,
                error = %cause,
                "Delivery abandoned after max attempts"
            );
            return self.finish(item, DeliveryOutcome::Abandoned).await;
        }

        let delay = retry.delay_for_attempt(attempts);
        let next_retry_at = self.clock.now() + to_chrono(delay);
        warn!(
            inbox = %item.inbox,
            attempt = attempts,
            retry_in_secs = delay.as_secs(),
            error = %cause,
            "Delivery failed; will retry"
        );
        match self
            .store
            .reschedule_delivery(&item.id, item.attempts, next_retry_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(item_id = %item.id, attempt = attempts, "Row already rescheduled or removed by another worker");
            }
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Failed to reschedule delivery row");
            }
        }
        DeliveryOutcome::Retry
    }

    /// Sign and POST one row.
    async fn attempt(&self, item: &DeliveryItem) -> Result<(), DeliveryError> {
        let activity = Activity::from_json(&item.payload)
            .map_err(|e| DeliveryError::Permanent(format!("stored payload: {e}")))?;

        let actor = activity
            .actor()
            .filter(|actor| !actor.is_empty())
            .ok_or_else(|| DeliveryError::Permanent("payload has no actor".to_string()))?;
        let actor_url = Url::parse(actor)
            .map_err(|e| DeliveryError::Permanent(format!("actor {actor}: {e}")))?;
        let username = last_path_segment(&actor_url)
            .ok_or_else(|| DeliveryError::Permanent(format!("actor {actor} has no username")))?;

        let account = self
            .store
            .find_account_by_username(username)
            .await?
            .ok_or_else(|| DeliveryError::Permanent(format!("no local account for {actor}")))?;

        let inbox = Url::parse(&item.inbox)
            .map_err(|e| DeliveryError::Permanent(format!("inbox {}: {e}", item.inbox)))?;

        let signer = HttpSigner::new(&account.private_key_pem, key_id(actor))?;
        let body = item.payload.as_bytes().to_vec();
        let signed = signer.sign("POST", &inbox, &body, self.clock.now())?;

        let mut request = HttpRequest::post(inbox, body, self.settings.request_timeout)
            .header("Content-Type", ACTIVITY_JSON)
            .header("Accept", ACTIVITY_JSON);
        for (name, value) in signed.into_pairs() {
            request = request.header(name, value);
        }

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            debug!(inbox = %item.inbox, status = response.status, body = %response.text(), "Inbox rejected delivery");
            Err(DeliveryError::Status(response.status))
        }
    }
}

#[async_trait]
impl ActivityDelivery for DeliveryQueue {
    async fn deliver(&self, activity: &Activity, inboxes: Vec<String>) -> AppResult<usize> {
        let payload = activity.to_json()?;
        for inbox in &inboxes {
            self.enqueue(inbox, &payload).await?;
        }
        info!(
            activity_id = activity.id().unwrap_or_default(),
            activity_type = activity.kind().unwrap_or_default(),
            inboxes = inboxes.len(),
            "Queued activity for delivery"
        );
        Ok(inboxes.len())
    }
}
