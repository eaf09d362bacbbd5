//! Outbound delivery queue for tern.
//!
//! This crate provides durable, retrying delivery of signed activities:
//!
//! - **Queue**: store-backed rows, claimed under a lease and delivered concurrently
//! - **Retry**: exponential backoff with a fixed attempt ceiling
//! - **Worker**: periodic drain loop with graceful shutdown

pub mod delivery_queue;
pub mod retry;
pub mod worker;

pub use delivery_queue::{DeliveryError, DeliveryOutcome, DeliveryQueue, DeliverySettings, DrainReport};
pub use retry::RetryPolicy;
pub use worker::{DeliveryWorker, WorkerHandle, WorkerSettings};
