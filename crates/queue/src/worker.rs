//! Background drain loop for the delivery queue.

use std::time::Duration;

use tern_common::config::QueueConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::delivery_queue::DeliveryQueue;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Interval between drain cycles (default: 5 seconds).
    pub interval: Duration,
    /// Rows claimed per cycle.
    pub batch_size: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            batch_size: 50,
        }
    }
}

impl From<&QueueConfig> for WorkerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.drain_interval_secs.max(1)),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Drains the queue on a fixed interval.
pub struct DeliveryWorker;

impl DeliveryWorker {
    /// Start draining `queue` in a background task.
    #[must_use]
    pub fn spawn(queue: DeliveryQueue, settings: WorkerSettings) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval_secs = settings.interval.as_secs(),
                batch_size = settings.batch_size,
                "Delivery worker started"
            );
            let mut ticker = interval(settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                // Keep draining while full batches come back.
                loop {
                    match queue.drain(settings.batch_size).await {
                        Ok(report) if report.claimed as u64 >= settings.batch_size => {
                            debug!(claimed = report.claimed, "Full batch drained; continuing");
                        }
                        Ok(_) => break,
                        Err(e) => {
                            error!(error = %e, "Drain cycle failed");
                            break;
                        }
                    }
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            info!("Delivery worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running [`DeliveryWorker`].
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for the in-progress cycle to
    /// finish.
    pub async fn shutdown(self) {
        // The receiver lives in the task; a send error means it already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Delivery worker task failed");
        }
    }
}
