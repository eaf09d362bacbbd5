//! tern federation engine entry point.
//!
//! Connects the store, starts the delivery worker, and runs until SIGINT or
//! SIGTERM. The UI and web layers attach to the same store and build their
//! own `Publisher` on top of it.

use std::sync::Arc;

use anyhow::Context;
use tern_common::{Config, SystemClock};
use tern_federation::ReqwestTransport;
use tern_queue::{DeliveryQueue, DeliverySettings, DeliveryWorker, WorkerSettings};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "tern=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("failed to read .env");
        }
    }

    let config = Config::load().context("failed to load configuration")?;
    init_tracing(config.logging.json);

    info!(domain = %config.server.domain, "Starting tern...");

    let store = tern_db::open_store(&config)
        .await
        .context("failed to open store")?;

    let transport = ReqwestTransport::new(&config.server.domain)
        .context("failed to build HTTP client")?;
    info!(user_agent = %transport.user_agent(), "HTTP transport ready");

    let queue = DeliveryQueue::new(
        store,
        Arc::new(transport),
        Arc::new(SystemClock),
        DeliverySettings::from_config(&config.queue, &config.federation),
    );
    let pending = queue.pending_count().await?;
    info!(pending, "Delivery queue loaded");

    let worker = DeliveryWorker::spawn(queue, WorkerSettings::from(&config.queue));

    shutdown_signal().await;

    worker.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
