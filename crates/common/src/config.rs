//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Federation configuration.
    #[serde(default)]
    pub federation: FederationConfig,
    /// Delivery queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Local domain, e.g. `example.com`. Every local IRI is built from it.
    pub domain: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL. `memory` selects the in-process store.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// How long a cached remote actor is served without refetching.
    #[serde(default = "default_actor_ttl_hours")]
    pub actor_ttl_hours: u64,
    /// Timeout for `WebFinger` lookups.
    #[serde(default = "default_webfinger_timeout_secs")]
    pub webfinger_timeout_secs: u64,
    /// Timeout for remote actor fetches.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Timeout for a single inbox delivery.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

/// Delivery queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Interval between drain cycles.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    /// Maximum rows claimed per drain cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Maximum deliveries in flight within one drain cycle.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts after which an item is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure.
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    /// Upper bound on the retry delay.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Minimum time a claim pushes `next_retry_at` while an item is in
    /// flight. Each drain raises it to cover the whole batch timing out.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_actor_ttl_hours() -> u64 {
    24
}

const fn default_webfinger_timeout_secs() -> u64 {
    5
}

const fn default_fetch_timeout_secs() -> u64 {
    10
}

const fn default_delivery_timeout_secs() -> u64 {
    30
}

const fn default_drain_interval_secs() -> u64 {
    5
}

const fn default_batch_size() -> u64 {
    50
}

const fn default_concurrency() -> usize {
    8
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_initial_backoff_secs() -> u64 {
    60
}

const fn default_max_backoff_secs() -> u64 {
    12 * 3600
}

const fn default_claim_lease_secs() -> u64 {
    120
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            actor_ttl_hours: default_actor_ttl_hours(),
            webfinger_timeout_secs: default_webfinger_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

impl FederationConfig {
    /// Actor cache TTL as a duration.
    #[must_use]
    pub const fn actor_ttl(&self) -> Duration {
        Duration::from_secs(self.actor_ttl_hours * 3600)
    }

    /// `WebFinger` timeout as a duration.
    #[must_use]
    pub const fn webfinger_timeout(&self) -> Duration {
        Duration::from_secs(self.webfinger_timeout_secs)
    }

    /// Actor fetch timeout as a duration.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Delivery timeout as a duration.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval_secs(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TERN_ENV`)
    /// 3. Environment variables with `TERN__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("TERN_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TERN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TERN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
