//! Common utilities and shared types for tern.
//!
//! This crate provides foundational components used across all tern crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Clock**: Injectable time source via [`Clock`]
//! - **Cryptography**: RSA key generation for `ActivityPub` signatures
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Local URIs**: Canonical IRIs for local actors and objects via [`LocalUris`]
//!
//! # Example
//!
//! ```no_run
//! use tern_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("{} -> {}", config.server.domain, id);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod uris;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use crypto::{RsaKeypair, generate_rsa_keypair};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use uris::{LocalUris, PUBLIC_COLLECTION, authority, key_id, last_path_segment};
