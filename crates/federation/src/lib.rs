//! `ActivityPub` federation for tern.
//!
//! This crate implements the outbound side of the protocol:
//!
//! - **Signer**: HTTP signatures (draft-cavage, `rsa-sha256`) via [`HttpSigner`]
//! - **`WebFinger`**: `@user@domain` handle resolution via [`WebFingerResolver`]
//! - **Actors**: remote actor fetch and cache via [`ActorResolver`]
//! - **Activities**: Create, Update, Delete, Follow, Accept, Undo, Like payloads
//! - **Publishing**: addressing and fan-out via [`Publisher`]
//!
//! Delivery itself is behind [`ActivityDelivery`]; the queue crate provides
//! the durable implementation. All network access goes through
//! [`Transport`] so tests can substitute [`test_utils::MockTransport`].

pub mod activities;
pub mod actor;
pub mod delivery;
pub mod publisher;
pub mod signature;
pub mod test_utils;
pub mod transport;
pub mod webfinger;

pub use activities::{Activity, ActivityError, ActivityKind, NoteObject, Tag};
pub use actor::{ActorDocument, ActorError, ActorResolver};
pub use delivery::ActivityDelivery;
pub use publisher::{NoteDraft, PublishError, PublishResult, Published, Publisher};
pub use signature::{HttpSigner, SignatureError, SignedHeaders};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};
pub use webfinger::{WebFingerError, WebFingerResolver, parse_handle};
