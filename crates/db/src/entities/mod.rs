//! Database entities.

#![allow(missing_docs)]

pub mod account;
pub mod delivery_queue;
pub mod follow;
pub mod inbound_activity;
pub mod note;
pub mod note_like;
pub mod remote_actor;

pub use account::Entity as Account;
pub use delivery_queue::Entity as DeliveryQueue;
pub use follow::Entity as Follow;
pub use inbound_activity::Entity as InboundActivity;
pub use note::Entity as Note;
pub use note_like::Entity as NoteLike;
pub use remote_actor::Entity as RemoteActor;
