//! In-memory store of gateway configuration entities
//!
//! A [`Store`] is one snapshot of gateway state: a generic, indexed
//! [`Collection`] per entity [`Kind`]. Each kind declares its natural keys and
//! foreign references once, as static descriptors on its [`Entity`] impl, and
//! the collection enforces them uniformly:
//!
//! - IDs are non-empty and unique per kind
//! - unique natural keys (a service's name, a plugin's scope) stay unique
//! - mandatory owners (a credential's consumer) carry a resolved ID
//!
//! Every write runs in a transaction that either commits or leaves the
//! collection untouched.

mod collection;
mod entity;
mod error;
mod index;
mod kind;
mod store;
pub mod types;

pub use collection::Collection;
pub use entity::{Base, Entity, EqualityOptions, Record, Reference};
pub use error::{Error, Result};
pub use index::{IndexDescriptor, KeyFn, RefField, compound_key, compound_key_strict, digest, ref_id};
pub use kind::Kind;
pub use store::Store;
