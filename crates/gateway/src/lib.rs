//! Gateway Admin API client
//!
//! [`GatewayApi`] is the contract the reconciler needs from the remote
//! gateway: per-kind create, update, delete and list over JSON entities.
//!
//! Two implementations are provided:
//!
//! - [`HttpGateway`]: blocking HTTP client for a Kong-style Admin API
//! - [`MemoryGateway`]: in-memory double with a call log, failure injection
//!   and referential checks, used by tests and offline runs

mod error;
mod http;
mod memory;

pub use error::{ApiError, ErrorCategory, Result};
pub use http::HttpGateway;
pub use memory::{Call, MemoryGateway};

use entitystore::Kind;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Operation performed against the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Create,
    Update,
    Delete,
    List,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        };
        f.write_str(s)
    }
}

/// Remote gateway API.
///
/// Implementations must be thread-safe: the executor calls them from
/// several worker threads at once.
pub trait GatewayApi: Send + Sync {
    /// Create an entity; returns the stored entity including its ID.
    fn create(&self, kind: Kind, entity: &Value) -> Result<Value>;

    /// Replace the entity with `id`; returns the stored entity.
    fn update(&self, kind: Kind, id: &str, entity: &Value) -> Result<Value>;

    /// Delete the entity with `id`. `entity` is its last known value, needed
    /// to address nested kinds.
    fn delete(&self, kind: Kind, id: &str, entity: &Value) -> Result<()>;

    /// Every entity of `kind`.
    fn list(&self, kind: Kind) -> Result<Vec<Value>>;
}

impl<T: GatewayApi + ?Sized> GatewayApi for Arc<T> {
    fn create(&self, kind: Kind, entity: &Value) -> Result<Value> {
        (**self).create(kind, entity)
    }

    fn update(&self, kind: Kind, id: &str, entity: &Value) -> Result<Value> {
        (**self).update(kind, id, entity)
    }

    fn delete(&self, kind: Kind, id: &str, entity: &Value) -> Result<()> {
        (**self).delete(kind, id, entity)
    }

    fn list(&self, kind: Kind) -> Result<Vec<Value>> {
        (**self).list(kind)
    }
}

/// The string `id` field of a JSON entity.
pub fn entity_id(entity: &Value) -> Option<&str> {
    entity
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// The ID inside the reference object stored under `field`.
pub fn reference_id<'a>(entity: &'a Value, field: &str) -> Option<&'a str> {
    entity
        .get(field)
        .and_then(|r| r.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}
