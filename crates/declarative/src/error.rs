//! Error types for reconciliation

use entitystore::Kind;
use gateway::{ApiError, Op};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, reconciling, planning or executing changes.
#[derive(Debug, Error)]
pub enum Error {
    /// An entity violated a store invariant
    #[error("{kind} `{identity}`: {source}")]
    Entity {
        kind: Kind,
        identity: String,
        #[source]
        source: entitystore::Error,
    },

    /// Store error not tied to one input entity
    #[error(transparent)]
    Store(#[from] entitystore::Error),

    /// The gateway rejected or failed an operation
    #[error("{op} {kind} `{identity}` failed: {source}")]
    RemoteOperationFailed {
        op: Op,
        kind: Kind,
        identity: String,
        #[source]
        source: ApiError,
    },

    /// Listing entities from the gateway failed
    #[error("cannot list {kind}: {source}")]
    List {
        kind: Kind,
        #[source]
        source: ApiError,
    },

    /// Not attempted because a prerequisite failed
    #[error("skipped: {cause} failed")]
    DependencySkipped { cause: String },

    /// Not attempted because the run was cancelled
    #[error("cancelled before it started")]
    Cancelled,

    /// The dependency graph has a cycle
    #[error("dependency cycle through: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    /// No handler is registered for the kind
    #[error("no handler registered for {kind}")]
    NoHandler { kind: Kind },

    /// A declarative file could not be read or parsed
    #[error("cannot load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Two input files disagree on the selector tags
    #[error("conflicting select_tags: {first:?} vs {second:?}")]
    SelectTagConflict {
        first: Vec<String>,
        second: Vec<String>,
    },

    /// JSON conversion failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Worker pool could not be created
    #[error("cannot start worker pool: {0}")]
    Pool(String),
}

impl Error {
    /// Wrap a store error with the entity it concerns.
    pub fn entity(kind: Kind, identity: impl Into<String>, source: entitystore::Error) -> Self {
        Self::Entity {
            kind,
            identity: identity.into(),
            source,
        }
    }

    /// Whether the gateway reported that the entity does not exist.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::RemoteOperationFailed { source, .. } if source.is_not_found())
    }

    /// Whether this error is a skip caused by another node's failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::DependencySkipped { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_not_found() {
        let err = Error::RemoteOperationFailed {
            op: Op::Delete,
            kind: Kind::Route,
            identity: "bar".to_string(),
            source: ApiError::NotFound {
                kind: Kind::Route,
                id: "r1".to_string(),
            },
        };
        assert!(err.is_remote_not_found());
        assert_eq!(
            err.to_string(),
            "delete route `bar` failed: route r1 not found on the gateway"
        );
        assert!(!Error::Cancelled.is_remote_not_found());
    }

    #[test]
    fn test_entity_error_message() {
        let err = Error::entity(
            Kind::KeyAuth,
            "k1",
            entitystore::Error::MissingRequiredField {
                kind: Kind::KeyAuth,
                field: "consumer",
            },
        );
        assert_eq!(
            err.to_string(),
            "key_auth `k1`: key_auth is missing required field `consumer`"
        );
    }
}
