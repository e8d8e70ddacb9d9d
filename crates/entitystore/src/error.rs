//! Error types for the entity store.
//!
//! Every failure carries the kind of the entity involved so that callers
//! collecting errors across a whole run can report them without extra
//! context.

use crate::kind::Kind;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Lookup by ID or natural key found nothing
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Kind of the collection searched
        kind: Kind,
        /// ID or natural key that was looked up
        key: String,
    },

    /// Insert would violate an ID or unique-index constraint
    #[error("{kind} already exists with {index} `{key}`")]
    AlreadyExists {
        /// Kind of the rejected entity
        kind: Kind,
        /// Name of the violated index (`id` for the primary key)
        index: &'static str,
        /// Conflicting key value
        key: String,
    },

    /// A mandatory field (ID, owning reference, required key) is empty
    #[error("{kind} is missing required field `{field}`")]
    MissingRequiredField {
        /// Kind of the rejected entity
        kind: Kind,
        /// Name of the missing field
        field: &'static str,
    },

    /// A foreign reference could not be resolved to an existing entity
    #[error("{kind} references unknown {target} `{reference}`")]
    InvalidReference {
        /// Kind of the referencing entity
        kind: Kind,
        /// Kind of the referenced entity
        target: Kind,
        /// The unresolved name or ID
        reference: String,
    },

    /// A lookup matched more than one distinct entity
    #[error("{kind} lookup `{key}` is ambiguous, matches {ids:?}")]
    Ambiguous {
        /// Kind of the collection searched
        kind: Kind,
        /// Key that was looked up
        key: String,
        /// IDs of every matching entity
        ids: Vec<String>,
    },

    /// A value tagged with one kind was handed to another kind's code path
    #[error("expected a {expected} value, found {found}")]
    KindMismatch {
        /// Kind the caller expected
        expected: Kind,
        /// Kind (or description) of the value found
        found: String,
    },

    /// Entity could not be converted to or from its JSON form
    #[error("failed to decode {kind}: {message}")]
    Decode {
        /// Kind being decoded
        kind: Kind,
        /// Underlying serde message
        message: String,
    },
}

impl Error {
    /// Kind of the entity this error concerns.
    pub fn kind(&self) -> Kind {
        match self {
            Self::NotFound { kind, .. }
            | Self::AlreadyExists { kind, .. }
            | Self::MissingRequiredField { kind, .. }
            | Self::InvalidReference { kind, .. }
            | Self::Ambiguous { kind, .. }
            | Self::Decode { kind, .. } => *kind,
            Self::KindMismatch { expected, .. } => *expected,
        }
    }

    /// Whether this is a plain lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a validation failure that no retry can fix.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredField { .. } | Self::InvalidReference { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = Error::NotFound {
            kind: Kind::Route,
            key: "bar".to_string(),
        };
        assert_eq!(err.kind(), Kind::Route);
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = Error::MissingRequiredField {
            kind: Kind::KeyAuth,
            field: "consumer",
        };
        assert_eq!(err.to_string(), "key_auth is missing required field `consumer`");

        let err = Error::InvalidReference {
            kind: Kind::Route,
            target: Kind::Service,
            reference: "foo".to_string(),
        };
        assert_eq!(err.to_string(), "route references unknown service `foo`");
        assert!(err.is_validation());
    }
}
