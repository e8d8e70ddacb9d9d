//! Declarative index descriptors
//!
//! Each entity kind declares its secondary indices once, as a static table of
//! extractor functions. The generic collection builds and maintains them, so
//! no kind hand-writes its own lookup code.

use crate::entity::Reference;
use crate::kind::Kind;
use std::fmt;

/// Separator between the parts of a compound key.
const KEY_SEPARATOR: char = '\u{1f}';

/// Extracts an index key from an entity; `None` means the value is missing.
pub type KeyFn<E> = fn(&E) -> Option<String>;

/// Descriptor of one secondary index over a kind.
pub struct IndexDescriptor<E> {
    /// Index name, reported in constraint errors
    pub name: &'static str,
    /// Whether two entities may share a key
    pub unique: bool,
    /// Whether an entity without a key value may be stored
    pub allow_missing: bool,
    /// Key extractor
    pub extract: KeyFn<E>,
}

impl<E> IndexDescriptor<E> {
    /// A unique natural key that may be absent (e.g. a route's name).
    pub const fn natural(name: &'static str, extract: KeyFn<E>) -> Self {
        Self {
            name,
            unique: true,
            allow_missing: true,
            extract,
        }
    }

    /// A unique natural key every entity of the kind must carry.
    pub const fn required(name: &'static str, extract: KeyFn<E>) -> Self {
        Self {
            name,
            unique: true,
            allow_missing: false,
            extract,
        }
    }

    /// A non-unique lookup index.
    pub const fn lookup(name: &'static str, extract: KeyFn<E>) -> Self {
        Self {
            name,
            unique: false,
            allow_missing: true,
            extract,
        }
    }

    /// Key of `entity` under this index.
    pub fn key(&self, entity: &E) -> Option<String> {
        (self.extract)(entity).filter(|k| !k.is_empty())
    }
}

impl<E> fmt::Debug for IndexDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDescriptor")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .field("allow_missing", &self.allow_missing)
            .finish()
    }
}

/// Descriptor of one foreign reference field of a kind.
///
/// The store derives a non-unique foreign-key index from every reference
/// field, and rejects entities whose `required` references carry no ID.
pub struct RefField<E> {
    /// Field name, both in Rust and in the JSON payload
    pub field: &'static str,
    /// Kind of the referenced entity
    pub target: Kind,
    /// Whether the reference is a mandatory owning relationship
    pub required: bool,
    /// Read accessor
    pub get: fn(&E) -> Option<&Reference>,
    /// Write accessor
    pub get_mut: fn(&mut E) -> &mut Option<Reference>,
}

impl<E> RefField<E> {
    /// Resolved ID of the reference on `entity`, if any.
    pub fn id<'a>(&self, entity: &'a E) -> Option<&'a str> {
        (self.get)(entity).and_then(Reference::resolved_id)
    }
}

impl<E> fmt::Debug for RefField<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefField")
            .field("field", &self.field)
            .field("target", &self.target)
            .field("required", &self.required)
            .finish()
    }
}

/// Join key parts into one compound key; missing parts become empty.
pub fn compound_key(parts: &[Option<&str>]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part.unwrap_or_default());
    }
    key
}

/// Compound key that requires every part to be present.
pub fn compound_key_strict(parts: &[Option<&str>]) -> Option<String> {
    if parts.iter().any(|p| p.is_none_or(str::is_empty)) {
        return None;
    }
    Some(compound_key(parts))
}

/// Content digest used as a key for large values such as PEM certificates.
pub fn digest(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.trim().as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Resolved ID of an optional reference.
pub fn ref_id(reference: &Option<Reference>) -> Option<&str> {
    reference.as_ref().and_then(Reference::resolved_id)
}
