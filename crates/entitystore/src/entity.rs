//! Entity trait, references, and the stored record wrapper

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::index::{IndexDescriptor, RefField};
use crate::kind::Kind;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields every entity carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Base {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Base {
    /// A base carrying only an ID.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Pointer to another entity.
///
/// Declarative input may name the target instead of giving its ID; such a
/// reference is only valid once it has been resolved to an ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Reference {
    /// Reference by ID.
    pub fn to_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    /// Reference by name or natural key, still to be resolved.
    pub fn to_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// The ID, if the reference is resolved.
    pub fn resolved_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whatever identifies the target, for messages.
    pub fn label(&self) -> &str {
        self.resolved_id()
            .or(self.name.as_deref())
            .unwrap_or("<empty>")
    }
}

/// Which fields structural equality ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualityOptions {
    pub ignore_id: bool,
    pub ignore_timestamps: bool,
    pub ignore_foreign: bool,
}

impl Default for EqualityOptions {
    fn default() -> Self {
        Self {
            ignore_id: true,
            ignore_timestamps: true,
            ignore_foreign: true,
        }
    }
}

/// A gateway configuration entity of one [`Kind`].
///
/// Implementations are small strategy objects: they declare indices and
/// references as static tables and may override validation and
/// normalisation. All storage logic lives in [`Collection`].
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: Kind;

    /// Unique secondary indices, tried in order by lookups.
    const INDEXES: &'static [IndexDescriptor<Self>];

    /// Foreign reference fields.
    const REFS: &'static [RefField<Self>] = &[];

    fn base(&self) -> &Base;

    fn base_mut(&mut self) -> &mut Base;

    /// Human-readable natural identity, for output and errors.
    fn identity(&self) -> String;

    /// The collection holding this kind inside a store.
    fn collection(store: &Store) -> &Collection<Self>;

    /// Kind-specific checks beyond the declared indices.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Clear server-computed fields that never represent an intended change.
    fn clear_computed(&mut self) {}

    /// Set unset fields to the values the gateway fills in on write.
    fn fill_defaults(&mut self) {}

    fn id(&self) -> Option<&str> {
        self.base().id.as_deref().filter(|id| !id.is_empty())
    }

    fn set_id(&mut self, id: String) {
        self.base_mut().id = Some(id);
    }

    fn tags(&self) -> &[String] {
        &self.base().tags
    }

    /// Append tags not already present, keeping existing order.
    fn merge_tags(&mut self, tags: &[String]) {
        let own = &mut self.base_mut().tags;
        for tag in tags {
            if !own.contains(tag) {
                own.push(tag.clone());
            }
        }
    }

    /// Whether the entity carries every one of `tags`.
    fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags().contains(t))
    }

    /// Copy of the entity with ignored fields cleared.
    fn normalized(&self, opts: &EqualityOptions) -> Self {
        let mut copy = self.clone();
        let base = copy.base_mut();
        if opts.ignore_id {
            base.id = None;
        }
        if opts.ignore_timestamps {
            base.created_at = None;
            base.updated_at = None;
        }
        base.tags.sort();
        base.tags.dedup();
        if opts.ignore_foreign {
            for field in Self::REFS {
                *(field.get_mut)(&mut copy) = None;
            }
        }
        copy.fill_defaults();
        copy.clear_computed();
        copy
    }

    /// Structural equality under `opts`. Lists compare positionally.
    fn equal_with(&self, other: &Self, opts: &EqualityOptions) -> bool {
        self.normalized(opts) == other.normalized(opts)
    }

    /// JSON form of the entity.
    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Decode {
            kind: Self::KIND,
            message: e.to_string(),
        })
    }

    /// Parse the entity from its JSON form.
    fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::Decode {
            kind: Self::KIND,
            message: e.to_string(),
        })
    }

    /// Parse a JSON value tagged with `kind`, rejecting values of other kinds.
    fn from_tagged(kind: Kind, value: serde_json::Value) -> Result<Self> {
        if kind != Self::KIND {
            return Err(Error::KindMismatch {
                expected: Self::KIND,
                found: kind.to_string(),
            });
        }
        Self::from_value(value)
    }
}

/// A stored entity plus side metadata.
///
/// Metadata never reaches the gateway and never takes part in equality; it
/// records facts about the entity gathered during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<E> {
    entity: E,
    metadata: BTreeMap<String, String>,
}

impl<E> Record<E> {
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    /// A record holding `entity` with this record's metadata.
    pub fn replaced(&self, entity: E) -> Self {
        Self {
            entity,
            metadata: self.metadata.clone(),
        }
    }

    pub fn into_entity(self) -> E {
        self.entity
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn metadata_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<E> From<E> for Record<E> {
    fn from(entity: E) -> Self {
        Self::new(entity)
    }
}
