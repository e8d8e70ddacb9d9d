use super::label;
use crate::entity::{Base, Entity, Reference};
use crate::error::{Error, Result};
use crate::index::{IndexDescriptor, RefField, compound_key_strict, ref_id};
use crate::kind::Kind;
use serde::{Deserialize, Serialize};

/// A virtual hostname load-balanced over targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upstream {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthchecks: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<Reference>,
}

impl Upstream {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Entity for Upstream {
    const KIND: Kind = Kind::Upstream;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("name", |u| u.name.clone())];

    const REFS: &'static [RefField<Self>] = &[RefField {
        field: "client_certificate",
        target: Kind::Certificate,
        required: false,
        get: |u| u.client_certificate.as_ref(),
        get_mut: |u| &mut u.client_certificate,
    }];

    stored_in!(upstreams);

    fn identity(&self) -> String {
        label(self.name.as_deref(), &self.base)
    }

    fn fill_defaults(&mut self) {
        self.algorithm.get_or_insert_with(|| "round-robin".to_string());
        self.slots.get_or_insert(10_000);
        self.hash_on.get_or_insert_with(|| "none".to_string());
        self.hash_fallback.get_or_insert_with(|| "none".to_string());
    }
}

/// One backend address of an upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Target {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Reference>,
}

impl Entity for Target {
    const KIND: Kind = Kind::Target;

    const INDEXES: &'static [IndexDescriptor<Self>] = &[IndexDescriptor::natural("target", |t| {
        compound_key_strict(&[ref_id(&t.upstream), t.target.as_deref()])
    })];

    const REFS: &'static [RefField<Self>] = &[RefField {
        field: "upstream",
        target: Kind::Upstream,
        required: true,
        get: |t| t.upstream.as_ref(),
        get_mut: |t| &mut t.upstream,
    }];

    stored_in!(targets);

    fn identity(&self) -> String {
        label(self.target.as_deref(), &self.base)
    }

    fn fill_defaults(&mut self) {
        self.weight.get_or_insert(100);
    }

    fn validate(&self) -> Result<()> {
        if self.target.as_deref().is_none_or(str::is_empty) {
            return Err(Error::MissingRequiredField {
                kind: Self::KIND,
                field: "target",
            });
        }
        Ok(())
    }
}
