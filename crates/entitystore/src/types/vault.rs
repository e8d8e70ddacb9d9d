use super::label;
use crate::entity::{Base, Entity};
use crate::index::IndexDescriptor;
use crate::kind::Kind;
use serde::{Deserialize, Serialize};

/// A secret backend addressed through `{vault://<prefix>/...}` references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vault {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Entity for Vault {
    const KIND: Kind = Kind::Vault;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("prefix", |v| v.prefix.clone())];

    stored_in!(vaults);

    fn identity(&self) -> String {
        label(self.prefix.as_deref(), &self.base)
    }
}
