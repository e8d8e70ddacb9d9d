use super::label;
use crate::entity::{Base, Entity};
use crate::error::{Error, Result};
use crate::index::IndexDescriptor;
use crate::kind::Kind;
use serde::{Deserialize, Serialize};

/// A client of the gateway, identified by username or custom ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Consumer {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
}

impl Consumer {
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }
}

impl Entity for Consumer {
    const KIND: Kind = Kind::Consumer;

    const INDEXES: &'static [IndexDescriptor<Self>] = &[
        IndexDescriptor::natural("username", |c| c.username.clone()),
        IndexDescriptor::natural("custom_id", |c| c.custom_id.clone()),
    ];

    stored_in!(consumers);

    fn identity(&self) -> String {
        label(
            self.username.as_deref().or(self.custom_id.as_deref()),
            &self.base,
        )
    }

    fn validate(&self) -> Result<()> {
        let named = [&self.username, &self.custom_id]
            .into_iter()
            .any(|v| v.as_deref().is_some_and(|v| !v.is_empty()));
        if !named {
            return Err(Error::MissingRequiredField {
                kind: Self::KIND,
                field: "username",
            });
        }
        Ok(())
    }
}

/// A named group of consumers sharing plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerGroup {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConsumerGroup {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Entity for ConsumerGroup {
    const KIND: Kind = Kind::ConsumerGroup;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("name", |g| g.name.clone())];

    stored_in!(consumer_groups);

    fn identity(&self) -> String {
        label(self.name.as_deref(), &self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;

    #[test]
    fn test_consumer_needs_username_or_custom_id() {
        let consumers = Collection::<Consumer>::new();
        let mut anonymous = Consumer::default();
        anonymous.base.id = Some("c1".to_string());
        assert!(consumers.add(anonymous.clone()).unwrap_err().is_validation());

        anonymous.custom_id = Some("ext-1".to_string());
        consumers.add(anonymous).unwrap();
        assert_eq!(consumers.get("ext-1").unwrap().id(), Some("c1"));
    }
}
