use crate::entity::{Base, Entity, Reference};
use crate::error::{Error, Result};
use crate::index::{IndexDescriptor, RefField, compound_key, ref_id};
use crate::kind::Kind;
use serde::{Deserialize, Serialize};

/// A plugin instance, global or scoped to a service, route, consumer or
/// consumer group (or a combination of them).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plugin {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<Reference>,
}

impl Plugin {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Key over the name and every scope reference.
    fn scope_key(&self) -> Option<String> {
        let name = self.name.as_deref().filter(|n| !n.is_empty())?;
        Some(compound_key(&[
            Some(name),
            ref_id(&self.service),
            ref_id(&self.route),
            ref_id(&self.consumer),
            ref_id(&self.consumer_group),
        ]))
    }

    /// The scope references that are set, as `field=label` pairs.
    fn scope_labels(&self) -> Vec<String> {
        Self::REFS
            .iter()
            .filter_map(|f| (f.get)(self).map(|r| format!("{}={}", f.field, r.label())))
            .collect()
    }
}

impl Entity for Plugin {
    const KIND: Kind = Kind::Plugin;

    const INDEXES: &'static [IndexDescriptor<Self>] = &[
        IndexDescriptor::required("scope", Self::scope_key),
        IndexDescriptor::lookup("name", |p| p.name.clone()),
    ];

    const REFS: &'static [RefField<Self>] = &[
        RefField {
            field: "service",
            target: Kind::Service,
            required: false,
            get: |p| p.service.as_ref(),
            get_mut: |p| &mut p.service,
        },
        RefField {
            field: "route",
            target: Kind::Route,
            required: false,
            get: |p| p.route.as_ref(),
            get_mut: |p| &mut p.route,
        },
        RefField {
            field: "consumer",
            target: Kind::Consumer,
            required: false,
            get: |p| p.consumer.as_ref(),
            get_mut: |p| &mut p.consumer,
        },
        RefField {
            field: "consumer_group",
            target: Kind::ConsumerGroup,
            required: false,
            get: |p| p.consumer_group.as_ref(),
            get_mut: |p| &mut p.consumer_group,
        },
    ];

    stored_in!(plugins);

    fn identity(&self) -> String {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        let scope = self.scope_labels();
        if scope.is_empty() {
            format!("{name} (global)")
        } else {
            format!("{name} ({})", scope.join(", "))
        }
    }

    fn fill_defaults(&mut self) {
        self.enabled.get_or_insert(true);
        if self.protocols.is_empty() {
            self.protocols = ["grpc", "grpcs", "http", "https"].map(String::from).to_vec();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_none_or(str::is_empty) {
            return Err(Error::MissingRequiredField {
                kind: Self::KIND,
                field: "name",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_names_scope() {
        let mut plugin = Plugin::named("cors");
        assert_eq!(plugin.identity(), "cors (global)");
        plugin.route = Some(Reference::to_name("bar"));
        plugin.consumer = Some(Reference::to_id("c1"));
        assert_eq!(plugin.identity(), "cors (route=bar, consumer=c1)");
    }

    #[test]
    fn test_scope_key_distinguishes_positions() {
        let mut on_service = Plugin::named("cors");
        on_service.service = Some(Reference::to_id("x"));
        let mut on_route = Plugin::named("cors");
        on_route.route = Some(Reference::to_id("x"));
        assert_ne!(on_service.scope_key(), on_route.scope_key());
    }

    #[test]
    fn test_foreign_keys_do_not_affect_equality() {
        let mut a = Plugin::named("cors");
        a.config = Some(serde_json::json!({"origins": ["*"]}));
        a.service = Some(Reference::to_id("s1"));
        let mut b = a.clone();
        b.service = Some(Reference::to_id("s2"));
        assert!(a.equal_with(&b, &crate::entity::EqualityOptions::default()));
        b.config = Some(serde_json::json!({"origins": ["example.com"]}));
        assert!(!a.equal_with(&b, &crate::entity::EqualityOptions::default()));
    }
}
