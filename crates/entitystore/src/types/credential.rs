//! Consumer credentials
//!
//! Every credential kind is owned by exactly one consumer; the store rejects
//! a credential whose `consumer` reference carries no ID.

use super::label;
use crate::entity::{Base, Entity, Reference};
use crate::error::{Error, Result};
use crate::index::{IndexDescriptor, RefField, compound_key_strict, ref_id};
use crate::kind::Kind;
use serde::{Deserialize, Serialize};

macro_rules! owned_by_consumer {
    () => {
        RefField {
            field: "consumer",
            target: Kind::Consumer,
            required: true,
            get: |c| c.consumer.as_ref(),
            get_mut: |c| &mut c.consumer,
        }
    };
}

fn require(kind: Kind, field: &'static str, value: Option<&String>) -> Result<()> {
    if value.is_none_or(|v| v.is_empty()) {
        return Err(Error::MissingRequiredField { kind, field });
    }
    Ok(())
}

/// API key credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyAuth {
    #[serde(flatten)]
    pub base: Base,
    /// Generated by the gateway when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for KeyAuth {
    const KIND: Kind = Kind::KeyAuth;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::natural("key", |c| c.key.clone())];

    const REFS: &'static [RefField<Self>] = &[owned_by_consumer!()];

    stored_in!(key_auths);

    fn identity(&self) -> String {
        label(self.key.as_deref(), &self.base)
    }
}

/// Username and password credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuth {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for BasicAuth {
    const KIND: Kind = Kind::BasicAuth;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("username", |c| c.username.clone())];

    const REFS: &'static [RefField<Self>] = &[owned_by_consumer!()];

    stored_in!(basic_auths);

    fn identity(&self) -> String {
        label(self.username.as_deref(), &self.base)
    }
}

/// HMAC signature credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmacAuth {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for HmacAuth {
    const KIND: Kind = Kind::HmacAuth;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("username", |c| c.username.clone())];

    const REFS: &'static [RefField<Self>] = &[owned_by_consumer!()];

    stored_in!(hmac_auths);

    fn identity(&self) -> String {
        label(self.username.as_deref(), &self.base)
    }
}

/// JWT signing secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSecret {
    #[serde(flatten)]
    pub base: Base,
    /// The `iss` claim value matched against incoming tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsa_public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for JwtSecret {
    const KIND: Kind = Kind::JwtSecret;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::natural("key", |c| c.key.clone())];

    const REFS: &'static [RefField<Self>] = &[owned_by_consumer!()];

    stored_in!(jwt_secrets);

    fn identity(&self) -> String {
        label(self.key.as_deref(), &self.base)
    }

    fn validate(&self) -> Result<()> {
        if self.algorithm.as_deref().is_some_and(|a| a.starts_with("RS")) {
            require(Self::KIND, "rsa_public_key", self.rsa_public_key.as_ref())?;
        }
        Ok(())
    }
}

/// Membership of a consumer in an ACL group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclGroup {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for AclGroup {
    const KIND: Kind = Kind::AclGroup;

    const INDEXES: &'static [IndexDescriptor<Self>] = &[IndexDescriptor::natural("group", |c| {
        compound_key_strict(&[ref_id(&c.consumer), c.group.as_deref()])
    })];

    const REFS: &'static [RefField<Self>] = &[owned_by_consumer!()];

    stored_in!(acl_groups);

    fn identity(&self) -> String {
        label(self.group.as_deref(), &self.base)
    }

    fn validate(&self) -> Result<()> {
        require(Self::KIND, "group", self.group.as_ref())
    }
}

/// OAuth 2.0 client application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Oauth2Credential {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_secret: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for Oauth2Credential {
    const KIND: Kind = Kind::Oauth2Credential;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::natural("client_id", |c| c.client_id.clone())];

    const REFS: &'static [RefField<Self>] = &[owned_by_consumer!()];

    stored_in!(oauth2_credentials);

    fn identity(&self) -> String {
        label(
            self.client_id.as_deref().or(self.name.as_deref()),
            &self.base,
        )
    }

    fn validate(&self) -> Result<()> {
        require(Self::KIND, "name", self.name.as_ref())
    }
}

/// Client certificate credential matched by subject name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtlsAuth {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
}

impl Entity for MtlsAuth {
    const KIND: Kind = Kind::MtlsAuth;

    const INDEXES: &'static [IndexDescriptor<Self>] = &[];

    const REFS: &'static [RefField<Self>] = &[
        owned_by_consumer!(),
        RefField {
            field: "ca_certificate",
            target: Kind::CaCertificate,
            required: false,
            get: |c| c.ca_certificate.as_ref(),
            get_mut: |c| &mut c.ca_certificate,
        },
    ];

    stored_in!(mtls_auths);

    fn identity(&self) -> String {
        label(self.subject_name.as_deref(), &self.base)
    }

    fn validate(&self) -> Result<()> {
        require(Self::KIND, "subject_name", self.subject_name.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;

    fn consumer(id: &str) -> Option<Reference> {
        Some(Reference::to_id(id))
    }

    #[test]
    fn test_acl_group_unique_per_consumer() {
        let acls = Collection::<AclGroup>::new();
        let acl = |id: &str, owner: &str| AclGroup {
            base: Base::with_id(id),
            group: Some("admins".to_string()),
            consumer: consumer(owner),
        };
        acls.add(acl("a1", "c1")).unwrap();
        acls.add(acl("a2", "c2")).unwrap();
        let err = acls.add(acl("a3", "c1")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: Kind::AclGroup, .. }));
    }

    #[test]
    fn test_credential_rejects_unresolved_consumer() {
        let creds = Collection::<BasicAuth>::new();
        let cred = BasicAuth {
            base: Base::with_id("b1"),
            username: Some("alice".to_string()),
            password: Some("pw".to_string()),
            consumer: Some(Reference::to_name("alice")),
        };
        let err = creds.add(cred).unwrap_err();
        assert_eq!(
            err,
            Error::MissingRequiredField {
                kind: Kind::BasicAuth,
                field: "consumer"
            }
        );
    }

    #[test]
    fn test_jwt_rsa_requires_public_key() {
        let jwt = JwtSecret {
            base: Base::with_id("j1"),
            algorithm: Some("RS256".to_string()),
            consumer: consumer("c1"),
            ..JwtSecret::default()
        };
        assert!(jwt.validate().is_err());
        let hmac = JwtSecret {
            algorithm: Some("HS256".to_string()),
            ..jwt
        };
        assert!(hmac.validate().is_ok());
    }
}
