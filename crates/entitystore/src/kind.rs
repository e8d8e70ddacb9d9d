//! Entity kinds and kind-level dispatch

use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a gateway entity.
///
/// Declaration order is dependency order: a kind only ever references kinds
/// declared before it, so `Ord` gives "parents first".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Vault,
    CaCertificate,
    Certificate,
    Sni,
    Service,
    Route,
    Upstream,
    Target,
    ConsumerGroup,
    Consumer,
    KeyAuth,
    BasicAuth,
    HmacAuth,
    JwtSecret,
    AclGroup,
    Oauth2Credential,
    MtlsAuth,
    Plugin,
}

impl Kind {
    /// Every kind, parents first.
    pub const ALL: [Kind; 18] = [
        Kind::Vault,
        Kind::CaCertificate,
        Kind::Certificate,
        Kind::Sni,
        Kind::Service,
        Kind::Route,
        Kind::Upstream,
        Kind::Target,
        Kind::ConsumerGroup,
        Kind::Consumer,
        Kind::KeyAuth,
        Kind::BasicAuth,
        Kind::HmacAuth,
        Kind::JwtSecret,
        Kind::AclGroup,
        Kind::Oauth2Credential,
        Kind::MtlsAuth,
        Kind::Plugin,
    ];

    /// Snake-case name used in declarative files and output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vault => "vault",
            Self::CaCertificate => "ca_certificate",
            Self::Certificate => "certificate",
            Self::Sni => "sni",
            Self::Service => "service",
            Self::Route => "route",
            Self::Upstream => "upstream",
            Self::Target => "target",
            Self::ConsumerGroup => "consumer_group",
            Self::Consumer => "consumer",
            Self::KeyAuth => "key_auth",
            Self::BasicAuth => "basic_auth",
            Self::HmacAuth => "hmac_auth",
            Self::JwtSecret => "jwt_secret",
            Self::AclGroup => "acl_group",
            Self::Oauth2Credential => "oauth2_credential",
            Self::MtlsAuth => "mtls_auth",
            Self::Plugin => "plugin",
        }
    }

    /// Collection path on the gateway's admin API.
    pub fn api_path(&self) -> &'static str {
        match self {
            Self::Vault => "vaults",
            Self::CaCertificate => "ca_certificates",
            Self::Certificate => "certificates",
            Self::Sni => "snis",
            Self::Service => "services",
            Self::Route => "routes",
            Self::Upstream => "upstreams",
            Self::Target => "targets",
            Self::ConsumerGroup => "consumer_groups",
            Self::Consumer => "consumers",
            Self::KeyAuth => "key-auths",
            Self::BasicAuth => "basic-auths",
            Self::HmacAuth => "hmac-auths",
            Self::JwtSecret => "jwts",
            Self::AclGroup => "acls",
            Self::Oauth2Credential => "oauth2",
            Self::MtlsAuth => "mtls-auths",
            Self::Plugin => "plugins",
        }
    }

    /// Whether this kind is a consumer credential.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            Self::KeyAuth
                | Self::BasicAuth
                | Self::HmacAuth
                | Self::JwtSecret
                | Self::AclGroup
                | Self::Oauth2Credential
                | Self::MtlsAuth
        )
    }

    /// Reference fields of this kind and the kinds they point at.
    pub fn reference_fields(&self) -> Vec<(&'static str, Kind)> {
        crate::with_entity_type!(*self, E => E::REFS.iter().map(|f| (f.field, f.target)).collect())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized || k.api_path().replace('-', "_") == normalized)
            .ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

/// Run an expression with a type alias bound to the entity type of a [`Kind`].
///
/// ```ignore
/// let count = with_entity_type!(kind, E => store.collection::<E>().len());
/// ```
#[macro_export]
macro_rules! with_entity_type {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            $crate::Kind::Vault => {
                type $ty = $crate::types::Vault;
                $body
            }
            $crate::Kind::CaCertificate => {
                type $ty = $crate::types::CaCertificate;
                $body
            }
            $crate::Kind::Certificate => {
                type $ty = $crate::types::Certificate;
                $body
            }
            $crate::Kind::Sni => {
                type $ty = $crate::types::Sni;
                $body
            }
            $crate::Kind::Service => {
                type $ty = $crate::types::Service;
                $body
            }
            $crate::Kind::Route => {
                type $ty = $crate::types::Route;
                $body
            }
            $crate::Kind::Upstream => {
                type $ty = $crate::types::Upstream;
                $body
            }
            $crate::Kind::Target => {
                type $ty = $crate::types::Target;
                $body
            }
            $crate::Kind::ConsumerGroup => {
                type $ty = $crate::types::ConsumerGroup;
                $body
            }
            $crate::Kind::Consumer => {
                type $ty = $crate::types::Consumer;
                $body
            }
            $crate::Kind::KeyAuth => {
                type $ty = $crate::types::KeyAuth;
                $body
            }
            $crate::Kind::BasicAuth => {
                type $ty = $crate::types::BasicAuth;
                $body
            }
            $crate::Kind::HmacAuth => {
                type $ty = $crate::types::HmacAuth;
                $body
            }
            $crate::Kind::JwtSecret => {
                type $ty = $crate::types::JwtSecret;
                $body
            }
            $crate::Kind::AclGroup => {
                type $ty = $crate::types::AclGroup;
                $body
            }
            $crate::Kind::Oauth2Credential => {
                type $ty = $crate::types::Oauth2Credential;
                $body
            }
            $crate::Kind::MtlsAuth => {
                type $ty = $crate::types::MtlsAuth;
                $body
            }
            $crate::Kind::Plugin => {
                type $ty = $crate::types::Plugin;
                $body
            }
        }
    };
}
