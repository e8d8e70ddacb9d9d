use super::label;
use crate::entity::{Base, Entity, Reference};
use crate::error::{Error, Result};
use crate::index::{IndexDescriptor, RefField, digest};
use crate::kind::Kind;
use serde::{Deserialize, Serialize};

/// A TLS certificate and private key, keyed by their content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Certificate {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_alt: Option<String>,
}

impl Certificate {
    pub fn new(cert: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cert: Some(cert.into()),
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Content digest of the certificate and key pair.
    pub fn content_key(&self) -> Option<String> {
        match (self.cert.as_deref(), self.key.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => {
                Some(digest(&[cert, key]))
            }
            _ => None,
        }
    }
}

impl Entity for Certificate {
    const KIND: Kind = Kind::Certificate;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("cert_key", Self::content_key)];

    stored_in!(certificates);

    fn identity(&self) -> String {
        match self.content_key() {
            Some(key) => format!("sha:{}", &key[..12]),
            None => label(None, &self.base),
        }
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [("cert", &self.cert), ("key", &self.key)] {
            if value.as_deref().is_none_or(str::is_empty) {
                return Err(Error::MissingRequiredField {
                    kind: Self::KIND,
                    field,
                });
            }
        }
        Ok(())
    }
}

/// A server name bound to a certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sni {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Reference>,
}

impl Sni {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Entity for Sni {
    const KIND: Kind = Kind::Sni;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::required("name", |s| s.name.clone())];

    const REFS: &'static [RefField<Self>] = &[RefField {
        field: "certificate",
        target: Kind::Certificate,
        required: true,
        get: |s| s.certificate.as_ref(),
        get_mut: |s| &mut s.certificate,
    }];

    stored_in!(snis);

    fn identity(&self) -> String {
        label(self.name.as_deref(), &self.base)
    }
}

/// A trusted CA certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaCertificate {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    /// Computed by the gateway from `cert`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_digest: Option<String>,
}

impl CaCertificate {
    pub fn new(cert: impl Into<String>) -> Self {
        Self {
            cert: Some(cert.into()),
            ..Self::default()
        }
    }
}

impl Entity for CaCertificate {
    const KIND: Kind = Kind::CaCertificate;

    const INDEXES: &'static [IndexDescriptor<Self>] = &[IndexDescriptor::required("cert", |c| {
        c.cert.as_deref().filter(|c| !c.is_empty()).map(|c| digest(&[c]))
    })];

    stored_in!(ca_certificates);

    fn identity(&self) -> String {
        match self.cert.as_deref().filter(|c| !c.is_empty()) {
            Some(cert) => format!("sha:{}", &digest(&[cert])[..12]),
            None => label(None, &self.base),
        }
    }

    fn clear_computed(&mut self) {
        self.cert_digest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use crate::entity::EqualityOptions;

    #[test]
    fn test_certificate_requires_cert_and_key() {
        let certs = Collection::<Certificate>::new();
        let mut cert = Certificate::default();
        cert.base.id = Some("c1".to_string());
        cert.cert = Some("PEM".to_string());
        let err = certs.add(cert).unwrap_err();
        assert_eq!(
            err,
            Error::MissingRequiredField {
                kind: Kind::Certificate,
                field: "key"
            }
        );
    }

    #[test]
    fn test_certificate_identity_is_content_based() {
        let a = Certificate::new("PEM-A", "KEY-A");
        let b = Certificate::new("PEM-A\n", "KEY-A");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), Certificate::new("PEM-B", "KEY-A").identity());
    }

    #[test]
    fn test_ca_certificate_ignores_digest() {
        let a = CaCertificate::new("PEM");
        let mut b = a.clone();
        b.cert_digest = Some("abc".to_string());
        assert!(a.equal_with(&b, &EqualityOptions::default()));
    }
}
