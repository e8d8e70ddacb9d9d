use super::label;
use crate::entity::{Base, Entity, Reference};
use crate::index::{IndexDescriptor, RefField};
use crate::kind::Kind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// An upstream API the gateway proxies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_verify: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ca_certificates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<Reference>,
}

impl Service {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Entity for Service {
    const KIND: Kind = Kind::Service;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::natural("name", |s| s.name.clone())];

    const REFS: &'static [RefField<Self>] = &[RefField {
        field: "client_certificate",
        target: Kind::Certificate,
        required: false,
        get: |s| s.client_certificate.as_ref(),
        get_mut: |s| &mut s.client_certificate,
    }];

    stored_in!(services);

    fn identity(&self) -> String {
        label(self.name.as_deref(), &self.base)
    }

    fn fill_defaults(&mut self) {
        let protocol = self.protocol.get_or_insert_with(|| "http".to_string());
        let port = if matches!(protocol.as_str(), "https" | "grpcs" | "tls") {
            443
        } else {
            80
        };
        self.port.get_or_insert(port);
        self.retries.get_or_insert(5);
        self.connect_timeout.get_or_insert(DEFAULT_TIMEOUT_MS);
        self.write_timeout.get_or_insert(DEFAULT_TIMEOUT_MS);
        self.read_timeout.get_or_insert(DEFAULT_TIMEOUT_MS);
        self.enabled.get_or_insert(true);
    }
}

/// Request-matching rule that forwards to a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    #[serde(flatten)]
    pub base: Base,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snis: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex_priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_redirect_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_handling: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_buffering: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_buffering: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Reference>,
}

impl Route {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Entity for Route {
    const KIND: Kind = Kind::Route;

    const INDEXES: &'static [IndexDescriptor<Self>] =
        &[IndexDescriptor::natural("name", |r| r.name.clone())];

    const REFS: &'static [RefField<Self>] = &[RefField {
        field: "service",
        target: Kind::Service,
        required: false,
        get: |r| r.service.as_ref(),
        get_mut: |r| &mut r.service,
    }];

    stored_in!(routes);

    fn identity(&self) -> String {
        label(self.name.as_deref(), &self.base)
    }

    fn fill_defaults(&mut self) {
        if self.protocols.is_empty() {
            self.protocols = vec!["http".to_string(), "https".to_string()];
        }
        self.strip_path.get_or_insert(true);
        self.preserve_host.get_or_insert(false);
        self.regex_priority.get_or_insert(0);
        self.https_redirect_status_code.get_or_insert(426);
        self.path_handling.get_or_insert_with(|| "v0".to_string());
        self.request_buffering.get_or_insert(true);
        self.response_buffering.get_or_insert(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EqualityOptions;

    #[test]
    fn test_service_json_shape() {
        let mut svc = Service::named("foo");
        svc.base.id = Some("s1".to_string());
        svc.host = Some("example.com".to_string());
        let value = svc.to_value().unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": "s1", "name": "foo", "host": "example.com"})
        );
    }

    #[test]
    fn test_route_parses_gateway_payload() {
        let value = serde_json::json!({
            "id": "r1",
            "name": "bar",
            "paths": ["/bar"],
            "service": {"id": "s1"},
            "created_at": 1_700_000_000,
            "unknown_field": true
        });
        let route = Route::from_value(value).unwrap();
        assert_eq!(route.service, Some(Reference::to_id("s1")));
        assert_eq!(route.base.created_at, Some(1_700_000_000));
        assert_eq!(route.identity(), "bar");
    }

    #[test]
    fn test_gateway_defaults_match_sparse_declaration() {
        let declared = Service::named("foo");
        let stored = Service::from_value(serde_json::json!({
            "id": "s1",
            "name": "foo",
            "protocol": "http",
            "port": 80,
            "retries": 5,
            "connect_timeout": 60000,
            "write_timeout": 60000,
            "read_timeout": 60000,
            "enabled": true
        }))
        .unwrap();
        let opts = EqualityOptions::default();
        assert!(declared.equal_with(&stored, &opts));

        let mut https = Service::named("foo");
        https.protocol = Some("https".to_string());
        assert_eq!(https.normalized(&opts).port, Some(443));

        let mut custom = declared.clone();
        custom.retries = Some(0);
        assert!(!custom.equal_with(&stored, &opts));
    }

    #[test]
    fn test_route_defaults_match_sparse_declaration() {
        let mut declared = Route::named("bar");
        declared.paths = vec!["/bar".to_string()];
        let stored = Route::from_value(serde_json::json!({
            "id": "r1",
            "name": "bar",
            "paths": ["/bar"],
            "protocols": ["http", "https"],
            "strip_path": true,
            "preserve_host": false,
            "regex_priority": 0,
            "https_redirect_status_code": 426,
            "path_handling": "v0",
            "request_buffering": true,
            "response_buffering": true
        }))
        .unwrap();
        assert!(declared.equal_with(&stored, &EqualityOptions::default()));

        declared.strip_path = Some(false);
        assert!(!declared.equal_with(&stored, &EqualityOptions::default()));
    }
}
