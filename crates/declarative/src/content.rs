//! Declarative input model
//!
//! A [`Content`] is the desired configuration as written by the user: lists
//! of entities per kind, where parents may embed their children (routes
//! inside a service, targets inside an upstream, credentials inside a
//! consumer). References between entities may be given by name and are
//! resolved by the [identity reconciler](crate::identity).

use crate::error::{Error, Result};
use entitystore::types::{
    AclGroup, BasicAuth, CaCertificate, Certificate, Consumer, ConsumerGroup, HmacAuth, JwtSecret,
    KeyAuth, MtlsAuth, Oauth2Credential, Plugin, Route, Service, Sni, Target, Upstream, Vault,
};
use entitystore::{Entity, Store};
use serde::{Deserialize, Serialize};
use std::path::Path;
use walkdir::WalkDir;

/// A service with its routes and plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDef {
    #[serde(flatten)]
    pub service: Service,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

/// A route with its plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteDef {
    #[serde(flatten)]
    pub route: Route,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

/// An upstream with its targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamDef {
    #[serde(flatten)]
    pub upstream: Upstream,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
}

/// A certificate with its SNIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateDef {
    #[serde(flatten)]
    pub certificate: Certificate,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snis: Vec<Sni>,
}

/// A consumer group with its plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerGroupDef {
    #[serde(flatten)]
    pub group: ConsumerGroup,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

/// A consumer with its credentials, plugins and group memberships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerDef {
    #[serde(flatten)]
    pub consumer: Consumer,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keyauth_credentials: Vec<KeyAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub basicauth_credentials: Vec<BasicAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hmacauth_credentials: Vec<HmacAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jwt_secrets: Vec<JwtSecret>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<AclGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oauth2_credentials: Vec<Oauth2Credential>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mtls_auth_credentials: Vec<MtlsAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    /// Names of consumer groups this consumer belongs to
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Desired gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    /// Tags scoping the run; merged into every entity
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vaults: Vec<Vault>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ca_certificates: Vec<CaCertificate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<CertificateDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snis: Vec<Sni>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<UpstreamDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumer_groups: Vec<ConsumerGroupDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<ConsumerDef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keyauth_credentials: Vec<KeyAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub basicauth_credentials: Vec<BasicAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hmacauth_credentials: Vec<HmacAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jwt_secrets: Vec<JwtSecret>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<AclGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oauth2_credentials: Vec<Oauth2Credential>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mtls_auth_credentials: Vec<MtlsAuth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

/// Input file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// Format of `path`, if it has a supported extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

impl Content {
    /// Parse content in the given format.
    pub fn parse(text: &str, format: Format) -> Result<Self> {
        match format {
            Format::Json => Ok(serde_json::from_str(text)?),
            Format::Toml => toml::from_str(text).map_err(|e| Error::Serialization(e.to_string())),
        }
    }

    /// Render content in the given format.
    pub fn render(&self, format: Format) -> Result<String> {
        match format {
            Format::Json => Ok(serde_json::to_string_pretty(self)?),
            Format::Toml => toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string())),
        }
    }

    /// Load one file, or every `.json`/`.toml` file below a directory.
    ///
    /// Directory entries are read in path order and concatenated.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Self::load_file(path);
        }

        let mut content = Self::default();
        let mut files = 0;
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Load {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() || Format::from_path(entry.path()).is_none() {
                continue;
            }
            content.merge(Self::load_file(entry.path())?)?;
            files += 1;
        }
        log::debug!("loaded {files} file(s) from {}", path.display());
        Ok(content)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let load_error = |message: String| Error::Load {
            path: path.to_path_buf(),
            message,
        };
        let format = Format::from_path(path)
            .ok_or_else(|| load_error("expected a .json or .toml file".to_string()))?;
        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        Self::parse(&text, format).map_err(|e| match e {
            Error::Serialization(message) => load_error(message),
            other => other,
        })
    }

    /// Append every list of `other`.
    ///
    /// Both sides may declare `select_tags` only if they declare the same set.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if !other.select_tags.is_empty() {
            if self.select_tags.is_empty() {
                self.select_tags = other.select_tags;
            } else if !same_tags(&self.select_tags, &other.select_tags) {
                return Err(Error::SelectTagConflict {
                    first: self.select_tags.clone(),
                    second: other.select_tags,
                });
            }
        }

        self.vaults.extend(other.vaults);
        self.ca_certificates.extend(other.ca_certificates);
        self.certificates.extend(other.certificates);
        self.snis.extend(other.snis);
        self.services.extend(other.services);
        self.routes.extend(other.routes);
        self.upstreams.extend(other.upstreams);
        self.targets.extend(other.targets);
        self.consumer_groups.extend(other.consumer_groups);
        self.consumers.extend(other.consumers);
        self.keyauth_credentials.extend(other.keyauth_credentials);
        self.basicauth_credentials.extend(other.basicauth_credentials);
        self.hmacauth_credentials.extend(other.hmacauth_credentials);
        self.jwt_secrets.extend(other.jwt_secrets);
        self.acls.extend(other.acls);
        self.oauth2_credentials.extend(other.oauth2_credentials);
        self.mtls_auth_credentials.extend(other.mtls_auth_credentials);
        self.plugins.extend(other.plugins);
        Ok(())
    }

    /// Flat content holding every entity of `store`, references by ID.
    pub fn from_store(store: &Store) -> Self {
        fn all<E: Entity>(store: &Store) -> Vec<E> {
            let mut entities = store.collection::<E>().get_all();
            entities.sort_by_cached_key(|e| e.identity());
            entities
        }

        Self {
            select_tags: Vec::new(),
            vaults: all(store),
            ca_certificates: all(store),
            certificates: all::<Certificate>(store)
                .into_iter()
                .map(|certificate| CertificateDef {
                    certificate,
                    snis: Vec::new(),
                })
                .collect(),
            snis: all(store),
            services: all::<Service>(store)
                .into_iter()
                .map(|service| ServiceDef {
                    service,
                    ..ServiceDef::default()
                })
                .collect(),
            routes: all::<Route>(store)
                .into_iter()
                .map(|route| RouteDef {
                    route,
                    plugins: Vec::new(),
                })
                .collect(),
            upstreams: all::<Upstream>(store)
                .into_iter()
                .map(|upstream| UpstreamDef {
                    upstream,
                    targets: Vec::new(),
                })
                .collect(),
            targets: all(store),
            consumer_groups: all::<ConsumerGroup>(store)
                .into_iter()
                .map(|group| ConsumerGroupDef {
                    group,
                    plugins: Vec::new(),
                })
                .collect(),
            consumers: all::<Consumer>(store)
                .into_iter()
                .map(|consumer| ConsumerDef {
                    consumer,
                    ..ConsumerDef::default()
                })
                .collect(),
            keyauth_credentials: all(store),
            basicauth_credentials: all(store),
            hmacauth_credentials: all(store),
            jwt_secrets: all(store),
            acls: all(store),
            oauth2_credentials: all(store),
            mtls_auth_credentials: all(store),
            plugins: all(store),
        }
    }

    /// Number of entities declared, nested ones included.
    pub fn entity_count(&self) -> usize {
        let services: usize = self
            .services
            .iter()
            .map(|s| 1 + s.plugins.len() + s.routes.iter().map(|r| 1 + r.plugins.len()).sum::<usize>())
            .sum();
        let consumers: usize = self
            .consumers
            .iter()
            .map(|c| {
                1 + c.keyauth_credentials.len()
                    + c.basicauth_credentials.len()
                    + c.hmacauth_credentials.len()
                    + c.jwt_secrets.len()
                    + c.acls.len()
                    + c.oauth2_credentials.len()
                    + c.mtls_auth_credentials.len()
                    + c.plugins.len()
            })
            .sum();

        services
            + consumers
            + self.vaults.len()
            + self.ca_certificates.len()
            + self.certificates.iter().map(|c| 1 + c.snis.len()).sum::<usize>()
            + self.snis.len()
            + self.routes.iter().map(|r| 1 + r.plugins.len()).sum::<usize>()
            + self.upstreams.iter().map(|u| 1 + u.targets.len()).sum::<usize>()
            + self.targets.len()
            + self.consumer_groups.iter().map(|g| 1 + g.plugins.len()).sum::<usize>()
            + self.keyauth_credentials.len()
            + self.basicauth_credentials.len()
            + self.hmacauth_credentials.len()
            + self.jwt_secrets.len()
            + self.acls.len()
            + self.oauth2_credentials.len()
            + self.mtls_auth_credentials.len()
            + self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }
}

fn same_tags(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    a.dedup();
    b.sort();
    b.dedup();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const NESTED_JSON: &str = r#"{
        "select_tags": ["managed"],
        "services": [{
            "name": "foo",
            "host": "foo.internal",
            "port": 8080,
            "routes": [{
                "name": "bar",
                "paths": ["/bar"],
                "plugins": [{"name": "rate-limiting", "config": {"minute": 10}}]
            }]
        }],
        "consumers": [{
            "username": "alice",
            "keyauth_credentials": [{"key": "secret"}],
            "groups": ["gold"]
        }]
    }"#;

    #[test]
    fn test_parse_nested_json() {
        let content = Content::parse(NESTED_JSON, Format::Json).unwrap();
        assert_eq!(content.select_tags, ["managed"]);

        let service = &content.services[0];
        assert_eq!(service.service.name.as_deref(), Some("foo"));
        assert_eq!(service.service.port, Some(8080));
        assert_eq!(service.routes[0].route.paths, ["/bar"]);
        assert_eq!(service.routes[0].plugins[0].name.as_deref(), Some("rate-limiting"));

        let consumer = &content.consumers[0];
        assert_eq!(consumer.keyauth_credentials[0].key.as_deref(), Some("secret"));
        assert_eq!(consumer.groups, ["gold"]);
        assert_eq!(content.entity_count(), 5);
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            [[services]]
            name = "foo"
            host = "foo.internal"
            port = 80

            [[services.routes]]
            name = "bar"
            paths = ["/bar"]

            [[upstreams]]
            name = "pool"

            [[upstreams.targets]]
            target = "10.0.0.1:80"
            weight = 100
        "#;
        let content = Content::parse(text, Format::Toml).unwrap();
        assert_eq!(content.services[0].service.port, Some(80));
        assert_eq!(content.services[0].routes[0].route.name.as_deref(), Some("bar"));
        assert_eq!(content.upstreams[0].targets[0].weight, Some(100));
    }

    #[test]
    fn test_load_directory_merges_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"select_tags": ["t"], "services": [{"name": "a"}]}"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("nested/b.toml"),
            "select_tags = [\"t\"]\n[[services]]\nname = \"b\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let content = Content::load(dir.path()).unwrap();
        let names: Vec<_> = content
            .services
            .iter()
            .filter_map(|s| s.service.name.as_deref())
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(content.select_tags, ["t"]);
    }

    #[test]
    fn test_conflicting_select_tags() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"select_tags": ["x"]}"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"select_tags": ["y"]}"#).unwrap();
        let err = Content::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::SelectTagConflict { .. }));
    }

    #[test]
    fn test_parse_errors_are_typed() {
        let err = Content::parse("{ \"services\": 3 }", Format::Json).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "{err}");

        let err = Content::parse("services = [", Format::Toml).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "{err}");
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Content::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));

        let err = Content::load(&dir.path().join("config.yaml")).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn test_from_store_renders_flat_json() {
        let store = Store::new();
        let mut svc = Service::named("foo");
        svc.base.id = Some("s1".to_string());
        store.collection::<Service>().add(svc).unwrap();

        let content = Content::from_store(&store);
        let json = content.render(Format::Json).unwrap();
        let back = Content::parse(&json, Format::Json).unwrap();
        assert_eq!(back.services[0].service.base.id.as_deref(), Some("s1"));
        assert!(back.routes.is_empty());
    }
}
