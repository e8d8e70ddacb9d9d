//! Snapshot of every entity kind

use crate::collection::Collection;
use crate::entity::Entity;
use crate::kind::Kind;
use crate::types::{
    AclGroup, BasicAuth, CaCertificate, Certificate, Consumer, ConsumerGroup, HmacAuth, JwtSecret,
    KeyAuth, MtlsAuth, Oauth2Credential, Plugin, Route, Service, Sni, Target, Upstream, Vault,
};

/// One consistent snapshot of gateway configuration: a collection per kind.
///
/// A store belongs to a single reconciliation run and is dropped with it.
#[derive(Default)]
pub struct Store {
    pub(crate) vaults: Collection<Vault>,
    pub(crate) ca_certificates: Collection<CaCertificate>,
    pub(crate) certificates: Collection<Certificate>,
    pub(crate) snis: Collection<Sni>,
    pub(crate) services: Collection<Service>,
    pub(crate) routes: Collection<Route>,
    pub(crate) upstreams: Collection<Upstream>,
    pub(crate) targets: Collection<Target>,
    pub(crate) consumer_groups: Collection<ConsumerGroup>,
    pub(crate) consumers: Collection<Consumer>,
    pub(crate) key_auths: Collection<KeyAuth>,
    pub(crate) basic_auths: Collection<BasicAuth>,
    pub(crate) hmac_auths: Collection<HmacAuth>,
    pub(crate) jwt_secrets: Collection<JwtSecret>,
    pub(crate) acl_groups: Collection<AclGroup>,
    pub(crate) oauth2_credentials: Collection<Oauth2Credential>,
    pub(crate) mtls_auths: Collection<MtlsAuth>,
    pub(crate) plugins: Collection<Plugin>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// The collection holding kind `E`.
    pub fn collection<E: Entity>(&self) -> &Collection<E> {
        E::collection(self)
    }

    /// Number of entities of `kind`.
    pub fn kind_len(&self, kind: Kind) -> usize {
        crate::with_entity_type!(kind, E => self.collection::<E>().len())
    }

    /// Number of entities across all kinds.
    pub fn len(&self) -> usize {
        Kind::ALL.iter().map(|&k| self.kind_len(k)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for kind in Kind::ALL {
            map.entry(&kind.as_str(), &self.kind_len(kind));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_counts_per_kind() {
        let store = Store::new();
        assert!(store.is_empty());

        let mut svc = Service::named("foo");
        svc.base.id = Some("s1".to_string());
        store.collection::<Service>().add(svc).unwrap();

        let mut route = Route::named("bar");
        route.base.id = Some("r1".to_string());
        store.collection::<Route>().add(route).unwrap();

        assert_eq!(store.kind_len(Kind::Service), 1);
        assert_eq!(store.kind_len(Kind::Route), 1);
        assert_eq!(store.kind_len(Kind::Plugin), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_collections_are_independent() {
        let store = Store::new();
        let mut svc = Service::named("shared");
        svc.base.id = Some("x".to_string());
        store.collection::<Service>().add(svc).unwrap();

        // The same ID in another kind does not collide.
        let mut route = Route::named("shared");
        route.base.id = Some("x".to_string());
        store.collection::<Route>().add(route).unwrap();
    }
}
