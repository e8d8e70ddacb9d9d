//! Identity reconciliation
//!
//! Turns declarative [`Content`] into a target [`Store`] whose entities carry
//! stable IDs:
//!
//! 1. an ID given in the input is kept
//! 2. otherwise the entity is matched against the current store by its
//!    natural keys and takes over the matched entity's ID
//! 3. otherwise a deterministic ID is generated (UUID v5 of kind and natural
//!    key, or of kind and a per-run counter for entities without one)
//!
//! Kinds are processed in dependency order, so a child always sees its
//! parent's final ID before its own natural keys are computed. The target
//! store itself acts as the "seen this run" set: a second definition of the
//! same entity fails with `AlreadyExists`.

use crate::content::{Content, RouteDef};
use crate::error::Error;
use entitystore::types::{
    AclGroup, BasicAuth, CaCertificate, Certificate, Consumer, ConsumerGroup, HmacAuth, JwtSecret,
    KeyAuth, MtlsAuth, Oauth2Credential, Plugin, Route, Service, Sni, Target, Upstream, Vault,
};
use entitystore::{Entity, Kind, Record, Reference, Store, with_entity_type};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Namespace of generated entity IDs.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6761_7465_7379_6e63_8000_4000_a000_0001);

/// Metadata key recording where an entity's ID came from.
pub const ID_SOURCE: &str = "id_source";

/// Metadata key listing a consumer's group memberships.
pub const GROUPS: &str = "groups";

/// Link from a nested child to its parent's slot in the parent kind's queue.
#[derive(Debug, Clone, Copy)]
struct Owner {
    kind: Kind,
    field: &'static str,
    slot: usize,
}

#[derive(Debug)]
struct Pending<E> {
    entity: E,
    owner: Option<Owner>,
    groups: Vec<String>,
}

impl<E> Pending<E> {
    fn top(entity: E) -> Self {
        Self {
            entity,
            owner: None,
            groups: Vec::new(),
        }
    }

    fn owned(entity: E, kind: Kind, field: &'static str, slot: usize) -> Self {
        Self {
            entity,
            owner: Some(Owner { kind, field, slot }),
            groups: Vec::new(),
        }
    }
}

/// Every input entity, flattened into one queue per kind.
#[derive(Default)]
struct Queues {
    vaults: Vec<Pending<Vault>>,
    ca_certificates: Vec<Pending<CaCertificate>>,
    certificates: Vec<Pending<Certificate>>,
    snis: Vec<Pending<Sni>>,
    services: Vec<Pending<Service>>,
    routes: Vec<Pending<Route>>,
    upstreams: Vec<Pending<Upstream>>,
    targets: Vec<Pending<Target>>,
    consumer_groups: Vec<Pending<ConsumerGroup>>,
    consumers: Vec<Pending<Consumer>>,
    key_auths: Vec<Pending<KeyAuth>>,
    basic_auths: Vec<Pending<BasicAuth>>,
    hmac_auths: Vec<Pending<HmacAuth>>,
    jwt_secrets: Vec<Pending<JwtSecret>>,
    acl_groups: Vec<Pending<AclGroup>>,
    oauth2_credentials: Vec<Pending<Oauth2Credential>>,
    mtls_auths: Vec<Pending<MtlsAuth>>,
    plugins: Vec<Pending<Plugin>>,
}

fn top<E: Clone>(entities: &[E]) -> impl Iterator<Item = Pending<E>> + '_ {
    entities.iter().cloned().map(Pending::top)
}

fn owned<'a, E: Clone>(
    entities: &'a [E],
    kind: Kind,
    field: &'static str,
    slot: usize,
) -> impl Iterator<Item = Pending<E>> + 'a {
    entities
        .iter()
        .cloned()
        .map(move |e| Pending::owned(e, kind, field, slot))
}

impl Queues {
    fn new(content: &Content) -> Self {
        let mut q = Self::default();

        q.vaults.extend(top(&content.vaults));
        q.ca_certificates.extend(top(&content.ca_certificates));

        for def in &content.certificates {
            let slot = q.certificates.len();
            q.certificates.push(Pending::top(def.certificate.clone()));
            q.snis
                .extend(owned(&def.snis, Kind::Certificate, "certificate", slot));
        }
        q.snis.extend(top(&content.snis));

        for def in &content.services {
            let slot = q.services.len();
            q.services.push(Pending::top(def.service.clone()));
            for route in &def.routes {
                q.push_route(route, Some(Owner {
                    kind: Kind::Service,
                    field: "service",
                    slot,
                }));
            }
            q.plugins
                .extend(owned(&def.plugins, Kind::Service, "service", slot));
        }
        for route in &content.routes {
            q.push_route(route, None);
        }

        for def in &content.upstreams {
            let slot = q.upstreams.len();
            q.upstreams.push(Pending::top(def.upstream.clone()));
            q.targets
                .extend(owned(&def.targets, Kind::Upstream, "upstream", slot));
        }
        q.targets.extend(top(&content.targets));

        for def in &content.consumer_groups {
            let slot = q.consumer_groups.len();
            q.consumer_groups.push(Pending::top(def.group.clone()));
            q.plugins.extend(owned(
                &def.plugins,
                Kind::ConsumerGroup,
                "consumer_group",
                slot,
            ));
        }

        for def in &content.consumers {
            let slot = q.consumers.len();
            q.consumers.push(Pending {
                entity: def.consumer.clone(),
                owner: None,
                groups: def.groups.clone(),
            });
            let (kind, field) = (Kind::Consumer, "consumer");
            q.key_auths
                .extend(owned(&def.keyauth_credentials, kind, field, slot));
            q.basic_auths
                .extend(owned(&def.basicauth_credentials, kind, field, slot));
            q.hmac_auths
                .extend(owned(&def.hmacauth_credentials, kind, field, slot));
            q.jwt_secrets
                .extend(owned(&def.jwt_secrets, kind, field, slot));
            q.acl_groups.extend(owned(&def.acls, kind, field, slot));
            q.oauth2_credentials
                .extend(owned(&def.oauth2_credentials, kind, field, slot));
            q.mtls_auths
                .extend(owned(&def.mtls_auth_credentials, kind, field, slot));
            q.plugins.extend(owned(&def.plugins, kind, field, slot));
        }

        q.key_auths.extend(top(&content.keyauth_credentials));
        q.basic_auths.extend(top(&content.basicauth_credentials));
        q.hmac_auths.extend(top(&content.hmacauth_credentials));
        q.jwt_secrets.extend(top(&content.jwt_secrets));
        q.acl_groups.extend(top(&content.acls));
        q.oauth2_credentials.extend(top(&content.oauth2_credentials));
        q.mtls_auths.extend(top(&content.mtls_auth_credentials));
        q.plugins.extend(top(&content.plugins));
        q
    }

    fn push_route(&mut self, def: &RouteDef, owner: Option<Owner>) {
        let slot = self.routes.len();
        self.routes.push(Pending {
            entity: def.route.clone(),
            owner,
            groups: Vec::new(),
        });
        self.plugins
            .extend(owned(&def.plugins, Kind::Route, "route", slot));
    }
}

/// Assigns stable IDs to declarative input.
///
/// A reconciler is consumed by one run, so its ID counters never leak into
/// another run.
pub struct IdentityReconciler<'a> {
    current: &'a Store,
    select_tags: Vec<String>,
}

impl<'a> IdentityReconciler<'a> {
    /// Reconcile against the `current` snapshot of the gateway.
    pub fn new(current: &'a Store) -> Self {
        Self {
            current,
            select_tags: Vec::new(),
        }
    }

    /// Merge `tags` into every entity, in addition to the input's own
    /// `select_tags`.
    pub fn with_select_tags(mut self, tags: &[String]) -> Self {
        merge_unique(&mut self.select_tags, tags);
        self
    }

    /// Build the target store, or return every per-entity error.
    pub fn reconcile(self, content: &Content) -> Result<Store, Vec<Error>> {
        let mut select_tags = self.select_tags;
        merge_unique(&mut select_tags, &content.select_tags);

        let queues = Queues::new(content);
        let mut run = Run {
            current: self.current,
            target: Store::new(),
            select_tags,
            counters: BTreeMap::new(),
            slots: BTreeMap::new(),
            errors: Vec::new(),
        };

        run.process(&queues.vaults);
        run.process(&queues.ca_certificates);
        run.process(&queues.certificates);
        run.process(&queues.snis);
        run.process(&queues.services);
        run.process(&queues.routes);
        run.process(&queues.upstreams);
        run.process(&queues.targets);
        run.process(&queues.consumer_groups);
        run.process(&queues.consumers);
        run.process(&queues.key_auths);
        run.process(&queues.basic_auths);
        run.process(&queues.hmac_auths);
        run.process(&queues.jwt_secrets);
        run.process(&queues.acl_groups);
        run.process(&queues.oauth2_credentials);
        run.process(&queues.mtls_auths);
        run.process(&queues.plugins);

        if run.errors.is_empty() {
            log::info!("reconciled {} entities", run.target.len());
            Ok(run.target)
        } else {
            Err(run.errors)
        }
    }
}

fn merge_unique(into: &mut Vec<String>, tags: &[String]) {
    for tag in tags {
        if !into.contains(tag) {
            into.push(tag.clone());
        }
    }
}

/// Why an entity was not added to the target store.
enum Rejected {
    /// Its parent was rejected; already reported there
    Parent,
    Error(Error),
}

/// State of one reconciliation run.
struct Run<'a> {
    current: &'a Store,
    target: Store,
    select_tags: Vec<String>,
    counters: BTreeMap<Kind, u64>,
    /// Resolved ID per queue slot, `None` for rejected entities
    slots: BTreeMap<Kind, Vec<Option<String>>>,
    errors: Vec<Error>,
}

impl Run<'_> {
    fn process<E: Entity>(&mut self, queue: &[Pending<E>]) {
        for pending in queue {
            let id = match self.reconcile_one(pending) {
                Ok(id) => Some(id),
                Err(Rejected::Parent) => {
                    log::warn!(
                        "skipping {} `{}`: its parent was rejected",
                        E::KIND,
                        pending.entity.identity()
                    );
                    None
                }
                Err(Rejected::Error(e)) => {
                    self.errors.push(e);
                    None
                }
            };
            self.slots.entry(E::KIND).or_default().push(id);
        }
    }

    fn reconcile_one<E: Entity>(&mut self, pending: &Pending<E>) -> Result<String, Rejected> {
        let mut entity = pending.entity.clone();
        let reject = |entity: &E, source| Rejected::Error(Error::entity(E::KIND, entity.identity(), source));

        if let Some(owner) = pending.owner {
            let parent = self
                .slots
                .get(&owner.kind)
                .and_then(|ids| ids.get(owner.slot))
                .cloned()
                .flatten()
                .ok_or(Rejected::Parent)?;
            if let Some(field) = E::REFS.iter().find(|f| f.field == owner.field) {
                *(field.get_mut)(&mut entity) = Some(Reference::to_id(parent));
            }
        }

        for field in E::REFS {
            let key = (field.get)(&entity).and_then(|r| {
                r.resolved_id()
                    .or(r.name.as_deref())
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
            });
            let resolved = match key {
                None => None,
                Some(key) => Some(self.resolve(field.target, &key).ok_or_else(|| {
                    reject(
                        &entity,
                        entitystore::Error::InvalidReference {
                            kind: E::KIND,
                            target: field.target,
                            reference: key.clone(),
                        },
                    )
                })?),
            };
            *(field.get_mut)(&mut entity) = resolved.map(Reference::to_id);
        }

        entity.merge_tags(&self.select_tags);

        for group in &pending.groups {
            if self.resolve(Kind::ConsumerGroup, group).is_none() {
                return Err(reject(
                    &entity,
                    entitystore::Error::InvalidReference {
                        kind: E::KIND,
                        target: Kind::ConsumerGroup,
                        reference: group.clone(),
                    },
                ));
            }
        }

        let source = if entity.id().is_some() {
            "explicit"
        } else {
            match self.current.collection::<E>().find_match(&entity) {
                Ok(Some(existing)) => {
                    if let Some(id) = existing.entity().id() {
                        entity.set_id(id.to_string());
                    }
                    "matched"
                }
                Ok(None) => {
                    let id = self.generate(&entity);
                    entity.set_id(id);
                    "generated"
                }
                Err(e) => return Err(reject(&entity, e)),
            }
        };

        let id = entity.id().unwrap_or_default().to_string();
        log::debug!("{} `{}` -> {id} ({source})", E::KIND, entity.identity());

        let mut record = Record::new(entity.clone()).with_metadata(ID_SOURCE, source);
        if !pending.groups.is_empty() {
            record = record.with_metadata(GROUPS, pending.groups.join(","));
        }
        self.target
            .collection::<E>()
            .add_record(record)
            .map_err(|e| reject(&entity, e))?;
        Ok(id)
    }

    /// ID of the `kind` entity named `key` in the target, else the current store.
    fn resolve(&self, kind: Kind, key: &str) -> Option<String> {
        with_entity_type!(kind, T => {
            self.target
                .collection::<T>()
                .get(key)
                .or_else(|_| self.current.collection::<T>().get(key))
                .ok()
                .and_then(|e| e.id().map(str::to_string))
        })
    }

    /// Deterministic ID from the entity's first unique key, else a counter.
    fn generate<E: Entity>(&mut self, entity: &E) -> String {
        let keyed = E::INDEXES
            .iter()
            .filter(|index| index.unique)
            .find_map(|index| index.key(entity).map(|key| (index.name, key)));
        let seed = match keyed {
            Some((index, key)) => format!("{}/{index}/{key}", E::KIND),
            None => {
                let counter = self.counters.entry(E::KIND).or_insert(0);
                *counter += 1;
                format!("{}/#{counter}", E::KIND)
            }
        };
        Uuid::new_v5(&ID_NAMESPACE, seed.as_bytes()).to_string()
    }
}
