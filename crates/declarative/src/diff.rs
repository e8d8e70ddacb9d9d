//! Diff computation between the current and the target store

use crate::error::{Error, Result};
use entitystore::{Entity, EqualityOptions, Kind, Store, with_entity_type};
use gateway::{Op, reference_id};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

static NULL: Value = Value::Null;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    /// The gateway operation performing this change.
    pub fn api_op(&self) -> Op {
        match self {
            Self::Create => Op::Create,
            Self::Update => Op::Update,
            Self::Delete => Op::Delete,
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.api_op().fmt(f)
    }
}

/// A resolved foreign reference of a changed entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Reference field on the changed entity
    pub field: &'static str,
    /// Kind of the referenced entity
    pub kind: Kind,
    /// ID of the referenced entity
    pub id: String,
}

fn links_of<E: Entity>(entity: &E) -> Vec<Link> {
    E::REFS
        .iter()
        .filter_map(|f| {
            f.id(entity).map(|id| Link {
                field: f.field,
                kind: f.target,
                id: id.to_string(),
            })
        })
        .collect()
}

fn to_value<E: Entity>(entity: &E) -> Result<Value> {
    entity
        .to_value()
        .map_err(|e| Error::entity(E::KIND, entity.identity(), e))
}

/// One change to apply to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub kind: Kind,
    /// ID of the entity on the gateway (planned ID for creates)
    pub id: String,
    /// Human-readable natural identity
    pub identity: String,
    /// New value, for creates and updates
    pub payload: Option<Value>,
    /// Last known value, for updates and deletes
    pub previous: Option<Value>,
    /// References of the new value, or of the deleted value
    pub links: Vec<Link>,
}

impl ChangeEvent {
    pub fn create<E: Entity>(entity: &E) -> Result<Self> {
        Ok(Self {
            op: ChangeOp::Create,
            kind: E::KIND,
            id: entity.id().unwrap_or_default().to_string(),
            identity: entity.identity(),
            payload: Some(to_value(entity)?),
            previous: None,
            links: links_of(entity),
        })
    }

    pub fn update<E: Entity>(entity: &E, existing: &E) -> Result<Self> {
        Ok(Self {
            op: ChangeOp::Update,
            kind: E::KIND,
            id: entity.id().unwrap_or_default().to_string(),
            identity: entity.identity(),
            payload: Some(to_value(entity)?),
            previous: Some(to_value(existing)?),
            links: links_of(entity),
        })
    }

    pub fn delete<E: Entity>(existing: &E) -> Result<Self> {
        Ok(Self {
            op: ChangeOp::Delete,
            kind: E::KIND,
            id: existing.id().unwrap_or_default().to_string(),
            identity: existing.identity(),
            payload: None,
            previous: Some(to_value(existing)?),
            links: links_of(existing),
        })
    }

    /// The node key: kind and ID.
    pub fn key(&self) -> (Kind, &str) {
        (self.kind, &self.id)
    }

    /// References of the last known value.
    pub fn previous_links(&self) -> Vec<Link> {
        let Some(previous) = &self.previous else {
            return Vec::new();
        };
        self.kind
            .reference_fields()
            .into_iter()
            .filter_map(|(field, kind)| {
                reference_id(previous, field).map(|id| Link {
                    field,
                    kind,
                    id: id.to_string(),
                })
            })
            .collect()
    }

    /// The value to send: the payload, or the last known value for deletes.
    pub fn value(&self) -> &Value {
        self.payload
            .as_ref()
            .or(self.previous.as_ref())
            .unwrap_or(&NULL)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.op, self.kind, self.identity)
    }
}

/// Counts of changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    fn add(&mut self, op: ChangeOp) {
        match op {
            ChangeOp::Create => self.creates += 1,
            ChangeOp::Update => self.updates += 1,
            ChangeOp::Delete => self.deletes += 1,
        }
    }
}

/// Diff summary statistics per kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub by_kind: BTreeMap<Kind, Counts>,
}

impl DiffSummary {
    /// Counts over all kinds
    pub fn totals(&self) -> Counts {
        self.by_kind.values().fold(Counts::default(), |mut acc, c| {
            acc.creates += c.creates;
            acc.updates += c.updates;
            acc.deletes += c.deletes;
            acc
        })
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.totals().total()
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Ordered changes: deletes children first, then creates and updates
/// parents first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub deletes: Vec<ChangeEvent>,
    pub creates_updates: Vec<ChangeEvent>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.deletes.len() + self.creates_updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every change, deletes first.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.deletes.iter().chain(&self.creates_updates)
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for event in self.iter() {
            summary.by_kind.entry(event.kind).or_default().add(event.op);
        }
        summary
    }
}

/// Compares a target store against a current store.
pub struct Differ<'a> {
    current: &'a Store,
    target: &'a Store,
    opts: EqualityOptions,
}

impl<'a> Differ<'a> {
    /// Differ ignoring IDs and timestamps. References are compared: target
    /// references hold resolved gateway IDs, so a changed one is a move.
    pub fn new(current: &'a Store, target: &'a Store) -> Self {
        Self {
            current,
            target,
            opts: EqualityOptions {
                ignore_foreign: false,
                ..EqualityOptions::default()
            },
        }
    }

    /// Use `opts` for the structural equality check.
    pub fn with_options(mut self, opts: EqualityOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Compute the ordered change set. Kinds are diffed in parallel.
    pub fn diff(&self) -> Result<ChangeSet> {
        let per_kind: Vec<(Vec<ChangeEvent>, Vec<ChangeEvent>)> = Kind::ALL
            .par_iter()
            .map(|&kind| with_entity_type!(kind, E => self.diff_kind::<E>()))
            .collect::<Result<_>>()?;

        let mut changes = ChangeSet::default();
        for (deletes, upserts) in per_kind {
            changes.deletes.extend(deletes);
            changes.creates_updates.extend(upserts);
        }
        changes
            .deletes
            .sort_by(|a, b| {
                (Reverse(a.kind), &a.identity, &a.id).cmp(&(Reverse(b.kind), &b.identity, &b.id))
            });
        changes
            .creates_updates
            .sort_by(|a, b| (a.kind, &a.identity, &a.id).cmp(&(b.kind, &b.identity, &b.id)));

        let totals = changes.summary().totals();
        log::info!(
            "diff: {} to create, {} to update, {} to delete",
            totals.creates,
            totals.updates,
            totals.deletes
        );
        Ok(changes)
    }

    fn diff_kind<E: Entity>(&self) -> Result<(Vec<ChangeEvent>, Vec<ChangeEvent>)> {
        let current = self.current.collection::<E>();
        let target = self.target.collection::<E>();
        let lookup_error = |entity: &E, e: entitystore::Error| Error::entity(E::KIND, entity.identity(), e);

        let mut deletes = Vec::new();
        for existing in current.get_all() {
            let wanted = target
                .find_match(&existing)
                .map_err(|e| lookup_error(&existing, e))?;
            if wanted.is_none() {
                log::debug!("{} `{}` is not wanted", E::KIND, existing.identity());
                deletes.push(ChangeEvent::delete(&existing)?);
            }
        }

        let mut upserts = Vec::new();
        for desired in target.get_all() {
            let found = current
                .find_match(&desired)
                .map_err(|e| lookup_error(&desired, e))?;
            match found {
                None => upserts.push(ChangeEvent::create(&desired)?),
                Some(record) => {
                    let existing = record.entity();
                    if desired.equal_with(existing, &self.opts) {
                        continue;
                    }
                    let mut value = desired.clone();
                    if let Some(id) = existing.id() {
                        value.set_id(id.to_string());
                    }
                    upserts.push(ChangeEvent::update(&value, existing)?);
                }
            }
        }

        Ok((deletes, upserts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitystore::Reference;
    use entitystore::types::{KeyAuth, Route, Service};

    fn service(id: &str, name: &str, host: &str) -> Service {
        let mut svc = Service::named(name);
        svc.base.id = Some(id.to_string());
        svc.host = Some(host.to_string());
        svc
    }

    fn route(id: &str, name: &str, service: &str) -> Route {
        let mut route = Route::named(name);
        route.base.id = Some(id.to_string());
        route.service = Some(Reference::to_id(service));
        route.paths = vec![format!("/{name}")];
        route
    }

    #[test]
    fn test_identical_stores_have_no_changes() {
        let current = Store::new();
        let target = Store::new();
        for store in [&current, &target] {
            store.collection::<Service>().add(service("s1", "foo", "a")).unwrap();
            store.collection::<Route>().add(route("r1", "bar", "s1")).unwrap();
        }
        let changes = Differ::new(&current, &target).diff().unwrap();
        assert!(changes.is_empty());
        assert!(!changes.summary().has_changes());
    }

    #[test]
    fn test_create_for_unmatched_target() {
        let current = Store::new();
        let target = Store::new();
        target.collection::<Service>().add(service("s1", "foo", "a")).unwrap();

        let changes = Differ::new(&current, &target).diff().unwrap();
        assert_eq!(changes.creates_updates.len(), 1);
        let event = &changes.creates_updates[0];
        assert_eq!(event.op, ChangeOp::Create);
        assert_eq!(event.id, "s1");
        assert_eq!(event.value()["name"], "foo");
    }

    #[test]
    fn test_update_carries_matched_id() {
        let current = Store::new();
        let target = Store::new();
        current.collection::<Service>().add(service("X", "foo", "old")).unwrap();
        target.collection::<Service>().add(service("Y", "foo", "new")).unwrap();

        let changes = Differ::new(&current, &target).diff().unwrap();
        assert!(changes.deletes.is_empty());
        assert_eq!(changes.creates_updates.len(), 1);
        let event = &changes.creates_updates[0];
        assert_eq!(event.op, ChangeOp::Update);
        assert_eq!(event.id, "X");
        assert_eq!(event.payload.as_ref().unwrap()["host"], "new");
        assert_eq!(event.previous.as_ref().unwrap()["host"], "old");
    }

    #[test]
    fn test_timestamps_do_not_cause_updates() {
        let current = Store::new();
        let target = Store::new();
        let mut live = service("s1", "foo", "a");
        live.base.created_at = Some(1_700_000_000);
        live.base.updated_at = Some(1_700_000_100);
        current.collection::<Service>().add(live).unwrap();
        target.collection::<Service>().add(service("s1", "foo", "a")).unwrap();

        assert!(Differ::new(&current, &target).diff().unwrap().is_empty());
    }

    #[test]
    fn test_reordered_list_is_a_change() {
        let current = Store::new();
        let target = Store::new();
        let mut a = route("r1", "bar", "s1");
        a.hosts = vec!["a.example".to_string(), "b.example".to_string()];
        let mut b = a.clone();
        b.hosts.reverse();
        current.collection::<Route>().add(a).unwrap();
        target.collection::<Route>().add(b).unwrap();

        let changes = Differ::new(&current, &target).diff().unwrap();
        assert_eq!(changes.summary().totals().updates, 1);
    }

    #[test]
    fn test_deletes_children_first_and_creates_parents_first() {
        let current = Store::new();
        current.collection::<Service>().add(service("s1", "old", "a")).unwrap();
        current.collection::<Route>().add(route("r1", "old-route", "s1")).unwrap();

        let target = Store::new();
        target.collection::<Service>().add(service("s2", "new", "b")).unwrap();
        target.collection::<Route>().add(route("r2", "new-route", "s2")).unwrap();

        let changes = Differ::new(&current, &target).diff().unwrap();
        let deletes: Vec<_> = changes.deletes.iter().map(|e| e.kind).collect();
        assert_eq!(deletes, [Kind::Route, Kind::Service]);
        let creates: Vec<_> = changes.creates_updates.iter().map(|e| e.kind).collect();
        assert_eq!(creates, [Kind::Service, Kind::Route]);

        assert_eq!(
            changes.creates_updates[1].links,
            vec![Link {
                field: "service",
                kind: Kind::Service,
                id: "s2".to_string()
            }]
        );
        let summary = changes.summary();
        assert_eq!(summary.by_kind[&Kind::Route].deletes, 1);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_reference_moves_are_updates() {
        let current = Store::new();
        let target = Store::new();
        for store in [&current, &target] {
            store.collection::<Service>().add(service("s1", "a", "a")).unwrap();
            store.collection::<Service>().add(service("s2", "b", "b")).unwrap();
        }
        current.collection::<Route>().add(route("r1", "bar", "s1")).unwrap();
        target.collection::<Route>().add(route("r1", "bar", "s2")).unwrap();

        let changes = Differ::new(&current, &target).diff().unwrap();
        assert_eq!(changes.len(), 1);
        let event = &changes.creates_updates[0];
        assert_eq!(event.op, ChangeOp::Update);
        assert_eq!(event.links[0].id, "s2");
        assert_eq!(event.previous_links()[0].id, "s1");

        let loose = EqualityOptions::default();
        assert!(
            Differ::new(&current, &target)
                .with_options(loose)
                .diff()
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_credentials_matched_by_key() {
        let current = Store::new();
        let target = Store::new();
        let cred = |id: &str| KeyAuth {
            base: entitystore::Base::with_id(id),
            key: Some("secret".to_string()),
            consumer: Some(Reference::to_id("c1")),
            ..KeyAuth::default()
        };
        current.collection::<KeyAuth>().add(cred("k-live")).unwrap();
        target.collection::<KeyAuth>().add(cred("k-planned")).unwrap();
        assert!(Differ::new(&current, &target).diff().unwrap().is_empty());
    }
}
