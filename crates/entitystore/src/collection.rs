//! Generic indexed collection
//!
//! One `Collection<E>` holds every entity of a kind together with the
//! secondary indices declared by `E::INDEXES` and the foreign-key indices
//! derived from `E::REFS`.
//!
//! Writes run inside a [`Txn`] holding the write lock: every change is
//! recorded in an undo log and only kept when the transaction commits. An
//! uncommitted transaction rolls back when dropped, so a failed operation
//! leaves the collection exactly as it was. Readers take the read lock and
//! therefore only ever observe committed state.

use crate::entity::{Entity, Record};
use crate::error::{Error, Result};
use crate::kind::Kind;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key value -> IDs of the entities carrying it.
type KeyMap = BTreeMap<String, BTreeSet<String>>;

struct Table<E> {
    rows: BTreeMap<String, Record<E>>,
    indexes: Vec<KeyMap>,
    foreign: Vec<KeyMap>,
}

impl<E: Entity> Table<E> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            indexes: E::INDEXES.iter().map(|_| KeyMap::new()).collect(),
            foreign: E::REFS.iter().map(|_| KeyMap::new()).collect(),
        }
    }

    /// Validate `entity` against every constraint without touching the table.
    fn check(&self, entity: &E) -> Result<String> {
        let id = entity.id().ok_or(Error::MissingRequiredField {
            kind: E::KIND,
            field: "id",
        })?;

        for field in E::REFS.iter().filter(|f| f.required) {
            if field.id(entity).is_none() {
                return Err(Error::MissingRequiredField {
                    kind: E::KIND,
                    field: field.field,
                });
            }
        }

        entity.validate()?;

        if self.rows.contains_key(id) {
            return Err(Error::AlreadyExists {
                kind: E::KIND,
                index: "id",
                key: id.to_string(),
            });
        }

        for (pos, index) in E::INDEXES.iter().enumerate() {
            match index.key(entity) {
                None if !index.allow_missing => {
                    return Err(Error::MissingRequiredField {
                        kind: E::KIND,
                        field: index.name,
                    });
                }
                None => {}
                Some(key) => {
                    let taken = self.indexes[pos]
                        .get(&key)
                        .is_some_and(|ids| !ids.is_empty());
                    if index.unique && taken {
                        return Err(Error::AlreadyExists {
                            kind: E::KIND,
                            index: index.name,
                            key: entity.identity(),
                        });
                    }
                }
            }
        }

        Ok(id.to_string())
    }

    fn insert(&mut self, record: Record<E>) -> Result<String> {
        let id = self.check(record.entity())?;

        for (pos, index) in E::INDEXES.iter().enumerate() {
            if let Some(key) = index.key(record.entity()) {
                self.indexes[pos].entry(key).or_default().insert(id.clone());
            }
        }
        for (pos, field) in E::REFS.iter().enumerate() {
            if let Some(owner) = field.id(record.entity()) {
                self.foreign[pos]
                    .entry(owner.to_string())
                    .or_default()
                    .insert(id.clone());
            }
        }

        self.rows.insert(id.clone(), record);
        Ok(id)
    }

    fn remove(&mut self, id: &str) -> Option<Record<E>> {
        let record = self.rows.remove(id)?;

        for (pos, index) in E::INDEXES.iter().enumerate() {
            if let Some(key) = index.key(record.entity()) {
                unlink(&mut self.indexes[pos], &key, id);
            }
        }
        for (pos, field) in E::REFS.iter().enumerate() {
            if let Some(owner) = field.id(record.entity()) {
                unlink(&mut self.foreign[pos], owner, id);
            }
        }

        Some(record)
    }

    /// Resolve an ID or unique natural key to an ID.
    fn resolve(&self, key: &str) -> Result<String> {
        for (pos, index) in E::INDEXES.iter().enumerate() {
            if !index.unique {
                continue;
            }
            if let Some(ids) = self.indexes[pos].get(key)
                && ids.len() == 1
                && let Some(id) = ids.first()
            {
                return Ok(id.clone());
            }
        }

        if self.rows.contains_key(key) {
            return Ok(key.to_string());
        }

        Err(Error::NotFound {
            kind: E::KIND,
            key: key.to_string(),
        })
    }
}

fn unlink(map: &mut KeyMap, key: &str, id: &str) {
    if let Some(ids) = map.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}

enum Undo<E> {
    Inserted(String),
    Removed(Record<E>),
}

/// Single-writer transaction over one collection.
struct Txn<'a, E: Entity> {
    table: RwLockWriteGuard<'a, Table<E>>,
    undo: Vec<Undo<E>>,
    committed: bool,
}

impl<E: Entity> Txn<'_, E> {
    fn insert(&mut self, record: Record<E>) -> Result<()> {
        let id = self.table.insert(record)?;
        self.undo.push(Undo::Inserted(id));
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Option<Record<E>> {
        let record = self.table.remove(id)?;
        self.undo.push(Undo::Removed(record.clone()));
        Some(record)
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl<E: Entity> Drop for Txn<'_, E> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Inserted(id) => {
                    self.table.remove(&id);
                }
                Undo::Removed(record) => {
                    if let Err(e) = self.table.insert(record) {
                        log::error!("{} rollback could not restore a record: {e}", E::KIND);
                    }
                }
            }
        }
    }
}

/// All entities of one kind, indexed.
pub struct Collection<E: Entity> {
    table: RwLock<Table<E>>,
}

impl<E: Entity> Collection<E> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Table<E>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Txn<'_, E> {
        Txn {
            table: self.table.write().unwrap_or_else(PoisonError::into_inner),
            undo: Vec::new(),
            committed: false,
        }
    }

    /// Insert a new entity.
    pub fn add(&self, entity: E) -> Result<()> {
        self.add_record(Record::new(entity))
    }

    /// Insert a new entity together with its metadata.
    pub fn add_record(&self, record: Record<E>) -> Result<()> {
        let mut txn = self.begin();
        txn.insert(record)?;
        txn.commit();
        log::trace!("{} added", E::KIND);
        Ok(())
    }

    /// Look up by unique natural key, then by ID.
    pub fn get(&self, key: &str) -> Result<E> {
        self.get_record(key).map(Record::into_entity)
    }

    /// Like [`Collection::get`], keeping the metadata.
    pub fn get_record(&self, key: &str) -> Result<Record<E>> {
        let table = self.read();
        let id = table.resolve(key)?;
        table.rows.get(&id).cloned().ok_or(Error::NotFound {
            kind: E::KIND,
            key: key.to_string(),
        })
    }

    /// Whether `key` resolves to a stored entity.
    pub fn contains(&self, key: &str) -> bool {
        self.read().resolve(key).is_ok()
    }

    /// Replace the stored entity with the same ID, keeping its metadata.
    pub fn update(&self, entity: E) -> Result<()> {
        let Some(id) = entity.id().map(str::to_string) else {
            return Err(Error::NotFound {
                kind: E::KIND,
                key: entity.identity(),
            });
        };

        let mut txn = self.begin();
        let old = txn.remove(&id).ok_or_else(|| Error::NotFound {
            kind: E::KIND,
            key: id.clone(),
        })?;
        txn.insert(old.replaced(entity))?;
        txn.commit();
        log::trace!("{} {id} updated", E::KIND);
        Ok(())
    }

    /// Remove the entity matching an ID or unique natural key.
    pub fn delete(&self, key: &str) -> Result<E> {
        let mut txn = self.begin();
        let id = txn.table.resolve(key)?;
        let record = txn.remove(&id).ok_or_else(|| Error::NotFound {
            kind: E::KIND,
            key: key.to_string(),
        })?;
        txn.commit();
        log::trace!("{} {id} deleted", E::KIND);
        Ok(record.into_entity())
    }

    /// Copies of every entity, ordered by ID.
    pub fn get_all(&self) -> Vec<E> {
        self.read()
            .rows
            .values()
            .map(|r| r.entity().clone())
            .collect()
    }

    /// Copies of every record, ordered by ID.
    pub fn records(&self) -> Vec<Record<E>> {
        self.read().rows.values().cloned().collect()
    }

    /// Copies of every entity referencing the `owner` entity of kind `owner_kind`.
    pub fn get_all_by_foreign_key(&self, owner_kind: Kind, owner: &str) -> Vec<E> {
        let table = self.read();
        let mut ids = BTreeSet::new();
        for (pos, field) in E::REFS.iter().enumerate() {
            if field.target != owner_kind {
                continue;
            }
            if let Some(found) = table.foreign[pos].get(owner) {
                ids.extend(found.iter().cloned());
            }
        }
        ids.iter()
            .filter_map(|id| table.rows.get(id))
            .map(|r| r.entity().clone())
            .collect()
    }

    /// Copies of every entity whose key under the named index equals `key`.
    pub fn get_all_by_index(&self, index: &str, key: &str) -> Vec<E> {
        let table = self.read();
        let Some(pos) = E::INDEXES.iter().position(|i| i.name == index) else {
            return Vec::new();
        };
        table.indexes[pos]
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| table.rows.get(id))
            .map(|r| r.entity().clone())
            .collect()
    }

    /// The stored counterpart of `entity`, matched by its own unique keys and ID.
    ///
    /// Returns `Ambiguous` when different keys point at different entities.
    pub fn find_match(&self, entity: &E) -> Result<Option<Record<E>>> {
        let table = self.read();
        let mut ids = BTreeSet::new();

        for (pos, index) in E::INDEXES.iter().enumerate() {
            if !index.unique {
                continue;
            }
            if let Some(key) = index.key(entity)
                && let Some(found) = table.indexes[pos].get(&key)
            {
                ids.extend(found.iter().cloned());
            }
        }
        if let Some(id) = entity.id()
            && table.rows.contains_key(id)
        {
            ids.insert(id.to_string());
        }

        match ids.len() {
            0 => Ok(None),
            1 => Ok(ids.first().and_then(|id| table.rows.get(id)).cloned()),
            _ => Err(Error::Ambiguous {
                kind: E::KIND,
                key: entity.identity(),
                ids: ids.into_iter().collect(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }
}

impl<E: Entity> Default for Collection<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Base, Reference};
    use crate::types::{Consumer, KeyAuth, Plugin, Route, Service, Sni, Target};

    fn service(id: &str, name: &str) -> Service {
        let mut svc = Service::named(name);
        svc.base.id = Some(id.to_string());
        svc
    }

    #[test]
    fn test_add_and_get_by_id_and_name() {
        let services = Collection::<Service>::new();
        services.add(service("s1", "foo")).unwrap();

        assert_eq!(services.get("s1").unwrap().name.as_deref(), Some("foo"));
        assert_eq!(services.get("foo").unwrap().id(), Some("s1"));
        assert!(services.get("bar").unwrap_err().is_not_found());
    }

    #[test]
    fn test_add_rejects_missing_id() {
        let services = Collection::<Service>::new();
        let err = services.add(Service::named("foo")).unwrap_err();
        assert_eq!(
            err,
            Error::MissingRequiredField {
                kind: Kind::Service,
                field: "id"
            }
        );
    }

    #[test]
    fn test_add_rejects_duplicate_id_and_name() {
        let services = Collection::<Service>::new();
        services.add(service("s1", "foo")).unwrap();

        let err = services.add(service("s1", "other")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { index: "id", .. }));

        let err = services.add(service("s2", "foo")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { index: "name", .. }));
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_unnamed_entities_do_not_collide() {
        let routes = Collection::<Route>::new();
        let mut a = Route::default();
        a.base.id = Some("r1".to_string());
        let mut b = Route::default();
        b.base.id = Some("r2".to_string());
        routes.add(a).unwrap();
        routes.add(b).unwrap();
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_add_rejects_missing_owner() {
        let creds = Collection::<KeyAuth>::new();
        let cred = KeyAuth {
            base: Base::with_id("k1"),
            key: Some("secret".to_string()),
            ..KeyAuth::default()
        };
        let err = creds.add(cred).unwrap_err();
        assert_eq!(
            err,
            Error::MissingRequiredField {
                kind: Kind::KeyAuth,
                field: "consumer"
            }
        );

        let targets = Collection::<Target>::new();
        let target = Target {
            base: Base::with_id("t1"),
            target: Some("10.0.0.1:80".to_string()),
            upstream: Some(Reference::to_name("up")),
            ..Target::default()
        };
        assert!(targets.add(target).unwrap_err().is_validation());

        let snis = Collection::<Sni>::new();
        let sni = Sni {
            base: Base::with_id("n1"),
            name: Some("example.com".to_string()),
            certificate: None,
        };
        assert!(snis.add(sni).unwrap_err().is_validation());
    }

    #[test]
    fn test_plugin_compound_uniqueness() {
        let plugins = Collection::<Plugin>::new();
        let mut first = Plugin::named("rate-limiting");
        first.base.id = Some("p1".to_string());
        first.route = Some(Reference::to_id("r1"));
        plugins.add(first.clone()).unwrap();

        let mut dup = first.clone();
        dup.base.id = Some("p2".to_string());
        let err = plugins.add(dup.clone()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: Kind::Plugin, .. }));

        // Same name on a different scope is fine.
        dup.consumer = Some(Reference::to_id("c1"));
        plugins.add(dup).unwrap();
        assert_eq!(plugins.get_all_by_index("name", "rate-limiting").len(), 2);
    }

    #[test]
    fn test_update_replaces_value_and_keeps_metadata() {
        let services = Collection::<Service>::new();
        services
            .add_record(Record::new(service("s1", "foo")).with_metadata("origin", "test"))
            .unwrap();

        let mut changed = service("s1", "foo-renamed");
        changed.host = Some("example.com".to_string());
        services.update(changed).unwrap();

        assert!(services.get("foo").is_err());
        let record = services.get_record("foo-renamed").unwrap();
        assert_eq!(record.entity().host.as_deref(), Some("example.com"));
        assert_eq!(record.metadata("origin"), Some("test"));
    }

    #[test]
    fn test_update_requires_existing_id() {
        let services = Collection::<Service>::new();
        let err = services.update(service("missing", "foo")).unwrap_err();
        assert!(err.is_not_found());
        let err = services.update(Service::named("foo")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let services = Collection::<Service>::new();
        services.add(service("s1", "foo")).unwrap();
        services.add(service("s2", "bar")).unwrap();

        // Renaming s1 to an existing name must fail and leave s1 intact.
        let err = services.update(service("s1", "bar")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(services.get("foo").unwrap().id(), Some("s1"));
        assert_eq!(services.get("bar").unwrap().id(), Some("s2"));
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn test_delete_by_name() {
        let services = Collection::<Service>::new();
        services.add(service("s1", "foo")).unwrap();
        let removed = services.delete("foo").unwrap();
        assert_eq!(removed.id(), Some("s1"));
        assert!(services.is_empty());
        assert!(services.delete("foo").unwrap_err().is_not_found());
        // The name is free again.
        services.add(service("s2", "foo")).unwrap();
    }

    #[test]
    fn test_get_all_returns_copies() {
        let services = Collection::<Service>::new();
        services.add(service("s1", "foo")).unwrap();

        let mut all = services.get_all();
        all[0].name = Some("mutated".to_string());

        assert_eq!(services.get("s1").unwrap().name.as_deref(), Some("foo"));
    }

    #[test]
    fn test_get_all_by_foreign_key() {
        let routes = Collection::<Route>::new();
        for (id, svc) in [("r1", "s1"), ("r2", "s1"), ("r3", "s2")] {
            let mut route = Route::named(id);
            route.base.id = Some(id.to_string());
            route.service = Some(Reference::to_id(svc));
            routes.add(route).unwrap();
        }

        let owned = routes.get_all_by_foreign_key(Kind::Service, "s1");
        assert_eq!(owned.len(), 2);
        assert!(routes.get_all_by_foreign_key(Kind::Consumer, "s1").is_empty());

        routes.delete("r1").unwrap();
        assert_eq!(routes.get_all_by_foreign_key(Kind::Service, "s1").len(), 1);
    }

    #[test]
    fn test_find_match_by_natural_key_and_ambiguity() {
        let consumers = Collection::<Consumer>::new();
        let mut alice = Consumer::with_username("alice");
        alice.base.id = Some("c1".to_string());
        let mut bob = Consumer::with_username("bob");
        bob.base.id = Some("c2".to_string());
        bob.custom_id = Some("ext-7".to_string());
        consumers.add(alice).unwrap();
        consumers.add(bob).unwrap();

        let probe = Consumer::with_username("alice");
        let found = consumers.find_match(&probe).unwrap().unwrap();
        assert_eq!(found.entity().id(), Some("c1"));

        assert!(consumers.find_match(&Consumer::with_username("carol")).unwrap().is_none());

        let mut conflicting = Consumer::with_username("alice");
        conflicting.custom_id = Some("ext-7".to_string());
        let err = consumers.find_match(&conflicting).unwrap_err();
        assert!(matches!(err, Error::Ambiguous { .. }));
    }

    #[test]
    fn test_concurrent_readers_see_committed_state() {
        use std::sync::Arc;

        let services = Arc::new(Collection::<Service>::new());
        let writer = {
            let services = Arc::clone(&services);
            std::thread::spawn(move || {
                for i in 0..200 {
                    services.add(service(&format!("s{i}"), &format!("svc-{i}"))).unwrap();
                }
            })
        };
        for _ in 0..200 {
            for svc in services.get_all() {
                let id = svc.id().unwrap().to_string();
                let by_name = services.get(svc.name.as_deref().unwrap()).unwrap();
                assert_eq!(by_name.id(), Some(id.as_str()));
            }
        }
        writer.join().unwrap();
        assert_eq!(services.len(), 200);
    }
}
