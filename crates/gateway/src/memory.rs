//! In-memory gateway.
//!
//! Behaves like a small Admin API: it keeps entities per kind, rejects
//! writes that reference missing entities and deletes of entities that are
//! still referenced, and records every call. Failures can be injected per
//! operation and entity.

use crate::error::{ApiError, Result};
use crate::{GatewayApi, Op, entity_id, reference_id};
use entitystore::Kind;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fields that identify an entity for failure injection.
const KEY_FIELDS: [&str; 7] = ["id", "name", "username", "target", "key", "group", "prefix"];

/// Timestamp assigned to the first created entity.
const EPOCH: i64 = 1_700_000_000;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: Kind,
    /// Entity ID; empty for list calls
    pub id: String,
}

struct Failure {
    op: Op,
    kind: Kind,
    key: String,
    error: ApiError,
}

#[derive(Default)]
struct State {
    entities: BTreeMap<Kind, BTreeMap<String, Value>>,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    next_id: u64,
}

impl State {
    fn exists(&self, kind: Kind, id: &str) -> bool {
        self.entities.get(&kind).is_some_and(|m| m.contains_key(id))
    }

    fn check_references(&self, kind: Kind, entity: &Value) -> Result<()> {
        for (field, target) in kind.reference_fields() {
            if let Some(id) = reference_id(entity, field)
                && !self.exists(target, id)
            {
                return Err(ApiError::Conflict {
                    kind,
                    message: format!("{field} references missing {target} {id}"),
                });
            }
        }
        Ok(())
    }

    fn check_unreferenced(&self, kind: Kind, id: &str) -> Result<()> {
        for (&other, entities) in &self.entities {
            for (field, target) in other.reference_fields() {
                if target != kind {
                    continue;
                }
                if let Some((child, _)) = entities
                    .iter()
                    .find(|(_, entity)| reference_id(entity, field) == Some(id))
                {
                    return Err(ApiError::Conflict {
                        kind,
                        message: format!("{kind} {id} is still referenced by {other} {child}"),
                    });
                }
            }
        }
        Ok(())
    }

    fn injected(&self, op: Op, kind: Kind, id: &str, entity: &Value) -> Option<ApiError> {
        self.failures
            .iter()
            .find(|f| {
                f.op == op
                    && f.kind == kind
                    && (f.key == id
                        || KEY_FIELDS
                            .iter()
                            .any(|k| entity.get(*k).and_then(Value::as_str) == Some(&f.key)))
            })
            .map(|f| f.error.clone())
    }
}

/// In-memory Admin API double.
pub struct MemoryGateway {
    state: Mutex<State>,
    reassign_ids: bool,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            reassign_ids: false,
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Ignore IDs sent on create and assign fresh ones, like a gateway that
    /// does not honour client-chosen IDs.
    pub fn reassigning_ids(mut self) -> Self {
        self.reassign_ids = true;
        self
    }

    /// Sleep for `latency` inside every mutating call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `entity` without recording a call.
    pub fn seed(&self, kind: Kind, entity: Value) -> Result<()> {
        let id = entity_id(&entity)
            .ok_or_else(|| ApiError::Other(format!("seeded {kind} has no id")))?
            .to_string();
        self.lock().entities.entry(kind).or_default().insert(id, entity);
        Ok(())
    }

    /// Fail `op` on `kind` for the entity whose ID or natural key is `key`.
    pub fn fail(&self, op: Op, kind: Kind, key: impl Into<String>, error: ApiError) {
        self.lock().failures.push(Failure {
            op,
            kind,
            key: key.into(),
            error,
        });
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls other than lists, in order.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op != Op::List).collect()
    }

    /// Stored entities of `kind`, ordered by ID.
    pub fn entities(&self, kind: Kind) -> Vec<Value> {
        self.lock()
            .entities
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, kind: Kind, id: &str) -> Option<Value> {
        self.lock().entities.get(&kind).and_then(|m| m.get(id)).cloned()
    }

    /// Most mutating calls ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Track one mutating call for the concurrency high-water mark.
    fn enter<T>(&self, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let result = call();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn store(&self, op: Op, kind: Kind, id: Option<&str>, entity: &Value) -> Result<Value> {
        let mut state = self.lock();
        state.next_id += 1;
        let serial = state.next_id;

        let id = match id {
            Some(id) if !self.reassign_ids || op == Op::Update => id.to_string(),
            _ => format!("mem-{serial}"),
        };
        state.calls.push(Call {
            op,
            kind,
            id: id.clone(),
        });

        if let Some(error) = state.injected(op, kind, &id, entity) {
            return Err(error);
        }
        match op {
            Op::Create if state.exists(kind, &id) => {
                return Err(ApiError::Conflict {
                    kind,
                    message: format!("{kind} {id} already exists"),
                });
            }
            Op::Update if !state.exists(kind, &id) => {
                return Err(ApiError::NotFound { kind, id });
            }
            _ => {}
        }
        state.check_references(kind, entity)?;

        let mut stored = entity.clone();
        if let Value::Object(fields) = &mut stored {
            let created = match state.entities.get(&kind).and_then(|m| m.get(&id)) {
                Some(previous) => previous.get("created_at").cloned(),
                None => None,
            };
            let stamp = Value::from(EPOCH + serial as i64);
            fields.insert("id".to_string(), Value::String(id.clone()));
            fields.insert("created_at".to_string(), created.unwrap_or(stamp.clone()));
            fields.insert("updated_at".to_string(), stamp);
        }
        state
            .entities
            .entry(kind)
            .or_default()
            .insert(id, stored.clone());
        Ok(stored)
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayApi for MemoryGateway {
    fn create(&self, kind: Kind, entity: &Value) -> Result<Value> {
        self.enter(|| self.store(Op::Create, kind, entity_id(entity), entity))
    }

    fn update(&self, kind: Kind, id: &str, entity: &Value) -> Result<Value> {
        self.enter(|| self.store(Op::Update, kind, Some(id), entity))
    }

    fn delete(&self, kind: Kind, id: &str, entity: &Value) -> Result<()> {
        self.enter(|| {
            let mut state = self.lock();
            state.calls.push(Call {
                op: Op::Delete,
                kind,
                id: id.to_string(),
            });
            if let Some(error) = state.injected(Op::Delete, kind, id, entity) {
                return Err(error);
            }
            if !state.exists(kind, id) {
                return Err(ApiError::NotFound {
                    kind,
                    id: id.to_string(),
                });
            }
            state.check_unreferenced(kind, id)?;
            if let Some(entities) = state.entities.get_mut(&kind) {
                entities.remove(id);
            }
            Ok(())
        })
    }

    fn list(&self, kind: Kind) -> Result<Vec<Value>> {
        let mut state = self.lock();
        state.calls.push(Call {
            op: Op::List,
            kind,
            id: String::new(),
        });
        if let Some(error) = state.injected(Op::List, kind, "", &Value::Null) {
            return Err(error);
        }
        Ok(state
            .entities
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_keeps_client_id_and_stamps_times() {
        let gw = MemoryGateway::new();
        let stored = gw
            .create(Kind::Service, &json!({"id": "s1", "name": "foo"}))
            .unwrap();
        assert_eq!(stored["id"], "s1");
        assert!(stored.get("created_at").is_some());
        assert_eq!(gw.entities(Kind::Service).len(), 1);
    }

    #[test]
    fn test_reassigning_ids() {
        let gw = MemoryGateway::new().reassigning_ids();
        let stored = gw
            .create(Kind::Service, &json!({"id": "s1", "name": "foo"}))
            .unwrap();
        assert_ne!(stored["id"], "s1");
        assert!(gw.get(Kind::Service, "s1").is_none());
    }

    #[test]
    fn test_rejects_dangling_reference() {
        let gw = MemoryGateway::new();
        let err = gw
            .create(Kind::Route, &json!({"id": "r1", "service": {"id": "nope"}}))
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Conflict);
    }

    #[test]
    fn test_rejects_deleting_referenced_parent() {
        let gw = MemoryGateway::new();
        gw.seed(Kind::Service, json!({"id": "s1", "name": "foo"})).unwrap();
        gw.seed(Kind::Route, json!({"id": "r1", "service": {"id": "s1"}}))
            .unwrap();

        assert!(gw.delete(Kind::Service, "s1", &Value::Null).is_err());
        gw.delete(Kind::Route, "r1", &Value::Null).unwrap();
        gw.delete(Kind::Service, "s1", &Value::Null).unwrap();
        assert!(gw.delete(Kind::Service, "s1", &Value::Null).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let gw = MemoryGateway::new();
        let err = gw.update(Kind::Service, "s1", &json!({"name": "foo"})).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_injected_failure_matches_natural_key() {
        let gw = MemoryGateway::new();
        gw.fail(
            Op::Create,
            Kind::Service,
            "foo",
            ApiError::Other("boom".to_string()),
        );
        assert!(gw.create(Kind::Service, &json!({"id": "s1", "name": "foo"})).is_err());
        gw.create(Kind::Service, &json!({"id": "s2", "name": "bar"})).unwrap();
        assert_eq!(
            gw.mutations(),
            vec![
                Call {
                    op: Op::Create,
                    kind: Kind::Service,
                    id: "s1".to_string()
                },
                Call {
                    op: Op::Create,
                    kind: Kind::Service,
                    id: "s2".to_string()
                },
            ]
        );
    }
}
