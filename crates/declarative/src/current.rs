//! Loading the current state from the gateway

use crate::error::{Error, Result};
use entitystore::{Entity, Kind, Record, Store, with_entity_type};
use gateway::GatewayApi;
use rayon::prelude::*;
use serde_json::Value;

/// Metadata key recording where a current entity was read from.
pub const ORIGIN: &str = "origin";

/// Build the current store from every entity the gateway lists.
///
/// Only entities carrying all of `select_tags` are kept. Kinds are listed
/// in parallel.
pub fn fetch_current(api: &dyn GatewayApi, select_tags: &[String]) -> Result<Store> {
    let listed: Vec<(Kind, Vec<Value>)> = Kind::ALL
        .par_iter()
        .map(|&kind| {
            api.list(kind)
                .map(|values| (kind, values))
                .map_err(|source| Error::List { kind, source })
        })
        .collect::<Result<_>>()?;

    let store = Store::new();
    for (kind, values) in listed {
        let kept = with_entity_type!(kind, E => load::<E>(&store, values, select_tags))?;
        log::debug!("current: {kept} {kind} entities");
    }
    log::info!("current state: {} entities", store.len());
    Ok(store)
}

fn load<E: Entity>(store: &Store, values: Vec<Value>, select_tags: &[String]) -> Result<usize> {
    let collection = store.collection::<E>();
    let mut kept = 0;
    for value in values {
        let entity = E::from_value(strip_nulls(value))?;
        if !entity.has_tags(select_tags) {
            continue;
        }
        let identity = entity.identity();
        collection
            .add_record(Record::new(entity).with_metadata(ORIGIN, "gateway"))
            .map_err(|e| Error::entity(E::KIND, identity, e))?;
        kept += 1;
    }
    Ok(kept)
}

/// Drop top-level `null` fields; the Admin API sends unset fields as nulls.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(mut fields) => {
            fields.retain(|_, v| !v.is_null());
            Value::Object(fields)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitystore::types::{Route, Service};
    use gateway::{ApiError, MemoryGateway, Op};
    use serde_json::json;

    fn gateway() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway
            .seed(
                Kind::Service,
                json!({ "id": "s1", "name": "foo", "host": "a", "tags": ["team-a"], "path": null }),
            )
            .unwrap();
        gateway
            .seed(
                Kind::Service,
                json!({ "id": "s2", "name": "other", "host": "b", "tags": null }),
            )
            .unwrap();
        gateway
            .seed(
                Kind::Route,
                json!({ "id": "r1", "name": "bar", "paths": ["/"], "service": { "id": "s1" }, "tags": ["team-a"] }),
            )
            .unwrap();
        gateway
    }

    #[test]
    fn test_fetch_everything() {
        let store = fetch_current(&gateway(), &[]).unwrap();
        assert_eq!(store.kind_len(Kind::Service), 2);
        assert_eq!(store.kind_len(Kind::Route), 1);

        let record = store.collection::<Service>().get_record("foo").unwrap();
        assert_eq!(record.metadata(ORIGIN), Some("gateway"));
        assert_eq!(record.entity().path, None);

        let route = store.collection::<Route>().get("bar").unwrap();
        assert_eq!(route.service.unwrap().resolved_id(), Some("s1"));
    }

    #[test]
    fn test_fetch_filters_by_select_tags() {
        let store = fetch_current(&gateway(), &["team-a".to_string()]).unwrap();
        assert_eq!(store.kind_len(Kind::Service), 1);
        assert!(store.collection::<Service>().contains("s1"));
        assert!(!store.collection::<Service>().contains("s2"));
    }

    #[test]
    fn test_list_failure_names_the_kind() {
        let gateway = gateway();
        gateway.fail(Op::List, Kind::Route, "", ApiError::Network {
            message: "connection refused".to_string(),
        });
        let err = fetch_current(&gateway, &[]).unwrap_err();
        assert!(matches!(err, Error::List { kind: Kind::Route, .. }));
    }
}
