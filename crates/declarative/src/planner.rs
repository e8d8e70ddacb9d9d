//! Execution planner - turns a change set into dependency graphs

use crate::diff::{ChangeEvent, ChangeOp, ChangeSet};
use crate::error::Result;
use crate::graph::{Dag, EdgeKind, Graph, NodeId};
use entitystore::Kind;
use std::collections::{HashMap, HashSet};

/// The two graphs of a run: deletes first, then creates and updates.
///
/// A delete whose entity is still referenced by an update moving that
/// reference elsewhere is placed in the second graph, after the update.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Delete events; edges run children before their parents
    pub deletes: Graph<ChangeEvent>,
    /// Create and update events, plus deletes waiting on updates; edges run
    /// parents before their children
    pub upserts: Graph<ChangeEvent>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.deletes.len() + self.upserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the delete and create/update graphs for `changes`.
///
/// A child depends on the creation of a parent it references. A parent that
/// is only updated already exists, so children merely wait for it.
pub fn build_graphs(changes: &ChangeSet) -> Result<ExecutionPlan> {
    let deferred = deferred_deletes(changes);
    let (late, early): (Vec<&ChangeEvent>, Vec<&ChangeEvent>) = changes
        .deletes
        .iter()
        .partition(|event| deferred.contains(&event.key()));

    let mut upserts = Dag::new();
    let upsert_events: Vec<&ChangeEvent> = changes.creates_updates.iter().collect();
    let (upsert_nodes, upsert_ids) = add_nodes(&mut upserts, &upsert_events);
    let mut upsert_edges = 0;
    for (event, &child) in upsert_events.iter().zip(&upsert_nodes) {
        for link in &event.links {
            if let Some(&parent) = upsert_ids.get(&(link.kind, link.id.as_str())) {
                let kind = match upserts.node(parent).op {
                    ChangeOp::Create => EdgeKind::Dependency,
                    _ => EdgeKind::Ordering,
                };
                upserts.add_edge(parent, child, kind);
                upsert_edges += 1;
            }
        }
    }

    let (late_nodes, late_ids) = add_nodes(&mut upserts, &late);
    upsert_edges += add_delete_edges(&mut upserts, &late, &late_nodes, &late_ids);
    for (event, &update) in upsert_events.iter().zip(&upsert_nodes) {
        for link in event.previous_links() {
            if let Some(&delete) = late_ids.get(&(link.kind, link.id.as_str())) {
                upserts.add_edge(update, delete, EdgeKind::Dependency);
                upsert_edges += 1;
            }
        }
    }

    let mut deletes = Dag::new();
    let (delete_nodes, delete_ids) = add_nodes(&mut deletes, &early);
    let delete_edges = add_delete_edges(&mut deletes, &early, &delete_nodes, &delete_ids);

    log::debug!(
        "plan: {} deletes ({delete_edges} edges), {} creates/updates ({upsert_edges} edges, {} deferred deletes)",
        deletes.len(),
        upserts.len(),
        late.len()
    );

    Ok(ExecutionPlan {
        deletes: deletes.build()?,
        upserts: upserts.build()?,
    })
}

type NodeIndex<'a> = HashMap<(Kind, &'a str), NodeId>;

fn add_nodes<'a>(
    dag: &mut Dag<ChangeEvent>,
    events: &[&'a ChangeEvent],
) -> (Vec<NodeId>, NodeIndex<'a>) {
    let nodes: Vec<NodeId> = events.iter().map(|&e| dag.add_node(e.clone())).collect();
    let index = events.iter().map(|&e| e.key()).zip(nodes.iter().copied()).collect();
    (nodes, index)
}

/// Order deletes so children go before the parents they reference.
fn add_delete_edges(
    dag: &mut Dag<ChangeEvent>,
    events: &[&ChangeEvent],
    nodes: &[NodeId],
    index: &NodeIndex<'_>,
) -> usize {
    let mut edges = 0;
    for (event, &child) in events.iter().zip(nodes) {
        for link in &event.links {
            if let Some(&parent) = index.get(&(link.kind, link.id.as_str())) {
                dag.add_edge(child, parent, EdgeKind::Dependency);
                edges += 1;
            }
        }
    }
    edges
}

/// Deletes that must wait for an update to move a reference off them, and
/// the deleted parents of those.
fn deferred_deletes(changes: &ChangeSet) -> HashSet<(Kind, &str)> {
    let released: HashSet<(Kind, String)> = changes
        .creates_updates
        .iter()
        .filter(|event| event.op == ChangeOp::Update)
        .flat_map(ChangeEvent::previous_links)
        .map(|link| (link.kind, link.id))
        .collect();
    let deleted: HashSet<(Kind, &str)> = changes.deletes.iter().map(ChangeEvent::key).collect();

    let mut deferred: HashSet<(Kind, &str)> = deleted
        .iter()
        .copied()
        .filter(|&(kind, id)| released.contains(&(kind, id.to_string())))
        .collect();
    loop {
        let before = deferred.len();
        for event in &changes.deletes {
            if !deferred.contains(&event.key()) {
                continue;
            }
            for link in &event.links {
                let key = (link.kind, link.id.as_str());
                if deleted.contains(&key) {
                    deferred.insert(key);
                }
            }
        }
        if deferred.len() == before {
            break;
        }
    }
    deferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Link;
    use serde_json::json;

    fn event(op: ChangeOp, kind: Kind, id: &str, links: &[(&'static str, Kind, &str)]) -> ChangeEvent {
        ChangeEvent {
            op,
            kind,
            id: id.to_string(),
            identity: id.to_string(),
            payload: (op != ChangeOp::Delete).then(|| json!({ "id": id })),
            previous: (op != ChangeOp::Create).then(|| json!({ "id": id })),
            links: links
                .iter()
                .map(|&(field, kind, id)| Link {
                    field,
                    kind,
                    id: id.to_string(),
                })
                .collect(),
        }
    }

    fn ids(graph: &Graph<ChangeEvent>) -> Vec<&str> {
        graph
            .order()
            .iter()
            .map(|&id| graph.node(id).id.as_str())
            .collect()
    }

    #[test]
    fn test_upserts_run_parents_first() {
        let changes = ChangeSet {
            deletes: Vec::new(),
            creates_updates: vec![
                event(ChangeOp::Create, Kind::Service, "s1", &[]),
                event(ChangeOp::Create, Kind::Route, "r1", &[("service", Kind::Service, "s1")]),
                event(
                    ChangeOp::Create,
                    Kind::Plugin,
                    "p1",
                    &[("route", Kind::Route, "r1"), ("service", Kind::Service, "s1")],
                ),
            ],
        };
        let plan = build_graphs(&changes).unwrap();
        assert_eq!(ids(&plan.upserts), ["s1", "r1", "p1"]);

        let (route, _) = plan.upserts.nodes().find(|(_, e)| e.id == "r1").unwrap();
        assert_eq!(plan.upserts.successors(route).len(), 1);
        assert_eq!(plan.upserts.successors(route)[0].1, EdgeKind::Dependency);
    }

    #[test]
    fn test_updated_parent_only_orders() {
        let changes = ChangeSet {
            deletes: Vec::new(),
            creates_updates: vec![
                event(ChangeOp::Update, Kind::Service, "s1", &[]),
                event(ChangeOp::Create, Kind::Route, "r1", &[("service", Kind::Service, "s1")]),
            ],
        };
        let plan = build_graphs(&changes).unwrap();
        let (service, _) = plan.upserts.nodes().find(|(_, e)| e.id == "s1").unwrap();
        assert_eq!(plan.upserts.successors(service)[0].1, EdgeKind::Ordering);
    }

    #[test]
    fn test_links_outside_the_graph_add_no_edges() {
        let changes = ChangeSet {
            deletes: Vec::new(),
            creates_updates: vec![event(
                ChangeOp::Create,
                Kind::Route,
                "r1",
                &[("service", Kind::Service, "existing")],
            )],
        };
        let plan = build_graphs(&changes).unwrap();
        assert_eq!(plan.upserts.roots().len(), 1);
    }

    #[test]
    fn test_deletes_run_children_first() {
        let changes = ChangeSet {
            deletes: vec![
                event(ChangeOp::Delete, Kind::Route, "r1", &[("service", Kind::Service, "s1")]),
                event(ChangeOp::Delete, Kind::Service, "s1", &[]),
            ],
            creates_updates: Vec::new(),
        };
        let plan = build_graphs(&changes).unwrap();
        assert_eq!(ids(&plan.deletes), ["r1", "s1"]);
        assert_eq!(plan.len(), 2);
        assert!(plan.upserts.is_empty());
    }

    #[test]
    fn test_delete_waits_for_update_moving_a_child_away() {
        let mut moved = event(ChangeOp::Update, Kind::Route, "r1", &[("service", Kind::Service, "s2")]);
        moved.previous = Some(json!({ "id": "r1", "service": { "id": "s1" } }));
        let changes = ChangeSet {
            deletes: vec![
                event(ChangeOp::Delete, Kind::Route, "r9", &[("service", Kind::Service, "s9")]),
                event(ChangeOp::Delete, Kind::Service, "s1", &[("client_certificate", Kind::Certificate, "c1")]),
                event(ChangeOp::Delete, Kind::Service, "s9", &[]),
                event(ChangeOp::Delete, Kind::Certificate, "c1", &[]),
            ],
            creates_updates: vec![
                event(ChangeOp::Create, Kind::Service, "s2", &[]),
                moved,
            ],
        };
        let plan = build_graphs(&changes).unwrap();

        assert_eq!(ids(&plan.deletes), ["r9", "s9"]);
        assert_eq!(ids(&plan.upserts), ["s2", "r1", "s1", "c1"]);
        let (route, _) = plan.upserts.nodes().find(|(_, e)| e.id == "r1").unwrap();
        let (service, _) = plan.upserts.nodes().find(|(_, e)| e.id == "s1").unwrap();
        assert!(plan.upserts.successors(route).contains(&(service, EdgeKind::Dependency)));
        assert_eq!(plan.len(), 6);
    }
}
