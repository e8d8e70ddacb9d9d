//! Execution engine - walks the plan graphs on a bounded worker pool

use crate::context::{CancelToken, NoProgress, Phase, ProgressCallback};
use crate::diff::{ChangeEvent, ChangeOp};
use crate::error::{Error, Result};
use crate::graph::{EdgeKind, Graph, NodeId};
use crate::handler::HandlerRegistry;
use crate::planner::ExecutionPlan;
use crate::types::{ExecuteOptions, ExecuteReport, NodeResult, Outcome};
use entitystore::Kind;
use gateway::entity_id;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;

/// Server-assigned IDs that differ from the planned ones.
type AssignedIds = HashMap<(Kind, String), String>;

/// Execute a plan: the delete graph, then the create/update graph.
///
/// At most `opts.jobs` handler calls run at once. A failed event skips the
/// events depending on it; independent events continue. Once `cancel`
/// fires no further event starts and unstarted ones are reported as
/// cancelled.
pub fn execute<P: ProgressCallback>(
    plan: ExecutionPlan,
    handlers: &HandlerRegistry,
    opts: &ExecuteOptions,
    cancel: &CancelToken,
    progress: &mut P,
) -> Result<ExecuteReport> {
    let jobs = opts.jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| Error::Pool(e.to_string()))?;

    let mut report = ExecuteReport::default();
    let mut assigned = AssignedIds::new();
    for (phase, graph) in [(Phase::Delete, plan.deletes), (Phase::Upsert, plan.upserts)] {
        if graph.is_empty() {
            continue;
        }
        log::info!("{phase} {} entities", graph.len());
        progress.on_graph_start(phase, graph.len());
        let mut walk = Walk::new(&graph, handlers, cancel, jobs);
        walk.run(&pool, &mut assigned, progress);
        report.results.extend(walk.into_results());
        progress.on_graph_complete(phase);
    }

    let summary = report.summary();
    log::info!(
        "applied {} changes: {} failed, {} skipped, {} cancelled",
        summary.total_changes(),
        summary.failed,
        summary.skipped,
        summary.cancelled
    );
    Ok(report)
}

/// Execute with default options, no progress reporting and no cancellation.
pub fn execute_simple(plan: ExecutionPlan, handlers: &HandlerRegistry) -> Result<ExecuteReport> {
    execute(
        plan,
        handlers,
        &ExecuteOptions::default(),
        &CancelToken::new(),
        &mut NoProgress,
    )
}

type Completion = (NodeId, ChangeEvent, Result<Option<Value>>);

/// State of one graph walk, owned by the coordinating thread.
struct Walk<'a> {
    graph: &'a Graph<ChangeEvent>,
    handlers: &'a HandlerRegistry,
    cancel: &'a CancelToken,
    jobs: usize,
    remaining: Vec<usize>,
    /// Root failure that blocks a node, by node
    blocked: Vec<Option<String>>,
    results: Vec<Option<NodeResult>>,
    ready: VecDeque<NodeId>,
}

impl<'a> Walk<'a> {
    fn new(
        graph: &'a Graph<ChangeEvent>,
        handlers: &'a HandlerRegistry,
        cancel: &'a CancelToken,
        jobs: usize,
    ) -> Self {
        let remaining = graph.nodes().map(|(id, _)| graph.in_degree(id)).collect();
        Self {
            graph,
            handlers,
            cancel,
            jobs,
            remaining,
            blocked: vec![None; graph.len()],
            results: graph.nodes().map(|_| None).collect(),
            ready: graph.roots().into(),
        }
    }

    fn run<P: ProgressCallback>(
        &mut self,
        pool: &rayon::ThreadPool,
        assigned: &mut AssignedIds,
        progress: &mut P,
    ) {
        let (tx, rx) = mpsc::channel::<Completion>();
        let graph = self.graph;
        let handlers = self.handlers;

        pool.in_place_scope(|scope| {
            let mut in_flight = 0usize;
            loop {
                while in_flight < self.jobs && !self.cancel.is_cancelled() {
                    let Some(id) = self.ready.pop_front() else {
                        break;
                    };
                    let event = graph.node(id);
                    if let Some(cause) = self.blocked[id.index()].clone() {
                        log::warn!("skipping {event}: {cause} failed");
                        let skipped = Err(Error::DependencySkipped { cause });
                        self.finish(id, event.id.clone(), skipped, progress);
                        continue;
                    }

                    let event = rewrite_references(event.clone(), assigned);
                    progress.on_node_start(&event);
                    log::debug!("starting {event}");
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        let outcome = handlers.apply(&event);
                        // The receiver outlives every job of the scope.
                        let _ = tx.send((id, event, outcome));
                    });
                    in_flight += 1;
                }

                if in_flight == 0 {
                    break;
                }
                let Ok((id, event, outcome)) = rx.recv() else {
                    break;
                };
                in_flight -= 1;
                let outcome = self.settle(&event, outcome, assigned);
                let final_id = match &outcome {
                    Ok(Some(stored)) => entity_id(stored).unwrap_or(event.id.as_str()).to_string(),
                    _ => event.id.clone(),
                };
                self.finish(id, final_id, outcome.map(|_| ()), progress);
            }
        });

        if self.cancel.is_cancelled() {
            for (id, event) in graph.nodes() {
                if self.results[id.index()].is_none() {
                    log::warn!("cancelled {event}");
                    let result = node_result(event, event.id.clone(), Err(Error::Cancelled));
                    progress.on_node_complete(&result);
                    self.results[id.index()] = Some(result);
                }
            }
        }
    }

    /// Interpret a handler outcome, recording server-assigned IDs.
    fn settle(
        &self,
        event: &ChangeEvent,
        outcome: Result<Option<Value>>,
        assigned: &mut AssignedIds,
    ) -> Result<Option<Value>> {
        match outcome {
            Ok(Some(stored)) => {
                if event.op == ChangeOp::Create
                    && let Some(id) = entity_id(&stored)
                    && id != event.id
                {
                    log::debug!("{event} was assigned ID {id}");
                    assigned.insert((event.kind, event.id.clone()), id.to_string());
                }
                Ok(Some(stored))
            }
            Err(err) if event.op == ChangeOp::Delete && err.is_remote_not_found() => {
                log::debug!("{event}: already removed");
                Ok(None)
            }
            other => other,
        }
    }

    /// Record the outcome of `id` and release its successors.
    fn finish<P: ProgressCallback>(
        &mut self,
        id: NodeId,
        final_id: String,
        outcome: Result<()>,
        progress: &mut P,
    ) {
        let graph = self.graph;
        let event = graph.node(id);
        let cause = match &outcome {
            Ok(()) => None,
            Err(Error::DependencySkipped { cause }) => Some(cause.clone()),
            Err(err) => {
                log::warn!("{event} failed: {err}");
                Some(format!("{} {}", event.kind, event.identity))
            }
        };

        for &(next, kind) in graph.successors(id) {
            if kind == EdgeKind::Dependency
                && let Some(cause) = &cause
            {
                self.blocked[next.index()].get_or_insert_with(|| cause.clone());
            }
            self.remaining[next.index()] -= 1;
            if self.remaining[next.index()] == 0 {
                self.ready.push_back(next);
            }
        }

        let result = node_result(event, final_id, outcome);
        progress.on_node_complete(&result);
        self.results[id.index()] = Some(result);
    }

    fn into_results(self) -> impl Iterator<Item = NodeResult> {
        self.results.into_iter().flatten()
    }
}

fn node_result(event: &ChangeEvent, id: String, outcome: Result<()>) -> NodeResult {
    NodeResult {
        op: event.op,
        kind: event.kind,
        id,
        identity: event.identity.clone(),
        outcome: match outcome {
            Ok(()) => Outcome::Applied,
            Err(err) => Outcome::Failed(err),
        },
    }
}

/// Point references at server-assigned IDs of parents created earlier.
fn rewrite_references(mut event: ChangeEvent, assigned: &AssignedIds) -> ChangeEvent {
    if assigned.is_empty() {
        return event;
    }
    for link in &mut event.links {
        let Some(id) = assigned.get(&(link.kind, link.id.clone())) else {
            continue;
        };
        link.id.clone_from(id);
        if let Some(Value::Object(fields)) = &mut event.payload {
            fields.insert(link.field.to_string(), json!({ "id": id }));
        }
    }
    event
}
