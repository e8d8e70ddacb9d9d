//! Execution context: progress reporting and cancellation
//!
//! These let the executor be driven by any front end without depending on
//! a specific terminal or UI implementation.

use crate::diff::ChangeEvent;
use crate::types::NodeResult;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Execution phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Delete,
    Upsert,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => f.write_str("deleting"),
            Self::Upsert => f.write_str("creating and updating"),
        }
    }
}

/// Progress callback for execution operations
///
/// Calls are made from the coordinating thread only.
pub trait ProgressCallback: Send {
    /// Called when starting to run one of the graphs
    fn on_graph_start(&mut self, phase: Phase, count: usize);

    /// Called when an event is dispatched to its handler
    fn on_node_start(&mut self, event: &ChangeEvent);

    /// Called when an event has an outcome, including skips and cancellations
    fn on_node_complete(&mut self, result: &NodeResult);

    /// Called when a graph completes
    fn on_graph_complete(&mut self, phase: Phase);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_graph_start(&mut self, _phase: Phase, _count: usize) {}
    fn on_node_start(&mut self, _event: &ChangeEvent) {}
    fn on_node_complete(&mut self, _result: &NodeResult) {}
    fn on_graph_complete(&mut self, _phase: Phase) {}
}

/// Run-level cancellation: an explicit flag plus an optional deadline.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
