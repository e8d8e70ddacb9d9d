//! Core types for executing change sets

use crate::diff::ChangeOp;
use crate::error::Error;
use entitystore::Kind;
use serde::{Deserialize, Serialize};

/// Outcome of one change event
#[derive(Debug)]
pub enum Outcome {
    /// The gateway accepted the change
    Applied,
    /// The change failed, was skipped, or was cancelled
    Failed(Error),
}

/// Result of one node of the plan
#[derive(Debug)]
pub struct NodeResult {
    pub op: ChangeOp,
    pub kind: Kind,
    /// Final ID: the server-assigned one for creates
    pub id: String,
    pub identity: String,
    pub outcome: Outcome,
}

impl NodeResult {
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, Outcome::Applied)
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Applied => None,
            Outcome::Failed(err) => Some(err),
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if every event was applied
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.cancelled == 0
    }

    /// Total number of events processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.failed + self.skipped + self.cancelled
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &NodeResult) {
        match (&result.outcome, result.op) {
            (Outcome::Applied, ChangeOp::Create) => self.created += 1,
            (Outcome::Applied, ChangeOp::Update) => self.updated += 1,
            (Outcome::Applied, ChangeOp::Delete) => self.deleted += 1,
            (Outcome::Failed(err), _) if err.is_skip() => self.skipped += 1,
            (Outcome::Failed(err), _) if err.is_cancelled() => self.cancelled += 1,
            (Outcome::Failed(_), _) => self.failed += 1,
        }
    }
}

/// Outcomes of a run, in plan order: deletes, then creates and updates.
#[derive(Debug, Default)]
pub struct ExecuteReport {
    pub results: Vec<NodeResult>,
}

impl ExecuteReport {
    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for result in &self.results {
            summary.add_result(result);
        }
        summary
    }

    /// Every event that was not applied
    pub fn failures(&self) -> impl Iterator<Item = &NodeResult> {
        self.results.iter().filter(|r| !r.is_applied())
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(NodeResult::is_applied)
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of gateway calls in flight
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}
