//! # Declarative
//!
//! Declarative gateway configuration: bring a live gateway in line with a
//! desired configuration file.
//!
//! A run has four steps:
//!
//! 1. [`fetch_current`] reads the gateway into a current [`Store`]
//! 2. [`IdentityReconciler`] turns the declarative [`Content`] into a target
//!    store whose entities carry stable IDs
//! 3. [`Differ`] compares both stores and emits an ordered [`ChangeSet`]
//! 4. [`build_graphs`] and [`execute`] apply the changes in dependency order
//!    on a bounded worker pool
//!
//! ## Core Concepts
//!
//! - **ChangeEvent**: one create, update or delete of one entity
//! - **ExecutionPlan**: the delete graph and the create/update graph
//! - **KindHandler**: applies the events of one kind; [`GatewayHandler`]
//!   forwards them to a [`gateway::GatewayApi`]
//! - **ExecuteReport**: the outcome of every event of a run
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     CancelToken, Content, Differ, ExecuteOptions, HandlerRegistry,
//!     IdentityReconciler, NoProgress, build_graphs, execute, fetch_current,
//! };
//! use gateway::HttpGateway;
//! use std::sync::Arc;
//!
//! let api = Arc::new(HttpGateway::new("http://localhost:8001"));
//! let content = Content::load("kong.toml".as_ref())?;
//!
//! let current = fetch_current(api.as_ref(), &content.select_tags)?;
//! let target = IdentityReconciler::new(&current)
//!     .with_select_tags(&content.select_tags)
//!     .reconcile(&content)
//!     .map_err(|errors| errors.into_iter().next().unwrap())?;
//!
//! let changes = Differ::new(&current, &target).diff()?;
//! let plan = build_graphs(&changes)?;
//! let report = execute(
//!     plan,
//!     &HandlerRegistry::for_gateway(api),
//!     &ExecuteOptions::default(),
//!     &CancelToken::new(),
//!     &mut NoProgress,
//! )?;
//! assert!(report.is_success());
//! ```

pub mod content;
pub mod context;
pub mod current;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod handler;
pub mod identity;
pub mod planner;
pub mod types;

// Re-export main types at crate root
pub use content::{
    CertificateDef, ConsumerDef, ConsumerGroupDef, Content, Format, RouteDef, ServiceDef,
    UpstreamDef,
};
pub use context::{CancelToken, NoProgress, Phase, ProgressCallback};
pub use current::{ORIGIN, fetch_current};
pub use diff::{ChangeEvent, ChangeOp, ChangeSet, Counts, DiffSummary, Differ, Link};
pub use entitystore::{EqualityOptions, Store};
pub use error::{Error, Result};
pub use executor::{execute, execute_simple};
pub use graph::{Dag, EdgeKind, Graph, NodeId};
pub use handler::{GatewayHandler, HandlerRegistry, KindHandler};
pub use identity::{GROUPS, ID_SOURCE, IdentityReconciler};
pub use planner::{ExecutionPlan, build_graphs};
pub use types::{ExecuteOptions, ExecuteReport, ExecuteSummary, NodeResult, Outcome};
