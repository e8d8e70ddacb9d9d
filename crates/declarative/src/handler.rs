//! Per-kind handlers that apply change events

use crate::diff::{ChangeEvent, ChangeOp};
use crate::error::{Error, Result};
use entitystore::Kind;
use gateway::{ApiError, GatewayApi};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Applies the change events of one kind.
///
/// Handlers are called from worker threads.
pub trait KindHandler: Send + Sync {
    /// Create the entity; returns the stored value, including its ID.
    fn create(&self, event: &ChangeEvent) -> Result<Value>;

    /// Update the entity; returns the stored value.
    fn update(&self, event: &ChangeEvent) -> Result<Value>;

    fn delete(&self, event: &ChangeEvent) -> Result<()>;
}

/// Handler forwarding every event to a [`GatewayApi`].
pub struct GatewayHandler {
    api: Arc<dyn GatewayApi>,
}

impl GatewayHandler {
    pub fn new(api: Arc<dyn GatewayApi>) -> Self {
        Self { api }
    }

    fn failed(event: &ChangeEvent, source: ApiError) -> Error {
        Error::RemoteOperationFailed {
            op: event.op.api_op(),
            kind: event.kind,
            identity: event.identity.clone(),
            source,
        }
    }
}

impl KindHandler for GatewayHandler {
    fn create(&self, event: &ChangeEvent) -> Result<Value> {
        self.api
            .create(event.kind, event.value())
            .map_err(|e| Self::failed(event, e))
    }

    fn update(&self, event: &ChangeEvent) -> Result<Value> {
        self.api
            .update(event.kind, &event.id, event.value())
            .map_err(|e| Self::failed(event, e))
    }

    fn delete(&self, event: &ChangeEvent) -> Result<()> {
        self.api
            .delete(event.kind, &event.id, event.value())
            .map_err(|e| Self::failed(event, e))
    }
}

/// Handlers by kind
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<Kind, Arc<dyn KindHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry routing every kind to `api`.
    pub fn for_gateway(api: Arc<dyn GatewayApi>) -> Self {
        let handler: Arc<dyn KindHandler> = Arc::new(GatewayHandler::new(api));
        let mut registry = Self::new();
        for kind in Kind::ALL {
            registry.handlers.insert(kind, Arc::clone(&handler));
        }
        registry
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: Kind, handler: Arc<dyn KindHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: Kind) -> Option<&dyn KindHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    /// Dispatch `event` to the handler of its kind.
    ///
    /// Returns the stored value for creates and updates.
    pub fn apply(&self, event: &ChangeEvent) -> Result<Option<Value>> {
        let handler = self
            .get(event.kind)
            .ok_or(Error::NoHandler { kind: event.kind })?;
        match event.op {
            ChangeOp::Create => handler.create(event).map(Some),
            ChangeOp::Update => handler.update(event).map(Some),
            ChangeOp::Delete => handler.delete(event).map(|()| None),
        }
    }
}
