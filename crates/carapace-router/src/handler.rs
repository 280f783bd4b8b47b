// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool handlers: the host-side implementation a catalog entry
//! dispatches to at stage 6.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use carapace_core::Envelope;
use carapace_error::HandlerFailure;
use serde_json::Value;

/// A tool's host-side implementation.
///
/// Invoked with the fully-constructed request envelope; returns the
/// handler's raw result or a [`HandlerFailure`] the executor will
/// normalize into an [`carapace_error::ErrorPayload`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool for `envelope`.
    async fn invoke(&self, envelope: &Envelope) -> Result<Value, HandlerFailure>;
}

/// Maps tool name to its registered handler. Kept separate from
/// [`carapace_catalog::ToolCatalog`], which owns only the declaration
/// and compiled schema, so the catalog crate stays free of any
/// handler/async-runtime dependency.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any prior handler for
    /// that name.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Look up the handler registered for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }
}
