// SPDX-License-Identifier: MIT OR Apache-2.0
//! The four intrinsic tools every host exposes alongside plugin tools.
//! Registered in the same catalog as plugin tools — they receive no
//! pipeline exemptions (spec §4.3).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use carapace_catalog::ToolCatalog;
use carapace_core::{Envelope, RiskLevel, ToolDeclaration};
use carapace_error::{HandlerFailure, ToolError};
use carapace_router::{HandlerRegistry, ToolHandler};
use carapace_session::SessionManager;
use serde_json::{json, Value};

fn closed_object_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {}
    })
}

/// Register the four intrinsic tool declarations into `catalog`.
///
/// # Errors
///
/// Returns [`carapace_catalog::CatalogError`] if any intrinsic name
/// collides with an already-registered tool.
pub fn register_declarations(catalog: &mut ToolCatalog) -> Result<(), carapace_catalog::CatalogError> {
    catalog.register(ToolDeclaration {
        name: "echo".to_string(),
        description: "Echoes its arguments back unchanged.".to_string(),
        risk_level: RiskLevel::Low,
        arguments_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["text"],
            "properties": { "text": { "type": "string" } }
        }),
    })?;

    catalog.register(ToolDeclaration {
        name: "get_diagnostics".to_string(),
        description: "Reports host protocol version and uptime.".to_string(),
        risk_level: RiskLevel::Low,
        arguments_schema: closed_object_schema(),
    })?;

    catalog.register(ToolDeclaration {
        name: "list_tools".to_string(),
        description: "Lists every registered tool's declaration.".to_string(),
        risk_level: RiskLevel::Low,
        arguments_schema: closed_object_schema(),
    })?;

    catalog.register(ToolDeclaration {
        name: "get_session_info".to_string(),
        description: "Reports the caller's own session identity.".to_string(),
        risk_level: RiskLevel::Low,
        arguments_schema: closed_object_schema(),
    })?;

    Ok(())
}

/// Bind handler implementations for the four intrinsics into `handlers`.
pub fn register_handlers(
    handlers: &mut HandlerRegistry,
    catalog: Arc<ToolCatalog>,
    sessions: Arc<SessionManager>,
    started_at: Instant,
) {
    handlers.register("echo", Arc::new(Echo));
    handlers.register("get_diagnostics", Arc::new(GetDiagnostics { started_at }));
    handlers.register("list_tools", Arc::new(ListTools { catalog }));
    handlers.register("get_session_info", Arc::new(GetSessionInfo { sessions }));
}

struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    async fn invoke(&self, envelope: &Envelope) -> Result<Value, HandlerFailure> {
        let Envelope::Request { payload, .. } = envelope else {
            return Err(ToolError::new("INTERNAL", "expected a request envelope").into());
        };
        Ok(json!({ "echoed": payload.arguments }))
    }
}

struct GetDiagnostics {
    started_at: Instant,
}

#[async_trait]
impl ToolHandler for GetDiagnostics {
    async fn invoke(&self, _envelope: &Envelope) -> Result<Value, HandlerFailure> {
        Ok(json!({
            "protocol_version": carapace_core::PROTOCOL_VERSION,
            "uptime_seconds": self.started_at.elapsed().as_secs(),
        }))
    }
}

struct ListTools {
    catalog: Arc<ToolCatalog>,
}

#[async_trait]
impl ToolHandler for ListTools {
    async fn invoke(&self, _envelope: &Envelope) -> Result<Value, HandlerFailure> {
        let tools: Vec<Value> = self
            .catalog
            .list()
            .into_iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "risk_level": t.risk_level }))
            .collect();
        Ok(json!({ "tools": tools }))
    }
}

struct GetSessionInfo {
    sessions: Arc<SessionManager>,
}

#[async_trait]
impl ToolHandler for GetSessionInfo {
    async fn invoke(&self, envelope: &Envelope) -> Result<Value, HandlerFailure> {
        let Envelope::Request { source, .. } = envelope else {
            return Err(ToolError::new("INTERNAL", "expected a request envelope").into());
        };
        let session = self
            .sessions
            .get(source)
            .ok_or_else(|| ToolError::new("NO_SESSION", "no live session for this container"))?;
        Ok(json!({
            "session_id": session.session_id,
            "container_id": session.container_id,
            "group": session.group,
            "started_at": session.started_at,
        }))
    }
}
