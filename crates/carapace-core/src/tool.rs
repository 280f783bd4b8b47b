// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool declarations — the catalog's registration-time vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-tool risk classification. High-risk tools must pass stage 5
/// (confirmation) before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Passes through stage 5 unconditionally.
    Low,
    /// Requires pre-approval (or a resolved confirmation) to pass stage 5.
    High,
}

/// A tool's registration-time declaration.
///
/// `arguments_schema` is a JSON-Schema object whose root must mandate
/// `"type": "object"` and `"additionalProperties": false` — the catalog
/// rejects registration otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool name, referenced as `tool.invoke.<name>` on the wire.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Compiled once at registration; the raw schema is kept for
    /// introspection (`list_tools`).
    pub arguments_schema: Value,
}
