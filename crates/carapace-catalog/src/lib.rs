// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of tool declarations, with compiled argument-schema
//! validators built once at registration time.

mod error;

use std::collections::HashMap;

use carapace_core::ToolDeclaration;
use carapace_error::{ErrorCode, PipelineRejection};
use jsonschema::Validator;
use serde_json::Value;

pub use error::CatalogError;

struct CatalogEntry {
    declaration: ToolDeclaration,
    validator: Validator,
}

/// Registry mapping tool names to their declaration and compiled
/// argument validator.
///
/// Registration enforces that every tool's schema is a closed object
/// schema (`type=object`, `additionalProperties=false`) so stage 3 can
/// rely on unknown-property rejection happening inside schema
/// validation rather than as a separate check.
#[derive(Default)]
pub struct ToolCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ToolCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its argument schema.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateTool`] if `declaration.name` is
    /// already registered, [`CatalogError::RootNotObject`] or
    /// [`CatalogError::SchemaNotClosed`] if the schema's root does not
    /// mandate a closed object, and [`CatalogError::SchemaCompile`] if
    /// the schema otherwise fails to compile.
    pub fn register(&mut self, declaration: ToolDeclaration) -> Result<(), CatalogError> {
        if self.entries.contains_key(&declaration.name) {
            return Err(CatalogError::DuplicateTool(declaration.name));
        }

        let root = declaration
            .arguments_schema
            .as_object()
            .ok_or_else(|| CatalogError::RootNotObject(declaration.name.clone()))?;

        match root.get("type").and_then(Value::as_str) {
            Some("object") => {}
            _ => return Err(CatalogError::RootNotObject(declaration.name.clone())),
        }

        match root.get("additionalProperties") {
            Some(Value::Bool(false)) => {}
            _ => return Err(CatalogError::SchemaNotClosed(declaration.name.clone())),
        }

        let validator = jsonschema::validator_for(&declaration.arguments_schema)
            .map_err(|e| CatalogError::SchemaCompile(declaration.name.clone(), e.to_string()))?;

        let name = declaration.name.clone();
        self.entries.insert(
            name,
            CatalogEntry {
                declaration,
                validator,
            },
        );
        Ok(())
    }

    /// Look up a tool's declaration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDeclaration> {
        self.entries.get(name).map(|e| &e.declaration)
    }

    /// Whether a tool with this name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered tool declarations, in registration order is not
    /// guaranteed (backed by a hash map).
    #[must_use]
    pub fn list(&self) -> Vec<&ToolDeclaration> {
        self.entries.values().map(|e| &e.declaration).collect()
    }

    /// Validate `arguments` against `name`'s compiled schema.
    ///
    /// Stage 3 of the pipeline. On the first schema violation, returns a
    /// [`PipelineRejection`] with `field` set to the offending
    /// property's JSON-path-style location and `message` summarizing
    /// that single error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRejection`] with code
    /// [`ErrorCode::UnknownTool`] if `name` is not registered, or
    /// [`ErrorCode::ValidationFailed`] (stage 3) if `arguments` fails
    /// schema validation.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), PipelineRejection> {
        let entry = self.entries.get(name).ok_or_else(|| {
            PipelineRejection::new(ErrorCode::UnknownTool, 3, format!("unknown tool `{name}`"))
        })?;

        if let Some(first_error) = entry.validator.iter_errors(arguments).next() {
            let path = first_error.instance_path.to_string();
            let field = if path.is_empty() {
                "$.arguments".to_string()
            } else {
                format!("$.arguments{}", path.replace('/', "."))
            };
            return Err(PipelineRejection::new(
                ErrorCode::ValidationFailed,
                3,
                first_error.to_string(),
            )
            .with_field(field));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_core::RiskLevel;
    use serde_json::json;

    fn echo_tool() -> ToolDeclaration {
        ToolDeclaration {
            name: "echo".into(),
            description: "Echoes text back".into(),
            risk_level: RiskLevel::Low,
            arguments_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["text"],
                "properties": {
                    "text": { "type": "string" }
                }
            }),
        }
    }

    #[test]
    fn registers_and_looks_up_a_tool() {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool()).unwrap();
        assert!(catalog.has("echo"));
        assert_eq!(catalog.get("echo").unwrap().name, "echo");
        assert_eq!(catalog.list().len(), 1);
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool()).unwrap();
        let err = catalog.register(echo_tool()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTool(n) if n == "echo"));
    }

    #[test]
    fn rejects_schema_without_closed_additional_properties() {
        let mut catalog = ToolCatalog::new();
        let mut tool = echo_tool();
        tool.arguments_schema = json!({
            "type": "object",
            "properties": { "text": { "type": "string" } }
        });
        let err = catalog.register(tool).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaNotClosed(_)));
    }

    #[test]
    fn rejects_non_object_schema_root() {
        let mut catalog = ToolCatalog::new();
        let mut tool = echo_tool();
        tool.arguments_schema = json!({
            "type": "array",
            "additionalProperties": false
        });
        let err = catalog.register(tool).unwrap_err();
        assert!(matches!(err, CatalogError::RootNotObject(_)));
    }

    #[test]
    fn validate_arguments_rejects_unknown_tool() {
        let catalog = ToolCatalog::new();
        let err = catalog.validate_arguments("ghost", &json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownTool);
    }

    #[test]
    fn validate_arguments_rejects_extra_property() {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool()).unwrap();
        let err = catalog
            .validate_arguments("echo", &json!({"text": "hi", "evil": true}))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.stage, 3);
    }

    #[test]
    fn validate_arguments_accepts_conforming_payload() {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool()).unwrap();
        catalog.validate_arguments("echo", &json!({"text": "hi"})).unwrap();
    }

    #[test]
    fn validate_arguments_reports_field_path_for_nested_violation() {
        let mut catalog = ToolCatalog::new();
        let tool = ToolDeclaration {
            name: "nested".into(),
            description: "takes a nested object".into(),
            risk_level: RiskLevel::Low,
            arguments_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "config": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": { "count": { "type": "integer" } }
                    }
                }
            }),
        };
        catalog.register(tool).unwrap();
        let err = catalog
            .validate_arguments("nested", &json!({"config": {"count": "not-a-number"}}))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("$.arguments.config.count"));
    }
}
