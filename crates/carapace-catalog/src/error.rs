// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registration-time failures for the tool catalog.

use thiserror::Error;

/// Why a [`crate::ToolCatalog::register`] call was rejected.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A tool with this name is already registered.
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),

    /// `arguments_schema`'s root is not `"type": "object"`.
    #[error("tool `{0}`'s arguments_schema root must declare \"type\": \"object\"")]
    RootNotObject(String),

    /// `arguments_schema`'s root does not set `additionalProperties: false`.
    #[error("tool `{0}`'s arguments_schema root must set \"additionalProperties\": false")]
    SchemaNotClosed(String),

    /// The schema failed to compile.
    #[error("tool `{0}`'s arguments_schema failed to compile: {1}")]
    SchemaCompile(String, String),
}
