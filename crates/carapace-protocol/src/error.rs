// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire-decode failures — always surfaced as a stage-2 `VALIDATION_FAILED`
//! rejection upstream.

use thiserror::Error;

/// Why a raw wire message failed to decode into a
/// [`carapace_core::WireMessage`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The line was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// The top-level value was not a JSON object.
    #[error("wire message must be a JSON object")]
    NotAnObject,

    /// One of `topic`/`correlation`/`arguments` was missing.
    #[error("wire message missing required field `{0}`")]
    MissingField(&'static str),

    /// A field other than `topic`/`correlation`/`arguments` was present.
    #[error("wire message has unexpected top-level field `{0}`")]
    UnexpectedField(String),

    /// `arguments` contained a prototype-pollution key, at the given
    /// JSON-path-style location.
    #[error("forbidden key `{key}` at `{path}`")]
    ForbiddenKey {
        /// The offending key (`__proto__`, `constructor`, or `prototype`).
        key: &'static str,
        /// JSON-path-style location, e.g. `$.arguments.nested`.
        path: String,
    },

    /// A field had the wrong JSON type (e.g. `topic` was a number).
    #[error("field `{field}` has the wrong type, expected {expected}")]
    WrongType {
        /// The offending field name.
        field: &'static str,
        /// The expected JSON type.
        expected: &'static str,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
