// SPDX-License-Identifier: MIT OR Apache-2.0
//! The untrusted, container-facing wire message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The narrow three-field message a container sends to the host.
///
/// Carries no identity — the container cannot assert who it is. The host
/// authoritatively supplies `source`/`group` when it builds a
/// [`crate::envelope::Envelope::Request`] from this message (stage 1 of
/// the pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Expected shape: `tool.invoke.<name>` for tool calls.
    pub topic: String,
    /// Opaque, client-chosen id that pairs the eventual response with
    /// this request.
    pub correlation: String,
    /// Tool arguments. Never trusted until validated against the tool's
    /// compiled schema in stage 3.
    pub arguments: Map<String, Value>,
}
