// SPDX-License-Identifier: MIT OR Apache-2.0
//! The enriched context threaded through pipeline stages 1-5.

use carapace_core::{Envelope, Session, ToolDeclaration, WireMessage};

/// Carries the in-flight request's state as it passes through the
/// synchronous stages. `envelope` is filled by stage 1, `tool` by
/// stage 2; every later stage reads both.
pub struct PipelineContext {
    /// The untrusted wire message that started this request.
    pub wire: WireMessage,
    /// The host-trusted session the request arrived on.
    pub session: Session,
    /// Filled by stage 1 (Construct).
    pub envelope: Option<Envelope>,
    /// Filled by stage 2 (Topic resolution).
    pub tool: Option<ToolDeclaration>,
}

impl PipelineContext {
    /// Start a fresh context for `wire` arriving on `session`.
    #[must_use]
    pub fn new(wire: WireMessage, session: Session) -> Self {
        Self {
            wire,
            session,
            envelope: None,
            tool: None,
        }
    }

    /// The constructed request envelope.
    ///
    /// # Panics
    ///
    /// Panics if called before stage 1 has run — every caller in this
    /// crate only reaches for it after `run_sync_stages` succeeds.
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        self.envelope.as_ref().expect("stage 1 always fills envelope")
    }

    /// The resolved tool declaration.
    ///
    /// # Panics
    ///
    /// Panics if called before stage 2 has run.
    #[must_use]
    pub fn tool(&self) -> &ToolDeclaration {
        self.tool.as_ref().expect("stage 2 always fills tool on success")
    }
}
