// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared domain types that flow through every stage of the request
//! pipeline: wire messages, envelopes, tool declarations, sessions, and
//! audit entries.

pub mod audit;
pub mod envelope;
pub mod session;
pub mod tool;
pub mod wire;

pub use audit::{AuditEntry, AuditOutcome};
pub use envelope::{Envelope, RequestPayload, ResponsePayload, PROTOCOL_VERSION};
pub use session::Session;
pub use tool::{RiskLevel, ToolDeclaration};
pub use wire::WireMessage;
