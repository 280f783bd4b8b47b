// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit entries — the durable record of every pipeline decision.

use serde::{Deserialize, Serialize};

use carapace_error::ErrorPayload;

/// What happened to a request at a given pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Passed every stage and was dispatched to a handler.
    Routed,
    /// Short-circuited at some stage before dispatch.
    Rejected,
    /// Dispatched, but the result was redacted before returning.
    Sanitized,
    /// Handler execution failed.
    Error,
}

/// One line of the append-only audit log.
///
/// `seq` is monotonic per `group` and is the tamper-evidence mechanism:
/// a gap in the sequence across consecutive lines means a line was
/// dropped or the file was tampered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic, per-group sequence number starting at 1.
    pub seq: u64,
    /// Entry construction time, UTC, RFC 3339.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Authorization tenant this entry belongs to; also the log file key.
    pub group: String,
    /// Container identity that raised the request.
    pub source: String,
    /// Wire topic of the request.
    pub topic: String,
    /// Correlation id, pairing this entry with its request/response.
    pub correlation: String,
    /// Which pipeline stage produced this entry (1-6).
    pub stage: u8,
    /// The outcome this entry records.
    pub outcome: AuditOutcome,
    /// Human-readable reason, present on `Rejected`/`Sanitized` outcomes.
    /// Sanitized before being written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// JSON-path-style locations redacted by the sanitizer, present on
    /// `Sanitized` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_paths: Option<Vec<String>>,
    /// Structured error, present on `Rejected`/`Error` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl AuditEntry {
    /// Serialize as a single compact JSON line, without a trailing
    /// newline — the caller appends the line terminator.
    ///
    /// # Errors
    ///
    /// Returns an error only if `self` somehow contains non-finite
    /// floats or other values `serde_json` cannot represent; in
    /// practice this never happens for the fields above.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a single JSONL line back into an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `line` is not valid JSON or does not match
    /// the entry shape.
    pub fn from_jsonl(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrips_through_jsonl() {
        let entry = AuditEntry {
            seq: 1,
            timestamp: chrono::Utc::now(),
            group: "group-a".into(),
            source: "container-a".into(),
            topic: "tool.invoke.echo".into(),
            correlation: "c1".into(),
            stage: 6,
            outcome: AuditOutcome::Routed,
            reason: None,
            field_paths: None,
            error: None,
        };
        let line = entry.to_jsonl().unwrap();
        assert!(!line.contains('\n'));
        let parsed = AuditEntry::from_jsonl(&line).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let entry = AuditEntry {
            seq: 1,
            timestamp: chrono::Utc::now(),
            group: "group-a".into(),
            source: "container-a".into(),
            topic: "tool.invoke.echo".into(),
            correlation: "c1".into(),
            stage: 6,
            outcome: AuditOutcome::Routed,
            reason: None,
            field_paths: None,
            error: None,
        };
        let line = entry.to_jsonl().unwrap();
        assert!(!line.contains("reason"));
        assert!(!line.contains("field_paths"));
        assert!(!line.contains("\"error\""));
    }
}
