// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Unified error taxonomy for Carapace's request-processing engine.
//!
//! Every rejection the pipeline or handler executor produces carries a
//! stable [`ErrorCode`] plus enough structure ([`ErrorPayload`]) to cross
//! the trust boundary into a `ResponseEnvelope` without leaking internals.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// The reserved pipeline error codes.
///
/// These are the only codes the pipeline and handler executor may emit.
/// A plugin handler attempting to emit one of these codes directly (via a
/// typed tool error) is normalized to [`ErrorCode::HandlerError`], with its
/// original message preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Stage 3: arguments failed schema validation.
    ValidationFailed,
    /// Stage 2: `wire.topic` does not resolve to a registered tool.
    UnknownTool,
    /// Stage 4: session's group is not authorized for the tool.
    Unauthorized,
    /// Stage 4: the session's rate-limit bucket is exhausted.
    RateLimited,
    /// Stage 5: a high-risk tool has no pre-approval and confirmation
    /// did not resolve within the deadline.
    ConfirmationTimeout,
    /// Stage 6: the handler did not respond within the configured timeout.
    PluginTimeout,
    /// Stage 6: the handler raised an error that was not a recognised
    /// [`ToolError`] — internals are never forwarded.
    PluginError,
    /// Stage 6: the handler's response failed post-dispatch checks (size
    /// limit) or raised a [`ToolError`] whose code collided with a
    /// reserved pipeline code.
    HandlerError,
}

/// All reserved codes, in the fixed order used for `is_reserved` lookups.
const RESERVED: &[ErrorCode] = &[
    ErrorCode::ValidationFailed,
    ErrorCode::UnknownTool,
    ErrorCode::Unauthorized,
    ErrorCode::RateLimited,
    ErrorCode::ConfirmationTimeout,
    ErrorCode::PluginTimeout,
    ErrorCode::PluginError,
    ErrorCode::HandlerError,
];

impl ErrorCode {
    /// Stable wire representation, e.g. `"VALIDATION_FAILED"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::UnknownTool => "UNKNOWN_TOOL",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::ConfirmationTimeout => "CONFIRMATION_TIMEOUT",
            Self::PluginTimeout => "PLUGIN_TIMEOUT",
            Self::PluginError => "PLUGIN_ERROR",
            Self::HandlerError => "HANDLER_ERROR",
        }
    }

    /// Default retriable-ness for this code, per the §4.12 taxonomy.
    ///
    /// `RATE_LIMITED`, `CONFIRMATION_TIMEOUT`, and `PLUGIN_TIMEOUT` are
    /// retriable; every other reserved code is not.
    #[must_use]
    pub fn default_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ConfirmationTimeout | Self::PluginTimeout
        )
    }

    /// Returns `true` if `code` (an arbitrary wire string) names one of the
    /// reserved pipeline codes, case-sensitively.
    #[must_use]
    pub fn is_reserved(code: &str) -> bool {
        RESERVED.iter().any(|c| c.as_str() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorPayload
// ---------------------------------------------------------------------------

/// The wire shape of an error, carried in `ResponseEnvelope.payload.error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code. Either a reserved [`ErrorCode`] or a
    /// plugin-chosen code for a passthrough [`ToolError`].
    pub code: String,
    /// Human-readable description. Never contains internals (stack traces,
    /// raw exception text) for anything but a passthrough `ToolError`.
    pub message: String,
    /// Whether the same request may succeed if retried later.
    pub retriable: bool,
    /// First offending property path, set by stage 3 validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Advisory seconds until retry, set for `RATE_LIMITED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// 1-based pipeline stage that produced this error, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<u8>,
}

impl ErrorPayload {
    /// Build a payload for a reserved pipeline rejection.
    #[must_use]
    pub fn reserved(code: ErrorCode, message: impl Into<String>, stage: u8) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            retriable: code.default_retriable(),
            field: None,
            retry_after: None,
            stage: Some(stage),
        }
    }

    /// Build a payload for a rejection raised before stage 1 runs (wire
    /// decode failure, missing session). Stage 1 cannot fail, so these
    /// carry no `stage` at all rather than a misleading `Some(1)`.
    #[must_use]
    pub fn pre_pipeline(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            retriable: code.default_retriable(),
            field: None,
            retry_after: None,
            stage: None,
        }
    }

    /// Attach a `field` path (stage 3 validation failures).
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach a `retry_after` hint in whole seconds.
    #[must_use]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

// ---------------------------------------------------------------------------
// PipelineRejection
// ---------------------------------------------------------------------------

/// A terminal rejection produced by pipeline stages 1–6.
///
/// Every field mirrors the [`ErrorPayload`] it will become, plus the
/// 1-based `stage` that raised it — stamped onto `ErrorPayload.stage` by
/// [`PipelineRejection::into_payload`] so `error.stage` is always exactly
/// the rejecting stage, per the testable property in §8.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRejection {
    /// Reserved error code for this rejection.
    pub code: ErrorCode,
    /// 1-based stage index that produced the rejection.
    pub stage: u8,
    /// Whether the request may succeed if retried.
    pub retriable: bool,
    /// Human-readable summary.
    pub message: String,
    /// First offending argument path, for `VALIDATION_FAILED`.
    pub field: Option<String>,
    /// Advisory retry delay in seconds, for `RATE_LIMITED`.
    pub retry_after: Option<u64>,
}

impl PipelineRejection {
    /// Construct a rejection using the code's default retriable-ness.
    #[must_use]
    pub fn new(code: ErrorCode, stage: u8, message: impl Into<String>) -> Self {
        Self {
            retriable: code.default_retriable(),
            code,
            stage,
            message: message.into(),
            field: None,
            retry_after: None,
        }
    }

    /// Attach an offending field path.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach a retry-after hint in whole seconds.
    #[must_use]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    /// Convert into the wire [`ErrorPayload`].
    #[must_use]
    pub fn into_payload(self) -> ErrorPayload {
        ErrorPayload {
            code: self.code.as_str().to_string(),
            message: self.message,
            retriable: self.retriable,
            field: self.field,
            retry_after: self.retry_after,
            stage: Some(self.stage),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolError / HandlerFailure
// ---------------------------------------------------------------------------

/// A structured error a plugin handler may return.
///
/// Handlers are expected to raise this (rather than an opaque error) when
/// they can describe the failure; fields pass through to the response
/// after sanitization, unless `code` collides with a reserved pipeline
/// code, in which case it is normalized to `HANDLER_ERROR`.
#[derive(Debug, Clone)]
pub struct ToolError {
    /// Plugin-chosen machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the request may succeed if retried.
    pub retriable: bool,
    /// Optional offending argument path.
    pub field: Option<String>,
    /// Optional advisory retry delay in seconds.
    pub retry_after: Option<u64>,
}

impl ToolError {
    /// Construct a non-retriable tool error with the given code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retriable: false,
            field: None,
            retry_after: None,
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

/// What a handler invocation failed with, before the executor normalizes it.
///
/// See [crate-level docs](crate) for the discrimination policy: a `Tool`
/// failure passes through (sanitized, and normalized to `HANDLER_ERROR` if
/// its code collides with a reserved one); anything else becomes a fixed,
/// non-leaking `PLUGIN_ERROR`.
#[derive(Debug)]
pub enum HandlerFailure {
    /// A structured, plugin-authored error.
    Tool(ToolError),
    /// Any other error — internals must never cross the boundary.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool(e) => write!(f, "{e}"),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HandlerFailure {}

impl From<ToolError> for HandlerFailure {
    fn from(e: ToolError) -> Self {
        Self::Tool(e)
    }
}

/// Fixed message surfaced for any non-`ToolError` handler failure.
/// Stack traces and exception text never cross the boundary.
pub const GENERIC_PLUGIN_ERROR_MESSAGE: &str = "Plugin handler encountered an internal error";

impl HandlerFailure {
    /// Normalize this failure into an [`ErrorPayload`] per the executor's
    /// discrimination policy.
    #[must_use]
    pub fn into_payload(self, stage: u8) -> ErrorPayload {
        match self {
            Self::Tool(e) => {
                if ErrorCode::is_reserved(&e.code) {
                    ErrorPayload {
                        code: ErrorCode::HandlerError.as_str().to_string(),
                        message: e.message,
                        retriable: false,
                        field: e.field,
                        retry_after: e.retry_after,
                        stage: Some(stage),
                    }
                } else {
                    ErrorPayload {
                        code: e.code,
                        message: e.message,
                        retriable: e.retriable,
                        field: e.field,
                        retry_after: e.retry_after,
                        stage: Some(stage),
                    }
                }
            }
            Self::Other(_) => ErrorPayload {
                code: ErrorCode::PluginError.as_str().to_string(),
                message: GENERIC_PLUGIN_ERROR_MESSAGE.to_string(),
                retriable: false,
                field: None,
                retry_after: None,
                stage: Some(stage),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_codes_roundtrip_as_str() {
        for code in RESERVED {
            assert!(ErrorCode::is_reserved(code.as_str()));
        }
        assert!(!ErrorCode::is_reserved("NOT_FOUND"));
    }

    #[test]
    fn rate_limited_and_confirmation_timeout_are_retriable() {
        assert!(ErrorCode::RateLimited.default_retriable());
        assert!(ErrorCode::ConfirmationTimeout.default_retriable());
        assert!(ErrorCode::PluginTimeout.default_retriable());
        assert!(!ErrorCode::UnknownTool.default_retriable());
        assert!(!ErrorCode::ValidationFailed.default_retriable());
    }

    #[test]
    fn pre_pipeline_payload_carries_no_stage() {
        let payload = ErrorPayload::pre_pipeline(ErrorCode::Unauthorized, "no live session");
        assert_eq!(payload.stage, None);
        assert_eq!(payload.code, "UNAUTHORIZED");
    }

    #[test]
    fn rejection_stamps_stage_onto_payload() {
        let rejection = PipelineRejection::new(ErrorCode::UnknownTool, 2, "no such tool");
        let payload = rejection.into_payload();
        assert_eq!(payload.stage, Some(2));
        assert_eq!(payload.code, "UNKNOWN_TOOL");
        assert!(!payload.retriable);
    }

    #[test]
    fn handler_failure_tool_error_passes_through() {
        let err = ToolError::new("NOT_FOUND", "no such record");
        let payload = HandlerFailure::Tool(err).into_payload(6);
        assert_eq!(payload.code, "NOT_FOUND");
        assert_eq!(payload.message, "no such record");
    }

    #[test]
    fn handler_failure_reserved_code_normalizes_to_handler_error() {
        let err = ToolError::new("RATE_LIMITED", "pretend I throttled you");
        let payload = HandlerFailure::Tool(err).into_payload(6);
        assert_eq!(payload.code, "HANDLER_ERROR");
        assert_eq!(payload.message, "pretend I throttled you");
        assert!(!payload.retriable);
    }

    #[test]
    fn handler_failure_other_never_leaks_internals() {
        let err: Box<dyn std::error::Error + Send + Sync> =
            Box::new(std::io::Error::other("/etc/shadow permission denied"));
        let payload = HandlerFailure::Other(err).into_payload(6);
        assert_eq!(payload.code, "PLUGIN_ERROR");
        assert_eq!(payload.message, GENERIC_PLUGIN_ERROR_MESSAGE);
        assert!(!payload.message.contains("shadow"));
    }
}
