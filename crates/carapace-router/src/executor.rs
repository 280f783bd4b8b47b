// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage 6 — Dispatch. Invokes the resolved handler under a timeout
//! and a response-size cap, discriminating a typed [`HandlerFailure`]
//! from any other failure so internals never cross the trust boundary.

use std::sync::Arc;
use std::time::Duration;

use carapace_core::Envelope;
use carapace_error::{ErrorCode, ErrorPayload};
use serde_json::Value;

use crate::handler::ToolHandler;

/// Stage 6 tunables.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Deadline for a single handler invocation.
    pub handler_timeout: Duration,
    /// Maximum serialized size of a successful handler result.
    pub response_size_cap_bytes: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            response_size_cap_bytes: 1024 * 1024,
        }
    }
}

/// Invoke `handler` for `envelope`, enforcing `config`'s timeout and
/// size cap. `correlation`/`group` are carried on every log line so a
/// request's stage 6 outcome can be reconstructed from logs alone.
///
/// # Errors
///
/// Returns a [`ErrorPayload`] with code [`ErrorCode::PluginTimeout`] on
/// timeout, the handler's own code (or `HANDLER_ERROR` if it collided
/// with a reserved code) on a typed [`carapace_error::ToolError`],
/// `PLUGIN_ERROR` with a fixed message on any other failure, or
/// `HANDLER_ERROR` if the result exceeds the size cap.
pub async fn dispatch(
    envelope: &Envelope,
    handler: Arc<dyn ToolHandler>,
    config: &ExecutorConfig,
    correlation: &str,
    group: &str,
) -> Result<Value, ErrorPayload> {
    let outcome = tokio::time::timeout(config.handler_timeout, handler.invoke(envelope)).await;

    let result = match outcome {
        Err(_elapsed) => {
            tracing::warn!(correlation = %correlation, group = %group, stage = 6, outcome = "rejected", code = "PLUGIN_TIMEOUT", "handler timed out");
            return Err(ErrorPayload::reserved(
                ErrorCode::PluginTimeout,
                "handler did not respond within the configured timeout",
                6,
            ));
        }
        Ok(Err(failure)) => {
            let payload = failure.into_payload(6);
            tracing::warn!(correlation = %correlation, group = %group, stage = 6, outcome = "error", code = %payload.code, "handler failed");
            return Err(payload);
        }
        Ok(Ok(value)) => value,
    };

    let size = serde_json::to_vec(&result)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(u64::MAX);
    if size > config.response_size_cap_bytes {
        tracing::warn!(correlation = %correlation, group = %group, stage = 6, outcome = "rejected", code = "HANDLER_ERROR", "handler response exceeded size cap");
        return Err(ErrorPayload::reserved(
            ErrorCode::HandlerError,
            format!(
                "handler response of {size} bytes exceeds the {}-byte cap",
                config.response_size_cap_bytes
            ),
            6,
        ));
    }

    tracing::debug!(correlation = %correlation, group = %group, stage = 6, outcome = "dispatched");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carapace_error::{HandlerFailure, ToolError};
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl ToolHandler for Slow {
        async fn invoke(&self, _envelope: &Envelope) -> Result<Value, HandlerFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("timeout fires first");
        }
    }

    struct Failing;

    #[async_trait]
    impl ToolHandler for Failing {
        async fn invoke(&self, _envelope: &Envelope) -> Result<Value, HandlerFailure> {
            Err(ToolError::new("NOT_FOUND", "no such record").into())
        }
    }

    struct Panicky;

    #[async_trait]
    impl ToolHandler for Panicky {
        async fn invoke(&self, _envelope: &Envelope) -> Result<Value, HandlerFailure> {
            Err(HandlerFailure::Other(Box::new(std::io::Error::other("disk on fire"))))
        }
    }

    struct TooBig;

    #[async_trait]
    impl ToolHandler for TooBig {
        async fn invoke(&self, _envelope: &Envelope) -> Result<Value, HandlerFailure> {
            Ok(json!({ "blob": "x".repeat(64) }))
        }
    }

    fn request_envelope() -> Envelope {
        Envelope::new_request("tool.invoke.echo", "c1", "container-a", "group-a", serde_json::Map::new())
    }

    #[tokio::test(start_paused = true)]
    async fn handler_exceeding_timeout_yields_plugin_timeout() {
        let config = ExecutorConfig { handler_timeout: Duration::from_millis(10), ..Default::default() };
        let envelope = request_envelope();
        let handle = tokio::spawn(async move { dispatch(&envelope, Arc::new(Slow), &config, "c1", "group-a").await });
        tokio::time::advance(Duration::from_millis(20)).await;
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, "PLUGIN_TIMEOUT");
        assert!(err.retriable);
    }

    #[tokio::test]
    async fn typed_tool_error_passes_through() {
        let config = ExecutorConfig::default();
        let envelope = request_envelope();
        let err = dispatch(&envelope, Arc::new(Failing), &config, "c1", "group-a").await.unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "no such record");
    }

    #[tokio::test]
    async fn opaque_failure_never_leaks_internals() {
        let config = ExecutorConfig::default();
        let envelope = request_envelope();
        let err = dispatch(&envelope, Arc::new(Panicky), &config, "c1", "group-a").await.unwrap_err();
        assert_eq!(err.code, "PLUGIN_ERROR");
        assert!(!err.message.contains("disk"));
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let config = ExecutorConfig { response_size_cap_bytes: 8, ..Default::default() };
        let envelope = request_envelope();
        let err = dispatch(&envelope, Arc::new(TooBig), &config, "c1", "group-a").await.unwrap_err();
        assert_eq!(err.code, "HANDLER_ERROR");
        assert!(!err.retriable);
    }
}
