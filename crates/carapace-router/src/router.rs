// SPDX-License-Identifier: MIT OR Apache-2.0
//! The request dispatcher (spec §4.10): receives wire frames, resolves
//! the session, runs the pipeline, writes audit entries, and sends the
//! response. Never blocks the accept loop on handler latency — each
//! request is dispatched onto its own task.

use std::sync::Arc;
use std::time::Instant;

use carapace_audit::{AuditEntryDraft, AuditLog};
use carapace_catalog::ToolCatalog;
use carapace_core::{AuditOutcome, Envelope};
use carapace_error::{ErrorCode, ErrorPayload, PipelineRejection};
use carapace_protocol::{decode_wire_message, EnvelopeCodec};
use carapace_ratelimit::RateLimiter;
use carapace_session::SessionManager;
use carapace_transport::Router as TransportRouter;

use crate::context::PipelineContext;
use crate::executor::{self, ExecutorConfig};
use crate::handler::HandlerRegistry;
use crate::pipeline::{run_sync_stages, PipelineDeps};
use crate::policy::{AuthorizationPolicy, PreApprovals};

/// Wires the whole request-processing engine together over a single
/// ROUTER transport socket.
pub struct RequestRouter {
    transport: Arc<dyn TransportRouter>,
    sessions: Arc<SessionManager>,
    catalog: Arc<ToolCatalog>,
    handlers: Arc<HandlerRegistry>,
    policy: Arc<AuthorizationPolicy>,
    rate_limiter: Arc<RateLimiter>,
    pre_approvals: Arc<PreApprovals>,
    audit: Arc<AuditLog>,
    executor_config: ExecutorConfig,
}

impl RequestRouter {
    /// Build a router over already-constructed collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn TransportRouter>,
        sessions: Arc<SessionManager>,
        catalog: Arc<ToolCatalog>,
        handlers: Arc<HandlerRegistry>,
        policy: Arc<AuthorizationPolicy>,
        rate_limiter: Arc<RateLimiter>,
        pre_approvals: Arc<PreApprovals>,
        audit: Arc<AuditLog>,
        executor_config: ExecutorConfig,
    ) -> Self {
        Self {
            transport,
            sessions,
            catalog,
            handlers,
            policy,
            rate_limiter,
            pre_approvals,
            audit,
            executor_config,
        }
    }

    /// Run the accept loop until the transport errors out (e.g. on
    /// shutdown). Each received frame is dispatched onto its own task so
    /// a slow handler never delays the next request's acceptance.
    ///
    /// # Errors
    ///
    /// Returns the transport's error once `recv` fails.
    pub async fn run(self: Arc<Self>) -> Result<(), carapace_transport::TransportError> {
        loop {
            let (identity, payload) = self.transport.recv().await?;
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.handle_one(identity, payload).await;
            });
        }
    }

    async fn handle_one(&self, identity: Vec<u8>, payload: Vec<u8>) {
        let started = Instant::now();
        let response = self.process(&identity, payload).await;
        let Some(response) = response else { return };

        let (topic, source, correlation, group, had_error) = match &response {
            Envelope::Response { topic, source, correlation, group, payload, .. } => {
                (topic.clone(), source.clone(), correlation.clone(), group.clone(), payload.error.is_some())
            }
            _ => (String::new(), String::new(), String::new(), String::new(), false),
        };
        tracing::info!(
            correlation = %correlation,
            group = %group,
            latency_ms = started.elapsed().as_millis() as u64,
            outcome = if had_error { "error" } else { "ok" },
            "request completed"
        );

        let encoded = match EnvelopeCodec::encode(&response) {
            Ok(line) => line.into_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode response envelope");
                return;
            }
        };

        if let Err(e) = self.transport.send(identity, encoded).await {
            tracing::warn!(error = %e, correlation = %correlation, group = %group, "failed to send response");
            let error = ErrorPayload::pre_pipeline(ErrorCode::HandlerError, format!("transport send failed: {e}"));
            let _ = self.record(&group, &source, &topic, &correlation, AuditOutcome::Error, &error);
        }
    }

    /// Run one request end-to-end, returning the response envelope to
    /// send back, or `None` if no response can be attributed (e.g. the
    /// transport identity carries no live session).
    async fn process(&self, identity: &[u8], payload: Vec<u8>) -> Option<Envelope> {
        let container_id = String::from_utf8_lossy(identity).into_owned();

        let raw = match std::str::from_utf8(&payload) {
            Ok(s) => s,
            Err(_) => {
                let error = ErrorPayload::pre_pipeline(ErrorCode::ValidationFailed, "wire message was not valid UTF-8");
                return Some(Envelope::response_error_raw("", "", container_id, "", error));
            }
        };

        let wire = match decode_wire_message(raw) {
            Ok(w) => w,
            Err(e) => {
                let error = ErrorPayload::pre_pipeline(ErrorCode::ValidationFailed, e.to_string());
                return Some(Envelope::response_error_raw("", "", container_id, "", error));
            }
        };

        let Some(session) = self.sessions.get(&container_id) else {
            let error = ErrorPayload::pre_pipeline(
                ErrorCode::Unauthorized,
                format!("no live session for container `{container_id}`"),
            );
            return Some(Envelope::response_error_raw(wire.topic, wire.correlation, container_id, "", error));
        };

        let topic = wire.topic.clone();
        let correlation = wire.correlation.clone();
        let group = session.group.clone();
        let source = session.source.clone();

        let deps = PipelineDeps {
            catalog: &self.catalog,
            policy: &self.policy,
            rate_limiter: &self.rate_limiter,
            pre_approvals: &self.pre_approvals,
        };
        let context = PipelineContext::new(wire, session);

        let context = match run_sync_stages(context, &deps) {
            Ok(context) => context,
            Err(rejection) => {
                let error = rejection.into_payload();
                let error = self.record(&group, &source, &topic, &correlation, AuditOutcome::Rejected, &error);
                return Some(Envelope::response_error_raw(topic, correlation, source, group, error));
            }
        };

        Some(self.dispatch_and_respond(context, &group, &source, &topic, &correlation).await)
    }

    async fn dispatch_and_respond(
        &self,
        context: PipelineContext,
        group: &str,
        source: &str,
        topic: &str,
        correlation: &str,
    ) -> Envelope {
        let tool_name = context.tool().name.clone();

        let Some(handler) = self.handlers.get(&tool_name) else {
            let error = PipelineRejection::new(
                ErrorCode::HandlerError,
                6,
                format!("tool `{tool_name}` is registered but has no bound handler"),
            )
            .into_payload();
            let error = self.record(group, source, topic, correlation, AuditOutcome::Error, &error);
            return Envelope::response_error_raw(topic, correlation, source, group, error);
        };

        match executor::dispatch(context.envelope(), handler, &self.executor_config, correlation, group).await {
            Err(error) => {
                let error = self.record(group, source, topic, correlation, AuditOutcome::Error, &error);
                Envelope::response_error_raw(topic, correlation, source, group, error)
            }
            Ok(result) => {
                let (sanitized, field_paths) = carapace_sanitizer::sanitize_value(&result);
                if self.audit_ok(group, source, topic, correlation, &field_paths) {
                    Envelope::response_success(context.envelope(), sanitized)
                } else {
                    let error = ErrorPayload::reserved(
                        ErrorCode::HandlerError,
                        "audit log write failed, request treated as fatal",
                        6,
                    );
                    Envelope::response_error_raw(topic, correlation, source, group, error)
                }
            }
        }
    }

    /// Write a rejection/error audit entry for `error`. Per spec §7, an
    /// audit-log write failure is itself treated as fatal for the
    /// request: the returned `ErrorPayload` is `error` unchanged on a
    /// successful write, or a non-retriable `HANDLER_ERROR` (at the same
    /// stage) if the write itself failed — callers must use the
    /// returned payload, not the one passed in, when building the
    /// response envelope.
    #[must_use]
    fn record(&self, group: &str, source: &str, topic: &str, correlation: &str, outcome: AuditOutcome, error: &ErrorPayload) -> ErrorPayload {
        let draft = AuditEntryDraft {
            group: group.to_string(),
            source: source.to_string(),
            topic: topic.to_string(),
            correlation: correlation.to_string(),
            stage: error.stage.unwrap_or(0),
            outcome,
            reason: Some(error.message.clone()),
            field_paths: None,
            error: Some(error.clone()),
        };
        match self.audit.append(draft) {
            Ok(()) => error.clone(),
            Err(e) => {
                tracing::warn!(error = %e, correlation = %correlation, group = %group, "failed to write audit entry, treating request as fatal");
                ErrorPayload::reserved(
                    ErrorCode::HandlerError,
                    "audit log write failed, request treated as fatal",
                    error.stage.unwrap_or(6),
                )
            }
        }
    }

    /// Write the `Routed`/`Sanitized` audit entries for a successful
    /// dispatch. Returns `false` if either append failed — per spec §7
    /// an audit-log failure is fatal for the request, so the caller must
    /// turn the response into a `HANDLER_ERROR` rather than return the
    /// success payload.
    #[must_use]
    fn audit_ok(&self, group: &str, source: &str, topic: &str, correlation: &str, field_paths: &[String]) -> bool {
        let routed = AuditEntryDraft {
            group: group.to_string(),
            source: source.to_string(),
            topic: topic.to_string(),
            correlation: correlation.to_string(),
            stage: 6,
            outcome: AuditOutcome::Routed,
            reason: None,
            field_paths: None,
            error: None,
        };
        if let Err(e) = self.audit.append(routed) {
            tracing::warn!(error = %e, correlation = %correlation, group = %group, "failed to write audit entry, treating request as fatal");
            return false;
        }

        if !field_paths.is_empty() {
            let sanitized = AuditEntryDraft {
                group: group.to_string(),
                source: source.to_string(),
                topic: topic.to_string(),
                correlation: correlation.to_string(),
                stage: 6,
                outcome: AuditOutcome::Sanitized,
                reason: None,
                field_paths: Some(field_paths.to_vec()),
                error: None,
            };
            if let Err(e) = self.audit.append(sanitized) {
                tracing::warn!(error = %e, correlation = %correlation, group = %group, "failed to write audit entry, treating request as fatal");
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ToolHandler;
    use async_trait::async_trait;
    use carapace_confirm::ConfirmationGate;
    use carapace_core::{RiskLevel, ToolDeclaration};
    use carapace_ratelimit::RateLimitConfig;
    use carapace_transport::fake::FakeRouter;
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(&self, envelope: &Envelope) -> Result<Value, carapace_error::HandlerFailure> {
            let Envelope::Request { payload, .. } = envelope else {
                panic!("expected Request");
            };
            Ok(json!({ "echoed": payload.arguments }))
        }
    }

    fn echo_tool() -> ToolDeclaration {
        ToolDeclaration {
            name: "echo".into(),
            description: "Echoes text back".into(),
            risk_level: RiskLevel::Low,
            arguments_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["text"],
                "properties": { "text": { "type": "string" } }
            }),
        }
    }

    fn build_router(transport: Arc<dyn TransportRouter>, base_path: &std::path::Path) -> Arc<RequestRouter> {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool()).unwrap();

        let mut handlers = HandlerRegistry::new();
        handlers.register("echo", Arc::new(Echo));

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let confirmations = ConfirmationGate::new();
        let sessions = Arc::new(SessionManager::new(Arc::clone(&rate_limiter), confirmations));
        sessions.create_session("group-a", "container-a", "container-a").unwrap();

        let audit = Arc::new(AuditLog::open(base_path).unwrap());

        Arc::new(RequestRouter::new(
            transport,
            sessions,
            Arc::new(catalog),
            Arc::new(handlers),
            Arc::new(AuthorizationPolicy::new()),
            rate_limiter,
            Arc::new(PreApprovals::new()),
            audit,
            ExecutorConfig::default(),
        ))
    }

    #[tokio::test]
    async fn routes_a_conforming_request_end_to_end() {
        let transport = Arc::new(FakeRouter::new());
        let dealer = transport.connect_dealer(b"container-a".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(transport, dir.path());

        let run_handle = tokio::spawn(Arc::clone(&router).run());

        dealer
            .send(serde_json::to_vec(&json!({"topic": "tool.invoke.echo", "correlation": "c1", "arguments": {"text": "hi"}})).unwrap())
            .await
            .unwrap();

        let response_bytes = dealer.recv().await.unwrap();
        let response: Value = serde_json::from_slice(&response_bytes).unwrap();
        assert_eq!(response["type"], "response");
        assert_eq!(response["correlation"], "c1");
        assert_eq!(response["payload"]["result"]["echoed"]["text"], "hi");
        assert!(response["payload"]["error"].is_null());

        run_handle.abort();
    }

    #[tokio::test]
    async fn rejects_requests_from_unknown_containers() {
        let transport = Arc::new(FakeRouter::new());
        let dealer = transport.connect_dealer(b"ghost-container".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(transport, dir.path());

        let run_handle = tokio::spawn(Arc::clone(&router).run());

        dealer
            .send(serde_json::to_vec(&json!({"topic": "tool.invoke.echo", "correlation": "c1", "arguments": {"text": "hi"}})).unwrap())
            .await
            .unwrap();

        let response_bytes = dealer.recv().await.unwrap();
        let response: Value = serde_json::from_slice(&response_bytes).unwrap();
        assert_eq!(response["payload"]["error"]["code"], "UNAUTHORIZED");

        run_handle.abort();
    }

    #[tokio::test]
    async fn rejects_prototype_pollution_keys_before_pipeline_sees_them() {
        let transport = Arc::new(FakeRouter::new());
        let dealer = transport.connect_dealer(b"container-a".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(transport, dir.path());

        let run_handle = tokio::spawn(Arc::clone(&router).run());

        dealer
            .send(
                serde_json::to_vec(&json!({
                    "topic": "tool.invoke.echo",
                    "correlation": "c1",
                    "arguments": {"text": "hi", "__proto__": {"polluted": true}}
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        let response_bytes = dealer.recv().await.unwrap();
        let response: Value = serde_json::from_slice(&response_bytes).unwrap();
        assert_eq!(response["payload"]["error"]["code"], "VALIDATION_FAILED");
        assert!(response["payload"]["error"]["stage"].is_null());

        run_handle.abort();
    }
}
