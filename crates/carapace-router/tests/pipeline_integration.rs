// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end integration tests driving the full six-stage pipeline
//! through a [`RequestRouter`] over the in-memory transport fake — no
//! network sockets, per the transport crate's fake-as-production-harness
//! design.

use std::sync::Arc;

use async_trait::async_trait;
use carapace_audit::AuditLog;
use carapace_catalog::ToolCatalog;
use carapace_confirm::ConfirmationGate;
use carapace_core::{Envelope, RiskLevel, ToolDeclaration};
use carapace_error::HandlerFailure;
use carapace_ratelimit::{RateLimitConfig, RateLimiter};
use carapace_router::{AuthorizationPolicy, ExecutorConfig, HandlerRegistry, PreApprovals, RequestRouter, ToolHandler};
use carapace_session::SessionManager;
use carapace_transport::fake::FakeRouter;
use carapace_transport::{Dealer, Router as TransportRouter};
use serde_json::{json, Value};

struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    async fn invoke(&self, envelope: &Envelope) -> Result<Value, HandlerFailure> {
        let Envelope::Request { payload, .. } = envelope else {
            panic!("expected Request");
        };
        Ok(json!({ "echoed": payload.arguments }))
    }
}

fn deploy_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "deploy".into(),
        description: "Deploys a build, but only once confirmed".into(),
        risk_level: RiskLevel::High,
        arguments_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["target"],
            "properties": { "target": { "type": "string" } }
        }),
    }
}

struct Harness {
    router: Arc<RequestRouter>,
    pre_approvals: Arc<PreApprovals>,
}

fn build_harness(transport: Arc<FakeRouter>, base_path: &std::path::Path) -> Harness {
    let mut catalog = ToolCatalog::new();
    catalog.register(deploy_tool()).unwrap();

    let mut handlers = HandlerRegistry::new();
    handlers.register("deploy", Arc::new(Echo));

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
    let confirmations = ConfirmationGate::new();
    let sessions = Arc::new(SessionManager::new(Arc::clone(&rate_limiter), confirmations));
    sessions.create_session("group-a", "container-a", "container-a").unwrap();

    let audit = Arc::new(AuditLog::open(base_path).unwrap());
    let pre_approvals = Arc::new(PreApprovals::new());

    let router = Arc::new(RequestRouter::new(
        transport,
        sessions,
        Arc::new(catalog),
        Arc::new(handlers),
        Arc::new(AuthorizationPolicy::new()),
        rate_limiter,
        Arc::clone(&pre_approvals),
        audit,
        ExecutorConfig::default(),
    ));

    Harness { router, pre_approvals }
}

#[tokio::test]
async fn high_risk_tool_is_rejected_without_pre_approval_then_dispatched_once_approved() {
    let transport = Arc::new(FakeRouter::new());
    let dealer = transport.connect_dealer(b"container-a".to_vec());
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(Arc::clone(&transport), dir.path());

    let run_handle = tokio::spawn(Arc::clone(&harness.router).run());

    dealer
        .send(
            serde_json::to_vec(&json!({"topic": "tool.invoke.deploy", "correlation": "c1", "arguments": {"target": "prod"}}))
                .unwrap(),
        )
        .await
        .unwrap();
    let first: Value = serde_json::from_slice(&dealer.recv().await.unwrap()).unwrap();
    assert_eq!(first["payload"]["error"]["code"], "CONFIRMATION_TIMEOUT");
    assert_eq!(first["payload"]["error"]["stage"], 5);

    harness.pre_approvals.approve("c2");
    dealer
        .send(
            serde_json::to_vec(&json!({"topic": "tool.invoke.deploy", "correlation": "c2", "arguments": {"target": "prod"}}))
                .unwrap(),
        )
        .await
        .unwrap();
    let second: Value = serde_json::from_slice(&dealer.recv().await.unwrap()).unwrap();
    assert!(second["payload"]["error"].is_null());
    assert_eq!(second["payload"]["result"]["echoed"]["target"], "prod");

    run_handle.abort();
}

#[tokio::test]
async fn stage2_through_stage4_rejections_surface_with_their_own_stage_numbers() {
    let transport = Arc::new(FakeRouter::new());
    let dealer = transport.connect_dealer(b"container-a".to_vec());
    let dir = tempfile::tempdir().unwrap();
    let harness = build_harness(Arc::clone(&transport), dir.path());

    let run_handle = tokio::spawn(Arc::clone(&harness.router).run());

    dealer
        .send(serde_json::to_vec(&json!({"topic": "tool.invoke.nonexistent", "correlation": "c1", "arguments": {}})).unwrap())
        .await
        .unwrap();
    let response: Value = serde_json::from_slice(&dealer.recv().await.unwrap()).unwrap();
    assert_eq!(response["payload"]["error"]["code"], "UNKNOWN_TOOL");
    assert_eq!(response["payload"]["error"]["stage"], 2);

    run_handle.abort();
}
