// SPDX-License-Identifier: MIT OR Apache-2.0
//! The five synchronous pipeline stages (Construct, Topic, Payload,
//! Authorize+RateLimit, Confirm). Stage 6 (Dispatch) lives in
//! [`crate::executor`] since it is asynchronous.

use carapace_catalog::ToolCatalog;
use carapace_core::{Envelope, RiskLevel, Session, ToolDeclaration, WireMessage};
use carapace_error::{ErrorCode, PipelineRejection};
use carapace_ratelimit::RateLimiter;
use serde_json::Value;

use crate::context::PipelineContext;
use crate::policy::{AuthorizationPolicy, PreApprovals};

/// The stage-spanning dependencies `run_sync_stages` needs. Borrowed,
/// never owned, by the caller on every request.
pub struct PipelineDeps<'a> {
    /// Tool registry and compiled argument validators.
    pub catalog: &'a ToolCatalog,
    /// Per-tool group restrictions.
    pub policy: &'a AuthorizationPolicy,
    /// Per-session token buckets.
    pub rate_limiter: &'a RateLimiter,
    /// Stage 5's out-of-band pre-approval set.
    pub pre_approvals: &'a PreApprovals,
}

/// Stage 1 — Construct. Cannot fail.
#[must_use]
pub fn stage1_construct(wire: &WireMessage, session: &Session) -> Envelope {
    Envelope::new_request(
        wire.topic.clone(),
        wire.correlation.clone(),
        session.source.clone(),
        session.group.clone(),
        wire.arguments.clone(),
    )
}

/// Stage 2 — Topic resolution.
///
/// # Errors
///
/// Returns [`ErrorCode::UnknownTool`] (stage 2) if `topic` does not
/// match `tool.invoke.<name>`, or if `<name>` is not registered.
pub fn stage2_topic(topic: &str, catalog: &ToolCatalog) -> Result<ToolDeclaration, PipelineRejection> {
    let name = topic.strip_prefix("tool.invoke.").ok_or_else(|| {
        PipelineRejection::new(
            ErrorCode::UnknownTool,
            2,
            format!("topic `{topic}` does not match `tool.invoke.<name>`"),
        )
    })?;

    catalog
        .get(name)
        .cloned()
        .ok_or_else(|| PipelineRejection::new(ErrorCode::UnknownTool, 2, format!("unknown tool `{name}`")))
}

/// Stage 3 — Payload validation. Delegates to the catalog's compiled
/// validator, which already stamps stage 3 on failure.
///
/// # Errors
///
/// Returns [`ErrorCode::ValidationFailed`] (stage 3) on schema
/// violation.
pub fn stage3_payload(
    tool_name: &str,
    arguments: &Value,
    catalog: &ToolCatalog,
) -> Result<(), PipelineRejection> {
    catalog.validate_arguments(tool_name, arguments)
}

/// Stage 4 — Authorize, then rate limit.
///
/// Authorization is checked first; a token is only consumed once the
/// session's group is confirmed authorized, so unauthorized requests
/// never burn a token.
///
/// # Errors
///
/// Returns [`ErrorCode::Unauthorized`] if the session's group is not
/// allowed to invoke the tool, or [`ErrorCode::RateLimited`] (with
/// `retry_after`) if the session's bucket is exhausted.
pub fn stage4_authorize_and_rate_limit(
    session: &Session,
    tool: &ToolDeclaration,
    policy: &AuthorizationPolicy,
    rate_limiter: &RateLimiter,
) -> Result<(), PipelineRejection> {
    if !policy.is_authorized(&tool.name, &session.group) {
        return Err(PipelineRejection::new(
            ErrorCode::Unauthorized,
            4,
            format!("group `{}` is not authorized for tool `{}`", session.group, tool.name),
        ));
    }

    let consume = rate_limiter.try_consume(&session.session_id);
    if !consume.allowed {
        let mut rejection = PipelineRejection::new(ErrorCode::RateLimited, 4, "rate limit exceeded");
        if let Some(retry_after) = consume.retry_after {
            rejection = rejection.with_retry_after(retry_after);
        }
        return Err(rejection);
    }

    Ok(())
}

/// Stage 5 — Confirmation. Low-risk tools pass unconditionally;
/// high-risk tools require the request's correlation id to be
/// pre-approved.
///
/// # Errors
///
/// Returns [`ErrorCode::ConfirmationTimeout`] (retriable, stage 5) if
/// the tool is high-risk and no pre-approval is pending.
pub fn stage5_confirm(
    tool: &ToolDeclaration,
    correlation: &str,
    pre_approvals: &PreApprovals,
) -> Result<(), PipelineRejection> {
    if tool.risk_level == RiskLevel::Low {
        return Ok(());
    }
    if pre_approvals.take(correlation) {
        return Ok(());
    }
    Err(PipelineRejection::new(
        ErrorCode::ConfirmationTimeout,
        5,
        format!("tool `{}` requires confirmation and none is pending for this request", tool.name),
    ))
}

/// Run stages 1-5 in order against a fresh `context`, short-circuiting
/// on the first rejection. Every stage's outcome is logged — `debug!`
/// on success, `warn!` on rejection — carrying `correlation`, `group`,
/// `stage`, and `outcome` so a request's path can be reconstructed from
/// logs alone.
///
/// # Errors
///
/// Returns the first stage's [`PipelineRejection`], if any.
pub fn run_sync_stages(
    mut context: PipelineContext,
    deps: &PipelineDeps<'_>,
) -> Result<PipelineContext, PipelineRejection> {
    let correlation = context.wire.correlation.clone();
    let group = context.session.group.clone();

    let envelope = stage1_construct(&context.wire, &context.session);
    context.envelope = Some(envelope);
    tracing::debug!(correlation = %correlation, group = %group, stage = 1, outcome = "constructed");

    let tool = match stage2_topic(context.envelope().topic(), deps.catalog) {
        Ok(tool) => tool,
        Err(rejection) => {
            tracing::warn!(correlation = %correlation, group = %group, stage = 2, outcome = "rejected", code = %rejection.code, "topic resolution rejected");
            return Err(rejection);
        }
    };
    context.tool = Some(tool);
    tracing::debug!(correlation = %correlation, group = %group, stage = 2, outcome = "resolved", tool = %context.tool().name);

    let Envelope::Request { payload, .. } = context.envelope() else {
        unreachable!("stage 1 always constructs a Request envelope");
    };
    let arguments = Value::Object(payload.arguments.clone());
    if let Err(rejection) = stage3_payload(&context.tool().name, &arguments, deps.catalog) {
        tracing::warn!(correlation = %correlation, group = %group, stage = 3, outcome = "rejected", code = %rejection.code, "payload validation rejected");
        return Err(rejection);
    }
    tracing::debug!(correlation = %correlation, group = %group, stage = 3, outcome = "validated");

    if let Err(rejection) = stage4_authorize_and_rate_limit(&context.session, context.tool(), deps.policy, deps.rate_limiter) {
        tracing::warn!(correlation = %correlation, group = %group, stage = 4, outcome = "rejected", code = %rejection.code, "authorize/rate-limit rejected");
        return Err(rejection);
    }
    tracing::debug!(correlation = %correlation, group = %group, stage = 4, outcome = "allowed");

    if let Err(rejection) = stage5_confirm(context.tool(), context.envelope().correlation(), deps.pre_approvals) {
        tracing::warn!(correlation = %correlation, group = %group, stage = 5, outcome = "rejected", code = %rejection.code, "confirmation rejected");
        return Err(rejection);
    }
    tracing::debug!(correlation = %correlation, group = %group, stage = 5, outcome = "confirmed");

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_core::RiskLevel as Risk;
    use carapace_ratelimit::RateLimitConfig;
    use serde_json::json;

    fn echo_tool(risk: Risk) -> ToolDeclaration {
        ToolDeclaration {
            name: "echo".into(),
            description: "Echoes text back".into(),
            risk_level: risk,
            arguments_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["text"],
                "properties": { "text": { "type": "string" } }
            }),
        }
    }

    fn session() -> Session {
        Session::new("sess-1", "container-a", "group-a", "container-a")
    }

    fn wire(topic: &str) -> WireMessage {
        WireMessage {
            topic: topic.to_string(),
            correlation: "corr-1".to_string(),
            arguments: serde_json::Map::from_iter([("text".to_string(), json!("hi"))]),
        }
    }

    #[test]
    fn stage1_cannot_fail_and_stamps_session_identity() {
        let envelope = stage1_construct(&wire("tool.invoke.echo"), &session());
        let Envelope::Request { source, group, .. } = &envelope else {
            panic!("expected Request");
        };
        assert_eq!(source, "container-a");
        assert_eq!(group, "group-a");
    }

    #[test]
    fn stage2_rejects_malformed_topic() {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool(Risk::Low)).unwrap();
        let err = stage2_topic("not-a-tool-topic", &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownTool);
        assert_eq!(err.stage, 2);
    }

    #[test]
    fn stage4_rejects_unauthorized_before_consuming_a_token() {
        let tool = echo_tool(Risk::Low);
        let mut policy = AuthorizationPolicy::new();
        policy.restrict("echo", ["other-group".to_string()]);
        let rate_limiter = RateLimiter::new(RateLimitConfig { requests_per_minute: 60, burst_size: 1 });

        let err = stage4_authorize_and_rate_limit(&session(), &tool, &policy, &rate_limiter).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);

        // The bucket must still be full: a second call from an authorized
        // group should still succeed.
        policy.restrict("echo", ["group-a".to_string()]);
        stage4_authorize_and_rate_limit(&session(), &tool, &policy, &rate_limiter).unwrap();
    }

    #[test]
    fn stage4_rate_limits_after_burst_exhausted() {
        let tool = echo_tool(Risk::Low);
        let policy = AuthorizationPolicy::new();
        let rate_limiter = RateLimiter::new(RateLimitConfig { requests_per_minute: 60, burst_size: 1 });

        stage4_authorize_and_rate_limit(&session(), &tool, &policy, &rate_limiter).unwrap();
        let err = stage4_authorize_and_rate_limit(&session(), &tool, &policy, &rate_limiter).unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert!(err.retry_after.is_some());
    }

    #[test]
    fn stage5_passes_low_risk_tools_unconditionally() {
        let tool = echo_tool(Risk::Low);
        let pre_approvals = PreApprovals::new();
        stage5_confirm(&tool, "corr-1", &pre_approvals).unwrap();
    }

    #[test]
    fn stage5_requires_pre_approval_for_high_risk_tools() {
        let tool = echo_tool(Risk::High);
        let pre_approvals = PreApprovals::new();
        let err = stage5_confirm(&tool, "corr-1", &pre_approvals).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfirmationTimeout);

        pre_approvals.approve("corr-1");
        stage5_confirm(&tool, "corr-1", &pre_approvals).unwrap();
    }

    #[test]
    fn run_sync_stages_short_circuits_on_first_rejection() {
        let catalog = ToolCatalog::new();
        let policy = AuthorizationPolicy::new();
        let rate_limiter = RateLimiter::new(RateLimitConfig::default());
        let pre_approvals = PreApprovals::new();
        let deps = PipelineDeps { catalog: &catalog, policy: &policy, rate_limiter: &rate_limiter, pre_approvals: &pre_approvals };

        let ctx = PipelineContext::new(wire("tool.invoke.echo"), session());
        let err = run_sync_stages(ctx, &deps).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownTool);
        assert_eq!(err.stage, 2);
    }

    #[test]
    fn run_sync_stages_passes_through_a_conforming_low_risk_request() {
        let mut catalog = ToolCatalog::new();
        catalog.register(echo_tool(Risk::Low)).unwrap();
        let policy = AuthorizationPolicy::new();
        let rate_limiter = RateLimiter::new(RateLimitConfig::default());
        let pre_approvals = PreApprovals::new();
        let deps = PipelineDeps { catalog: &catalog, policy: &policy, rate_limiter: &rate_limiter, pre_approvals: &pre_approvals };

        let ctx = PipelineContext::new(wire("tool.invoke.echo"), session());
        let ctx = run_sync_stages(ctx, &deps).unwrap();
        assert_eq!(ctx.tool().name, "echo");
    }
}
