// SPDX-License-Identifier: MIT OR Apache-2.0
//! Assembles a [`RequestRouter`] and its collaborators from a
//! [`RouterConfig`], binding the `zmq` transport sockets the config
//! names.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use carapace_catalog::ToolCatalog;
use carapace_confirm::ConfirmationGate;
use carapace_config::RouterConfig;
use carapace_eventbus::EventBus;
use carapace_ratelimit::{RateLimitConfig, RateLimiter};
use carapace_router::{ExecutorConfig, HandlerRegistry, RequestRouter};
use carapace_session::SessionManager;
use carapace_transport::zmq_backend::{ZmqPublisher, ZmqRouter};

use crate::intrinsics;

/// Everything [`main`](../bin.carapace-daemon.html) needs to run the
/// daemon: the request router and the event bus it shares a process
/// with.
pub struct BuiltRouter {
    pub router: Arc<RequestRouter>,
    pub event_bus: Arc<EventBus>,
}

/// Bind transport sockets at `config`'s endpoints and assemble every
/// collaborator the pipeline needs, with the four intrinsic tools
/// registered alongside whatever plugin tools `register_plugins` adds.
///
/// # Errors
///
/// Returns an error if either `zmq` socket fails to bind, or if an
/// intrinsic tool's schema is rejected by the catalog (an internal
/// invariant violation, not a runtime condition).
pub fn build_router(
    config: &RouterConfig,
    register_plugins: impl FnOnce(&mut ToolCatalog, &mut HandlerRegistry),
) -> Result<BuiltRouter> {
    let transport = Arc::new(
        ZmqRouter::bind(&config.router_endpoint)
            .with_context(|| format!("bind router socket at {}", config.router_endpoint))?,
    );
    let publisher = Arc::new(
        ZmqPublisher::bind(&config.event_bus_endpoint)
            .with_context(|| format!("bind event bus socket at {}", config.event_bus_endpoint))?,
    );
    let event_bus = Arc::new(EventBus::new(publisher));

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        requests_per_minute: config.rate_limit.requests_per_minute,
        burst_size: config.rate_limit.burst_size,
    }));
    let confirmations = ConfirmationGate::new();
    let sessions = Arc::new(SessionManager::new(Arc::clone(&rate_limiter), confirmations));

    let mut catalog = ToolCatalog::new();
    let mut handlers = HandlerRegistry::new();
    intrinsics::register_declarations(&mut catalog).context("register intrinsic tool declarations")?;
    register_plugins(&mut catalog, &mut handlers);
    let catalog = Arc::new(catalog);
    intrinsics::register_handlers(&mut handlers, Arc::clone(&catalog), Arc::clone(&sessions), Instant::now());
    let handlers = Arc::new(handlers);

    let policy = Arc::new(carapace_router::AuthorizationPolicy::new());
    let pre_approvals = Arc::new(carapace_router::PreApprovals::new());
    let audit = Arc::new(
        carapace_audit::AuditLog::open(&config.audit_base_path)
            .with_context(|| format!("open audit log at {}", config.audit_base_path))?,
    );
    let executor_config = ExecutorConfig {
        handler_timeout: std::time::Duration::from_secs(config.handler_timeout_secs),
        response_size_cap_bytes: config.response_size_cap_bytes,
    };

    let router = Arc::new(RequestRouter::new(
        transport,
        sessions,
        catalog,
        handlers,
        policy,
        rate_limiter,
        pre_approvals,
        audit,
        executor_config,
    ));

    Ok(BuiltRouter { router, event_bus })
}
