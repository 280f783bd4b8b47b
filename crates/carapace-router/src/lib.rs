// SPDX-License-Identifier: MIT OR Apache-2.0
//! The six-stage request pipeline (spec §4.8), its handler executor
//! (stage 6), and the request dispatcher that wires them to a
//! transport (spec §4.10).

pub mod context;
pub mod executor;
pub mod handler;
pub mod pipeline;
pub mod policy;
pub mod router;

pub use context::PipelineContext;
pub use executor::{dispatch, ExecutorConfig};
pub use handler::{HandlerRegistry, ToolHandler};
pub use pipeline::{
    run_sync_stages, stage1_construct, stage2_topic, stage3_payload, stage4_authorize_and_rate_limit,
    stage5_confirm, PipelineDeps,
};
pub use policy::{AuthorizationPolicy, PreApprovals};
pub use router::RequestRouter;
