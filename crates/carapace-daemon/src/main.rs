// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use std::path::PathBuf;

use anyhow::{Context, Result};
use carapace_config::load_config;
use carapace_daemon::build_router;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "carapace-daemon", version, about = "Carapace host broker daemon")]
struct Args {
    /// Path to the router config TOML file.
    #[arg(long, default_value = "/etc/carapace/router.toml")]
    config: PathBuf,

    /// Enable verbose request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("carapace=debug")
    } else {
        EnvFilter::new("carapace=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args.config)
        .with_context(|| format!("load router config from {}", args.config.display()))?;
    for warning in carapace_config::validate_config(&config).context("validate router config")? {
        warn!(%warning, "router config warning");
    }

    let built = build_router(&config, |_catalog, _handlers| {
        // No plugin tools are wired at startup in this deployment; they
        // are registered by whatever sandboxed plugin-loading mechanism
        // owns that concern.
    })?;

    info!(
        router_endpoint = %config.router_endpoint,
        event_bus_endpoint = %config.event_bus_endpoint,
        "carapace-daemon listening"
    );

    let router = built.router;
    let accept_loop = tokio::spawn(async move { router.run().await });

    tokio::select! {
        result = accept_loop => {
            result.context("router accept loop panicked")?.context("router accept loop failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
