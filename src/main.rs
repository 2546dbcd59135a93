//! Context budget service

use anyhow::Context as _;
use std::path::PathBuf;
use tracing::info;

use context_budget::{api, app, config::Config, context::default_estimator, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    logging::init_tracing(&config.logging)?;

    info!("Starting context budget service v{}", env!("CARGO_PKG_VERSION"));

    let estimator = default_estimator();
    let index = app::build_index(&config)?;
    let state = app::build_state(&config, index, estimator)?;
    let router = api::build_router(state, config.server.max_body_bytes);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
