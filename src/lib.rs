//! testhub -- run Robot Framework suites, record every outcome, report trends.
//!
//! The library holds the result store, the run orchestrator, the reporting
//! queries and the HTTP API; the `testhub` binary wires them to a CLI.

pub mod api;
pub mod config;
pub mod reporting;
pub mod runner;
pub mod storage;

use anyhow::{Context, Result};
use config::HubConfig;

/// Start the HTTP API on `config.server.bind` and serve until Ctrl-C.
pub async fn serve(config: HubConfig) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(db_path = %config.storage.db_path.display(), "Initializing database");
    let store = storage::ResultStore::open(&config.storage)
        .with_context(|| format!("failed to open {}", config.storage.db_path.display()))?;

    // 2. Start API Server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    let app = api::router(api::state::AppState::new(config, store));

    tracing::info!(%addr, "testhub listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    Ok(())
}
