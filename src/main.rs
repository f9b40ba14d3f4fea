use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use chatrelay::{app_router, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if dotenvy::dotenv().is_ok() {
        info!("loaded environment variables from .env");
    }

    let config = AppConfig::from_env();
    let state = AppState::new(config.clone());

    // Expiration sweep runs for the life of the process and is stopped
    // explicitly on shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = {
        let store = state.sessions.clone();
        tokio::spawn(async move {
            store
                .run_sweeper(config.session_timeout, config.sweep_interval, shutdown_rx)
                .await
        })
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", listener.local_addr()?);

    let app = app_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    info!("server exiting");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
