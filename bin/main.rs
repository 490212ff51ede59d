//! Status watcher binary using the statuswatch library.
#![allow(unreachable_pub, clippy::missing_const_for_fn)]
//!
//! This binary watches a Scheduler status endpoint with:
//! - Structured logging of every status update
//! - Optional dashboard HTTP API serving the latest (or stale) status
//! - Configurable reconnection policy
//!
//! ## Usage
//!
//! ```bash
//! # Watch the default endpoint
//! statuswatch
//!
//! # Watch a remote scheduler and serve the dashboard API
//! statuswatch --endpoint scheduler:9999 --serve 127.0.0.1:9091
//!
//! # Start with config file
//! statuswatch --config statuswatch.toml
//! ```

mod config;
mod rpc;

use statuswatch::{LoggingHandler, StatusBoard, StatusClient, StatusWatcher, WatchOutcome};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    rpc::{AppState, create_router},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    info!(?config, "loaded configuration");

    let client = StatusClient::with_config(&config.endpoint, config.client_config())?;
    let watcher = StatusWatcher::new(client);

    // Log every event and keep the board current for the dashboard API
    let board = StatusBoard::new();
    let mut board_rx = board.subscribe();
    let handle = watcher.watch((LoggingHandler::new(), board));

    if let Some(addr) = config.serve {
        let router = create_router(AppState { board: board_rx, endpoint: config.endpoint.clone() });
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "serving dashboard api");

        // Keep serving stale status after the watch terminates
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    } else {
        tokio::select! {
            () = shutdown_signal() => {}
            _ = board_rx.wait_for(|state| state.is_terminal()) => {}
        }
    }

    match handle.cancel().await {
        WatchOutcome::Failed(error) => {
            warn!(%error, "status watch failed");
            Err(error.into())
        }
        outcome => {
            info!(?outcome, "status watch stopped");
            Ok(())
        }
    }
}

/// Waits for SIGINT or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
