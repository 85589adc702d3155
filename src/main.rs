//! Record Pipeline server
//!
//! Serves the todo API over HTTP with the dispatcher, its in-memory cache
//! and the background TTL cleanup task.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use record_pipeline::api::create_router;
use record_pipeline::{spawn_cleanup_task, AppState, Config};

/// Startup sequence:
/// 1. Initialize tracing
/// 2. Load configuration from environment variables
/// 3. Build the cache store, repository and dispatcher
/// 4. Start the background TTL cleanup task
/// 5. Serve HTTP until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "record_pipeline=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Record Pipeline server");

    let config = Config::from_env();
    info!(
        max_entries = config.max_entries,
        default_ttl = config.default_ttl,
        port = config.server_port,
        cleanup_interval = config.cleanup_interval,
        codec = ?config.cache_codec,
        compression_threshold = config.compression_threshold,
        "Configuration loaded"
    );

    // Missing or duplicate handlers abort startup
    let state = AppState::from_config(&config).context("failed to register request handlers")?;

    let shutdown = CancellationToken::new();
    let cleanup_handle = spawn_cleanup_task(
        state.cache.clone(),
        Duration::from_secs(config.cleanup_interval.max(1)),
        shutdown.clone(),
    );

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(err) = cleanup_handle.await {
        error!(error = %err, "Cleanup task did not stop cleanly");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    shutdown.cancel();
}
