//! # Cascade Server
//!
//! Standalone binary for running the orchestration engine as an HTTP
//! service: load configuration, connect and migrate the database, serve the
//! router until Ctrl+C or SIGTERM.
//!
//! ```bash
//! # Run with defaults (config/cascade.toml + CASCADE_* env overrides)
//! cargo run --bin cascade-server
//! ```

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use cascade_orchestration::web::{build_router, AppState};
use cascade_shared::config::CascadeConfig;
use cascade_shared::ids::ApplyIdGenerator;
use cascade_shared::{database, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CascadeConfig::load()?;
    logging::init_tracing(config.logging.json);

    info!("Starting Cascade Orchestration Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    let pool = database::connect(&config.database).await?;
    database::migrate(&pool).await?;
    info!("   Database: connected, migrations applied");

    let state = AppState {
        pool,
        ids: Arc::new(ApplyIdGenerator::from_config(&config.id_generator)?),
        config: Arc::new(config.clone()),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("   Listening on {}", config.server.bind_address);
    info!("   Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Cascade server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
