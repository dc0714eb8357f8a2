//! Channel Service
//!
//! Publish/subscribe channels on an in-process actor runtime.
//!
//! # Servers
//!
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8082)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Start the local runtime and the channel registry
//! 5. Create bootstrap channels
//! 6. Start health HTTP server (liveness, readiness, metrics)
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use channel_service::config::Config;
use channel_service::observability::{health_router, init_metrics_recorder, HealthState};
use channel_service::registry::ChannelRegistryHandle;
use channel_service::runtime::{ActorRuntime, LocalRuntime};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it carries the log settings
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    config.observability.init_tracing()?;

    info!("Starting Channel Service");
    info!(
        service_id = %config.service_id,
        health_bind_address = %config.health_bind_address,
        mailbox_capacity = config.runtime.mailbox_capacity,
        registry_mailbox_capacity = config.channels.registry_mailbox_capacity,
        default_backend = config.channels.default_backend.as_str(),
        bootstrap_channels = config.bootstrap_channels.len(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new(config.service_id.clone()));

    info!("Initializing actor runtime...");
    let local_runtime = LocalRuntime::new(config.runtime);
    let runtime: Arc<dyn ActorRuntime> = local_runtime.clone();
    let registry = ChannelRegistryHandle::new(Arc::clone(&runtime), config.channels);
    info!("Actor runtime initialized");

    for id in &config.bootstrap_channels {
        registry.create_channel(id.clone(), None).await.map_err(|e| {
            error!(
                channel = %id,
                error = %e,
                error_code = e.error_code(),
                "Failed to create bootstrap channel"
            );
            e
        })?;
        info!(channel = %id, "Bootstrap channel created");
    }

    let shutdown_token = registry.child_token();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    health_state.set_ready();
    info!("Channel Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so no new traffic is routed here
    health_state.set_not_ready();

    if let Err(e) = registry.shutdown().await {
        warn!(error = %e, "Channel registry shutdown error");
    }
    registry.cancel();

    local_runtime.shutdown().await;

    if let Err(e) = health_task.await {
        warn!(error = %e, "Health server task failed");
    }

    info!("Channel Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
