//! Health endpoints for the channel service.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (are channels being served?)
//!
//! Both return a small JSON body naming the instance. The `/metrics`
//! endpoint is served separately via `metrics-exporter-prometheus`.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the channel service.
///
/// `live` is true from startup; `ready` is set once the runtime and registry
/// are up and cleared when shutdown begins.
#[derive(Debug)]
pub struct HealthState {
    /// Service instance ID reported in probe bodies.
    service_id: String,
    /// Whether the process is running.
    live: AtomicBool,
    /// Whether channels are being served.
    ready: AtomicBool,
}

/// JSON body returned by the probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeBody {
    /// `ok` or `unavailable`.
    pub status: &'static str,
    /// Service instance ID.
    pub service_id: String,
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the service as ready to serve traffic.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Check if the service is live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn probe(&self, healthy: bool) -> (StatusCode, Json<ProbeBody>) {
        let (code, status) = if healthy {
            (StatusCode::OK, "ok")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        };
        (
            code,
            Json(ProbeBody {
                status,
                service_id: self.service_id.clone(),
            }),
        )
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<ProbeBody>) {
    state.probe(state.is_live())
}

async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<ProbeBody>) {
    state.probe(state.is_ready())
}
