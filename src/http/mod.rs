//! HTTP transport: thin axum front end over the relaxation engine.
//!
//! `/relax` is the entry point the task dispatcher delivers into. Status
//! codes encode the retry contract for HTTP-push queues: 2xx means acked
//! (including caller errors, which redelivery can never fix), 503 means
//! redeliver later.

use crate::config::Config;
use crate::dispatch::TaskDispatcher;
use crate::engine::RelaxEngine;
use crate::error::{DegreesError, Result};
use crate::node::{NodeKey, NodeKind};
use crate::store::DistanceStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    engine: Arc<RelaxEngine>,
    store: Arc<dyn DistanceStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

/// HTTP server wrapper
pub struct HttpServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    pub fn new(
        engine: Arc<RelaxEngine>,
        store: Arc<dyn DistanceStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: &Config,
    ) -> Self {
        Self {
            state: AppState {
                engine,
                store,
                dispatcher,
            },
            allowed_origins: config.http_server.allowed_origins.clone(),
        }
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting HTTP server on http://{}", addr);
        log::info!("Relaxation endpoint: http://{}/relax/:kind/:raw_id", addr);

        if !check_port_available(port).await {
            return Err(DegreesError::Config(format!(
                "Port {} is already in use. Another process (possibly a previous degrees instance) \
                 is using this port; stop it or set http_server.port in config.toml.",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| {
                DegreesError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!("Failed to bind to {}: {}", addr, e),
                ))
            })?;

        axum::serve(listener, app).await.map_err(|e| {
            DegreesError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    fn create_router(&self) -> Router {
        // Restrict CORS to configured origins when present; otherwise allow
        // all (local development — the read endpoints are consumed by a
        // browser front end, the write endpoints by the dispatcher)
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handle_health))
            .route("/relax/:kind/:raw_id", post(handle_relax))
            .route("/seed/:kind/:raw_id", post(handle_seed))
            .route("/nodes/:kind/:raw_id", get(handle_get_node))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
            .with_state(self.state.clone())
    }
}

async fn handle_health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

/// Body of a delivered relaxation task
#[derive(Debug, Deserialize)]
struct RelaxBody {
    distance: u32,
}

/// Relaxation delivery. The kind string is validated by the engine so an
/// unknown kind becomes an acked `invalid_node` rather than an endless
/// redelivery loop.
async fn handle_relax(
    State(state): State<AppState>,
    Path((kind, raw_id)): Path<(String, String)>,
    Json(body): Json<RelaxBody>,
) -> (StatusCode, Json<Value>) {
    match state.engine.relax_raw(&kind, &raw_id, body.distance).await {
        Ok(result) => (StatusCode::OK, Json(json!({"result": result.as_str()}))),
        Err(e) if e.is_retryable() => {
            log::warn!("relaxation of {}-{} failed, awaiting redelivery: {}", kind, raw_id, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": e.to_string()})),
            )
        }
        Err(e) => {
            log::error!("relaxation of {}-{} failed permanently: {}", kind, raw_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        }
    }
}

/// Start a traversal from a seed node at distance 0.
async fn handle_seed(
    State(state): State<AppState>,
    Path((kind, raw_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let kind: NodeKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
        }
    };

    match state.dispatcher.submit(kind, &raw_id, 0).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

/// Read a node's current record from the distance store.
async fn handle_get_node(
    State(state): State<AppState>,
    Path((kind, raw_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let kind: NodeKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
        }
    };

    match state.store.get(&NodeKey::new(kind, &raw_id)).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(serde_json::to_value(&record).unwrap_or_else(|_| json!({}))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "node not discovered"})),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        ),
    }
}
