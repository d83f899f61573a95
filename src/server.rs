//! HTTP boundary of the engine.
//!
//! Two operations back the polling client: `POST /terminate` submits a job
//! and returns its id, `GET /status` returns the full current snapshot.
//! Request-level failures use the `{"error": ...}` shape; per-pair
//! termination failures never surface here, only as `error` entries in
//! status responses.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ServerConfig, SestermConfig};
use crate::connectors::ConnectorRegistry;
use crate::dispatcher::Dispatcher;
use crate::error::SestermError;
use crate::job::{JobStore, RelyingParty};
use crate::status::{StatusReport, StatusService};

/// Shared state for all handlers; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub status: Arc<StatusService>,
    pub store: Arc<JobStore>,
}

#[derive(Debug, Deserialize)]
pub struct TerminateRequest {
    pub usernames: Vec<String>,
    /// Relying-party identifiers, e.g. `["sso", "slack"]`.
    pub selected: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResponse {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
    pub job_id: String,
}

/// A request-level failure, rendered as `{"error": ...}` with the
/// appropriate status code.
struct ApiError(SestermError);

impl From<SestermError> for ApiError {
    fn from(err: SestermError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SestermError::Validation(_) => StatusCode::BAD_REQUEST,
            SestermError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn terminate(
    State(state): State<AppState>,
    Json(request): Json<TerminateRequest>,
) -> Result<Json<TerminateResponse>, ApiError> {
    let targets = parse_selections(&request.selected);
    let job_id = state.dispatcher.submit(request.usernames, targets).await?;
    Ok(Json(TerminateResponse { job_id }))
}

/// Map selection strings onto the closed relying-party set. Identifiers
/// outside the set are dropped (the submission fails validation only if
/// nothing parseable remains).
fn parse_selections(selected: &[String]) -> Vec<RelyingParty> {
    selected
        .iter()
        .filter_map(|ident| {
            let parsed = RelyingParty::from_wire(ident);
            if parsed.is_none() {
                tracing::warn!(selection = %ident, "ignoring unknown relying party selection");
            }
            parsed
        })
        .collect()
}

async fn status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusReport>, ApiError> {
    let report = state.status.poll(&params.job_id).await?;
    Ok(Json(report))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application state from configuration: one store, one
/// connector registry, one dispatcher.
pub fn build_state(config: &SestermConfig) -> AppState {
    let store = Arc::new(JobStore::new());
    let registry = Arc::new(ConnectorRegistry::from_config(config));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        registry,
        Duration::from_secs(config.dispatcher.connector_timeout_secs),
    ));
    let status = Arc::new(StatusService::new(Arc::clone(&store)));

    AppState {
        dispatcher,
        status,
        store,
    }
}

/// Build the router. Shared between the binary and the tests so both
/// exercise the same stack.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/terminate", post(terminate))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API until the process is stopped.
pub async fn serve(config: SestermConfig) -> anyhow::Result<()> {
    let state = build_state(&config);

    if let Some(retention_secs) = config.dispatcher.retention_secs {
        spawn_retention_sweeper(Arc::clone(&state.store), retention_secs);
    }

    let router = build_router(state, &config.server);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "sesterm listening");
    axum::serve(listener, router).await?;

    Ok(())
}

// Converged jobs past the retention window are swept so long-running
// deployments don't grow without bound.
fn spawn_retention_sweeper(store: Arc<JobStore>, retention_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(retention_secs.max(1)));
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            let evicted = store.evict_converged(retention_secs).await;
            if evicted > 0 {
                tracing::debug!(evicted, "evicted converged jobs past retention");
            }
        }
    });
}
