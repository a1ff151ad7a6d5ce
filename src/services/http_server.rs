//! Local HTTP front end for the prediction pipeline
//!
//! Mirrors what API Gateway does in front of the Lambda: `POST /predict`
//! wraps the raw request body into a proxy event and returns the invocation
//! result as an HTTP response. Also serves liveness/readiness checks and a
//! Prometheus metrics endpoint.

use crate::predict_resolver::PredictResolver;
use crate::predict_service::{proxy_event, InvocationResult};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Readiness of the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Model loaded and serving
    Healthy,
    /// Process alive, model not loaded yet
    Cold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// Shared state for the HTTP server
pub struct ServerState {
    pub resolver: Arc<PredictResolver>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(resolver: Arc<PredictResolver>) -> Self {
        Self {
            resolver,
            started_at: Utc::now(),
        }
    }

    pub async fn get_health(&self) -> HealthResponse {
        let model = if self.resolver.is_warm() {
            self.resolver.model().await.ok()
        } else {
            None
        };
        HealthResponse {
            status: if model.is_some() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Cold
            },
            timestamp: Utc::now(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            model_id: model.as_ref().map(|m| m.descriptor().id.clone()),
            model_version: model.as_ref().map(|m| m.descriptor().version.clone()),
        }
    }
}

/// Build the router
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(cors)
}

/// Local prediction server
pub struct HttpServer {
    state: Arc<ServerState>,
    port: u16,
}

impl HttpServer {
    pub fn new(resolver: Arc<PredictResolver>, port: u16) -> Self {
        Self {
            state: Arc::new(ServerState::new(resolver)),
            port,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> crate::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = create_router(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting prediction server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::AppError::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }
}

impl IntoResponse for InvocationResult {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

async fn predict_handler(State(state): State<Arc<ServerState>>, body: String) -> InvocationResult {
    state.resolver.handle(&proxy_event(&body)).await
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.get_health().await)
}

/// Liveness check: is the process alive?
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness check: is the model loaded?
async fn readiness_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.resolver.is_warm() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state
            .resolver
            .metrics()
            .prometheus(state.resolver.is_warm(), state.resolver.load_count()),
    )
}
