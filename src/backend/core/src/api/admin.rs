//! Admin HTTP surface: liveness, readiness and Prometheus metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::journal::CallContext;
use crate::storage::StorageBackend;

/// Upper bound on a readiness ping.
const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    backend: Arc<dyn StorageBackend>,
    metrics: Option<PrometheusHandle>,
}

impl AdminState {
    pub fn new(backend: Arc<dyn StorageBackend>, metrics: Option<PrometheusHandle>) -> Self {
        Self { backend, metrics }
    }
}

#[derive(Debug, Serialize)]
struct ReadinessBody {
    status: &'static str,
    backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Build the admin router.
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/metrics", get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ready(State(state): State<AdminState>) -> Response {
    let backend = state.backend.name();
    let ctx = CallContext::with_timeout(READINESS_TIMEOUT);

    match ctx.run(state.backend.ping()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessBody {
                status: "ok",
                backend,
                error: None,
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(backend, error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessBody {
                    status: "unavailable",
                    backend,
                    error: Some(err.user_message().to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn prometheus_metrics(State(state): State<AdminState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

/// Serve the admin router until `shutdown` resolves.
pub async fn serve_admin<F>(addr: SocketAddr, state: AdminState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Starting admin HTTP server");

    axum::serve(listener, admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JournalError, Result};
    use crate::journal::model::{PendingEvent, RecordedEvent, StreamId};
    use crate::storage::MemoryBackend;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct DownBackend;

    #[async_trait]
    impl StorageBackend for DownBackend {
        async fn append_event(&self, _event: &PendingEvent) -> Result<i64> {
            Err(JournalError::unavailable("down"))
        }

        async fn get_stream_events(&self, _stream_id: &StreamId) -> Result<Vec<RecordedEvent>> {
            Err(JournalError::unavailable("down"))
        }

        async fn ping(&self) -> Result<()> {
            Err(JournalError::unavailable("connection refused"))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_live_is_ok() {
        let router = admin_router(AdminState::new(Arc::new(MemoryBackend::new()), None));
        let (status, body) = get(router, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_reports_backend() {
        let router = admin_router(AdminState::new(Arc::new(MemoryBackend::new()), None));
        let (status, body) = get(router, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "memory");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_ready_fails_when_backend_down() {
        let router = admin_router(AdminState::new(Arc::new(DownBackend), None));
        let (status, body) = get(router, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unavailable");
        assert_eq!(body["backend"], "down");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_disabled_is_not_found() {
        let router = admin_router(AdminState::new(Arc::new(MemoryBackend::new()), None));
        let (status, _) = get(router, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
