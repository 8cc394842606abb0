//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the demo routes and the scrape endpoint
//! - Wire up middleware (tracing, request ID, timeout, correlation)
//! - Bind server to listener and stop on shutdown

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::aggregator::exposition;
use crate::config::TelemetryConfig;
use crate::demo::routes;
use crate::lifecycle::Shutdown;
use crate::queue::{InProcessBroker, QueueHop};
use crate::telemetry::Telemetry;
use super::middleware::telemetry_middleware;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TelemetryConfig>,
    pub telemetry: Telemetry,
    pub hop: QueueHop,
    pub broker: InProcessBroker,
    pub prometheus: Option<PrometheusHandle>,
    pub orders: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        config: TelemetryConfig,
        telemetry: Telemetry,
        broker: InProcessBroker,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            hop: telemetry.hop(),
            telemetry,
            broker,
            prometheus,
            orders: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// HTTP ingress of the telemetry shim.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server around shared state.
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = Arc::clone(&state.config);
        let mut router = routes::router();
        if config.metrics.enabled {
            router = router.route(&config.metrics.path, get(metrics_handler));
        }

        // Outermost first. The timeout must sit outside the telemetry
        // middleware: a timed-out request cancels its span.
        router.with_state(state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                .layer(middleware::from_fn_with_state(state, telemetry_middleware)),
        )
    }

    /// Router with all layers, for in-process tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server until `shutdown` fires, then finish in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Prometheus scrape: domain metrics, then pipeline self-metrics.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut body = state.telemetry.metrics.render_prometheus();
    if state.config.metrics.self_metrics {
        if let Some(handle) = &state.prometheus {
            body.push_str(&handle.render());
        }
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::events::LogEvent;
    use crate::sink::InMemorySink;
    use crate::span::Span;

    fn server() -> (Router, InMemorySink<Span>, InMemorySink<LogEvent>, Telemetry) {
        let spans = InMemorySink::new();
        let logs = InMemorySink::new();
        let config = TelemetryConfig::default();
        let (telemetry, _tasks) = Telemetry::with_sinks(&config, spans.clone(), logs.clone());
        let state = AppState::new(config, telemetry.clone(), InProcessBroker::new(16), None);
        (HttpServer::new(state).into_router(), spans, logs, telemetry)
    }

    #[tokio::test]
    async fn test_incoming_id_is_echoed_and_stitched() {
        let (router, spans, logs, _telemetry) = server();
        let response = router
            .oneshot(
                Request::get("/trace-test")
                    .header("x-correlation-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-correlation-id"], "abc-123");
        let traceparent = response.headers()["traceparent"].to_str().unwrap().to_string();

        assert!(spans.wait_for(2, Duration::from_secs(2)).await);
        let records = spans.records();
        let root = records.iter().find(|s| s.operation_name == "GET /trace-test").unwrap();
        let child = records.iter().find(|s| s.operation_name == "test-span").unwrap();
        assert!(root.is_root());
        assert_eq!(child.parent_span_id, Some(root.span_id));
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(root.correlation_id.as_str(), "abc-123");
        assert_eq!(root.attributes["http.status_code"], 200);
        assert_eq!(traceparent, format!("00-{}-{}-01", root.trace_id, root.span_id));

        assert!(logs.wait_for(1, Duration::from_secs(2)).await);
        let event = &logs.records()[0];
        assert_eq!(event.trace_id, root.trace_id);
        assert_eq!(event.span_id, child.span_id);
    }

    #[tokio::test]
    async fn test_traceparent_continues_remote_trace() {
        let (router, spans, _logs, _telemetry) = server();
        let response = router
            .oneshot(
                Request::get("/")
                    .header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(spans.wait_for(1, Duration::from_secs(2)).await);
        let root = &spans.records()[0];
        assert_eq!(root.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(root.parent_span_id.unwrap().to_string(), "00f067aa0ba902b7");
    }

    #[tokio::test]
    async fn test_scrape_includes_request_metrics() {
        let (router, _spans, _logs, _telemetry) = server();
        let missing = router
            .clone()
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], exposition::CONTENT_TYPE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains(
            "http_requests_total{endpoint=\"unmatched\",method=\"GET\",status_code=\"404\"} 1"
        ));
        assert!(text.contains(
            "http_request_errors_total{endpoint=\"unmatched\",error_type=\"http_404\",method=\"GET\"} 1"
        ));
        assert!(text.contains("# TYPE http_request_duration_seconds histogram"));
    }

    #[tokio::test]
    async fn test_unmatched_paths_share_one_series() {
        let (router, spans, _logs, telemetry) = server();
        for i in 0..50 {
            let response = router
                .clone()
                .oneshot(Request::get(format!("/nope/{}", i)).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        // requests, errors, duration
        assert_eq!(telemetry.metrics.series_count(), 3);
        assert_eq!(
            telemetry.metrics.counter_value(
                "http_requests_total",
                &[("method", "GET"), ("endpoint", "unmatched"), ("status_code", "404")]
            ),
            Some(50)
        );

        assert!(spans.wait_for(50, Duration::from_secs(2)).await);
        let records = spans.records();
        let request_spans: Vec<_> = records
            .iter()
            .filter(|s| s.operation_name == "GET unmatched")
            .collect();
        assert_eq!(request_spans.len(), 50);
        assert!(request_spans
            .iter()
            .any(|s| s.attributes["http.target"] == "/nope/7"));
    }

    #[tokio::test]
    async fn test_checkout_enqueues_both_tasks() {
        let spans = InMemorySink::new();
        let config = TelemetryConfig::default();
        let (telemetry, _tasks) = Telemetry::with_sinks(&config, spans.clone(), InMemorySink::new());
        let broker = InProcessBroker::new(16);
        let state = AppState::new(config, telemetry, broker.clone(), None);
        let router = HttpServer::new(state).into_router();

        let response = router
            .oneshot(
                Request::post("/checkout")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"product_id": 4, "quantity": 2}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["order_id"], 1);
        assert_eq!(broker.depth(), 2);
    }
}
