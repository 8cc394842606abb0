//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tokio::net::TcpListener;

use record_store_telemetry::config::TelemetryConfig;
use record_store_telemetry::events::LogEvent;
use record_store_telemetry::lifecycle::Application;
use record_store_telemetry::sink::InMemorySink;
use record_store_telemetry::span::Span;
use record_store_telemetry::Telemetry;

/// A shim running on a local port with in-memory sinks.
pub struct TestApp {
    pub app: Application,
    pub base_url: String,
    pub spans: InMemorySink<Span>,
    pub logs: InMemorySink<LogEvent>,
}

/// Config suited to tests: ephemeral port, fast workers, short drains.
pub fn test_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.queue.simulated_work_ms = 5;
    config.timeouts.shutdown_drain_secs = 2;
    config.metrics.self_metrics = false;
    config
}

pub async fn start_app(config: TelemetryConfig) -> TestApp {
    let spans = InMemorySink::new();
    let logs = InMemorySink::new();
    let (telemetry, pipelines) = Telemetry::with_sinks(&config, spans.clone(), logs.clone());
    start_with_telemetry(config, telemetry, pipelines, spans, logs).await
}

pub async fn start_with_telemetry(
    config: TelemetryConfig,
    telemetry: Telemetry,
    pipelines: record_store_telemetry::telemetry::PipelineTasks,
    spans: InMemorySink<Span>,
    logs: InMemorySink<LogEvent>,
) -> TestApp {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let app = Application::start_with(config, listener, telemetry, pipelines)
        .await
        .unwrap();
    let base_url = format!("http://{}", app.local_addr());
    TestApp {
        app,
        base_url,
        spans,
        logs,
    }
}

/// Poll `check` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A collector endpoint that answers 503 for the first `fail_first` batches.
#[allow(dead_code)]
pub struct MockCollector {
    pub url: String,
    pub calls: Arc<AtomicU32>,
    pub received: Arc<Mutex<Vec<serde_json::Value>>>,
}

#[allow(dead_code)]
impl MockCollector {
    pub fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

type CollectorState = (Arc<AtomicU32>, Arc<Mutex<Vec<serde_json::Value>>>, u32);

#[allow(dead_code)]
pub async fn start_collector(fail_first: u32) -> MockCollector {
    let calls = Arc::new(AtomicU32::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let state: CollectorState = (calls.clone(), received.clone(), fail_first);

    let app = Router::new()
        .route(
            "/v1/spans",
            post(
                |State((calls, received, fail_first)): State<CollectorState>,
                 Json(batch): Json<Vec<serde_json::Value>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < fail_first {
                        return StatusCode::SERVICE_UNAVAILABLE;
                    }
                    received.lock().unwrap().extend(batch);
                    StatusCode::OK
                },
            ),
        )
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockCollector {
        url: format!("http://{}/v1/spans", addr),
        calls,
        received,
    }
}
