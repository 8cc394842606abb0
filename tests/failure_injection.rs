//! Failure injection: unreachable collectors, flaky collectors, full queues,
//! and envelopes that lost their context.

use std::time::Duration;

use serde_json::json;

use record_store_telemetry::config::{BackpressurePolicy, SinkKind};
use record_store_telemetry::queue::QueueEnvelope;
use record_store_telemetry::sink::InMemorySink;
use record_store_telemetry::span::SpanStatus;
use record_store_telemetry::{CorrelationContext, Telemetry};

mod common;

#[tokio::test]
async fn test_unreachable_span_sink_never_fails_requests() {
    let mut config = common::test_config();
    config.sinks.spans.kind = SinkKind::Http;
    // Nothing listens on the discard port.
    config.sinks.spans.endpoint = Some("http://127.0.0.1:9/v1/spans".to_string());
    config.sinks.spans.retry.max_attempts = 1;
    config.sinks.spans.timeout_secs = 1;

    let logs = InMemorySink::new();
    let (telemetry, pipelines) = Telemetry::start(&config).unwrap();
    let dispatcher = telemetry.spans.dispatcher().clone();
    let test = common::start_with_telemetry(config, telemetry, pipelines, InMemorySink::new(), logs).await;

    let client = reqwest::Client::new();
    for _ in 0..5 {
        let response = client
            .get(format!("{}/trace-test", test.base_url))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    assert!(
        common::eventually(Duration::from_secs(5), || {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.stats().export_failures > 0 }
        })
        .await
    );

    test.app.stop().await.unwrap();
}

#[tokio::test]
async fn test_flaky_collector_receives_spans_after_retry() {
    let collector = common::start_collector(2).await;

    let mut config = common::test_config();
    config.sinks.spans.kind = SinkKind::Http;
    config.sinks.spans.endpoint = Some(collector.url.clone());
    config.sinks.spans.retry.max_attempts = 3;
    config.sinks.spans.retry.base_delay_ms = 10;
    config.sinks.logs.kind = SinkKind::Discard;

    let (telemetry, pipelines) = Telemetry::start(&config).unwrap();
    let test = common::start_with_telemetry(
        config,
        telemetry,
        pipelines,
        InMemorySink::new(),
        InMemorySink::new(),
    )
    .await;

    reqwest::get(format!("{}/trace-test", test.base_url)).await.unwrap();
    test.app.stop().await.unwrap();

    assert!(collector.calls() >= 3);
    let received = collector.received();
    assert!(received.iter().any(|s| s["operation_name"] == "test-span"));
    assert!(received.iter().any(|s| s["operation_name"] == "telemetry_test_span"));
    assert!(received.iter().all(|s| s["resource"]["service.name"].is_string()));
}

#[tokio::test]
async fn test_full_span_queue_drops_and_counts() {
    let mut config = common::test_config();
    config.sinks.spans.queue_capacity = 1;
    config.sinks.spans.batch_size = 1;
    config.sinks.spans.backpressure = BackpressurePolicy::DropNewest;

    let spans = InMemorySink::new();
    let (telemetry, _pipelines) =
        Telemetry::with_sinks(&config, spans.clone(), InMemorySink::new());

    // Flood faster than the drain task can run on this thread.
    let ctx = CorrelationContext::new_context();
    for i in 0..50 {
        let guard = telemetry.spans.enter(&ctx, format!("burst-{}", i));
        guard
            .finish(SpanStatus::Ok, Default::default())
            .unwrap();
    }
    assert!(telemetry.spans.dispatcher().flush(Duration::from_secs(2)).await);

    let stats = telemetry.spans.dispatcher().stats();
    assert_eq!(stats.submitted, 50);
    assert_eq!(stats.exported + stats.dropped, 50);
    assert!(stats.dropped > 0);
    assert_eq!(spans.len() as u64, stats.exported);
}

#[tokio::test]
async fn test_stuck_worker_is_aborted_and_its_spans_cancelled() {
    let mut config = common::test_config();
    config.queue.simulated_work_ms = 60_000;
    config.timeouts.shutdown_drain_secs = 1;
    let test = common::start_app(config).await;

    let response = reqwest::Client::new()
        .post(format!("{}/checkout", test.base_url))
        .json(&json!({ "product_id": 1, "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // task.process_order and order.fulfil stay open while the work sleeps.
    let telemetry = test.app.telemetry().clone();
    let spans = test.spans.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let telemetry = telemetry.clone();
            let spans = spans.clone();
            async move {
                telemetry.spans.open_spans() == 2
                    && spans.records().iter().any(|s| s.operation_name == "email.send")
            }
        })
        .await
    );

    let started = std::time::Instant::now();
    test.app.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(30));

    let records = test.spans.records();
    for name in ["task.process_order", "order.fulfil"] {
        let span = records.iter().find(|s| s.operation_name == name).unwrap();
        assert_eq!(span.status, SpanStatus::Cancelled, "{}", name);
    }
    assert_eq!(telemetry.spans.open_spans(), 0);
}

#[tokio::test]
async fn test_envelope_without_context_still_runs() {
    let test = common::start_app(common::test_config()).await;

    test.app
        .broker()
        .publish(&QueueEnvelope::bare(
            "send_order_confirmation",
            json!({ "order_id": 99 }),
        ))
        .unwrap();

    let logs = test.logs.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let logs = logs.clone();
            async move {
                logs.records()
                    .iter()
                    .any(|e| e.attributes.get("propagation.gap") == Some(&json!(true)))
            }
        })
        .await
    );

    let gap = test
        .logs
        .records()
        .into_iter()
        .find(|e| e.attributes.get("propagation.gap").is_some())
        .unwrap();
    let gap_trace = gap.trace_id;
    let spans = test.spans.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let spans = spans.clone();
            async move {
                spans
                    .records()
                    .iter()
                    .any(|s| s.operation_name == "task.send_order_confirmation" && s.trace_id == gap_trace)
            }
        })
        .await
    );

    test.app.stop().await.unwrap();
}
