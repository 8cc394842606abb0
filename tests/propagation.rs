//! End-to-end correlation: HTTP ingress, nested spans, queue hop, workers.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::{json, Value};

use record_store_telemetry::correlation::{CorrelationId, SpanId, TraceId};
use record_store_telemetry::span::Span;

mod common;

#[tokio::test]
async fn test_checkout_trace_spans_queue_hop() {
    let test = common::start_app(common::test_config()).await;
    let client = reqwest::Client::new();
    let incoming = "7d444840-9dc0-41d1-b245-5ffdce74fad2";

    let response = client
        .post(format!("{}/checkout", test.base_url))
        .header("x-correlation-id", incoming)
        .json(&json!({ "product_id": 3, "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.headers()["x-correlation-id"], incoming);
    let body: Value = response.json().await.unwrap();

    // The caller's UUID is honoured as the trace root.
    let expected_trace = CorrelationId::parse(incoming)
        .and_then(|id| id.embedded_trace_id())
        .unwrap();
    assert_eq!(body["trace_id"], expected_trace.to_string());

    // root, checkout_order, two task spans, order.fulfil, email.send
    let trace_spans = |spans: &[Span]| -> Vec<Span> {
        spans
            .iter()
            .filter(|s| s.trace_id == expected_trace)
            .cloned()
            .collect()
    };
    let spans = test.spans.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let spans = spans.clone();
            async move { trace_spans(&spans.records()).len() >= 6 }
        })
        .await
    );

    let records = trace_spans(&test.spans.records());
    let by_name: HashMap<&str, &Span> = records
        .iter()
        .map(|s| (s.operation_name.as_str(), s))
        .collect();
    let root = by_name["POST /checkout"];
    let checkout = by_name["checkout_order"];
    let process = by_name["task.process_order"];
    let confirm = by_name["task.send_order_confirmation"];
    let fulfil = by_name["order.fulfil"];

    assert!(root.is_root());
    assert_eq!(checkout.parent_span_id, Some(root.span_id));
    assert_eq!(process.parent_span_id, Some(checkout.span_id));
    assert_eq!(confirm.parent_span_id, Some(checkout.span_id));
    assert_eq!(fulfil.parent_span_id, Some(process.span_id));
    for span in &records {
        assert_eq!(span.correlation_id.as_str(), incoming);
    }

    let ids: HashSet<SpanId> = records.iter().map(|s| s.span_id).collect();
    assert_eq!(ids.len(), records.len());

    // Every log event of the request joins a span of the same trace.
    let events: Vec<_> = test
        .logs
        .records()
        .into_iter()
        .filter(|e| e.correlation_id.as_str() == incoming)
        .collect();
    assert!(!events.is_empty());
    for event in &events {
        assert_eq!(event.trace_id, expected_trace);
        assert!(ids.contains(&event.span_id));
    }

    test.app.stop().await.unwrap();
}

#[tokio::test]
async fn test_requests_without_ids_get_distinct_traces() {
    let test = common::start_app(common::test_config()).await;
    let client = reqwest::Client::new();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = format!("{}/trace-test", test.base_url);
        tasks.push(tokio::spawn(async move {
            let body: Value = client.get(url).send().await.unwrap().json().await.unwrap();
            body["trace_id"].as_str().unwrap().parse::<TraceId>().unwrap()
        }));
    }
    let mut traces = HashSet::new();
    for task in tasks {
        assert!(traces.insert(task.await.unwrap()));
    }

    test.app.stop().await.unwrap();
}

#[tokio::test]
async fn test_scrape_reflects_traffic() {
    let test = common::start_app(common::test_config()).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        client.get(format!("{}/", test.base_url)).send().await.unwrap();
    }
    let text = client
        .get(format!("{}/metrics", test.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(r#"http_requests_total{endpoint="/",method="GET",status_code="200"} 3"#));

    let snapshot: Value = client
        .get(format!("{}/metrics/snapshot", test.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let samples = snapshot["metrics"].as_array().unwrap();
    let requests = samples
        .iter()
        .find(|s| s["name"] == "http_requests_total" && s["labels"]["endpoint"] == "/")
        .unwrap();
    assert_eq!(requests["value"], 3.0);
    assert_eq!(requests["exemplar"]["trace_id"].as_str().unwrap().len(), 32);

    test.app.stop().await.unwrap();
}
