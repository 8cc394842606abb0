//! Record-store demo routes.
//!
//! Thin handlers that exercise the stitching core: each one works under the
//! request's context, opens its own span and logs through the emitter.

use std::sync::atomic::Ordering;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::LogLevel;
use crate::http::{AppState, RequestContext};
use crate::queue::QueueError;
use crate::span::SpanStatus;
use crate::Attributes;
use super::tasks::{ConfirmationPayload, OrderPayload, PROCESS_ORDER, SEND_ORDER_CONFIRMATION};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/trace-test", get(trace_test))
        .route("/checkout", post(checkout))
        .route("/metrics/snapshot", get(metrics_snapshot))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Record Store API is running!" }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": state.telemetry.spans.resource().service_name,
        "pipelines": {
            "spans": state.telemetry.spans.dispatcher().stats(),
            "logs": state.telemetry.events.dispatcher().stats(),
        },
        "open_spans": state.telemetry.spans.open_spans(),
        "queue_depth": state.broker.depth(),
    }))
}

async fn trace_test(
    State(state): State<AppState>,
    RequestContext(context): RequestContext,
) -> Json<serde_json::Value> {
    let guard = state.telemetry.spans.enter(&context, "test-span");
    let mut attributes = Attributes::new();
    attributes.insert("test.attribute".to_string(), "test-value".into());
    guard.annotate(attributes);
    state
        .telemetry
        .events
        .info(guard.context(), "Creating test span for the trace backend");

    let span_id = guard.handle().map(|h| h.span_id().to_string());
    if let Err(e) = guard.finish(SpanStatus::Ok, Attributes::new()) {
        tracing::debug!(error = %e, "test-span already closed");
    }

    Json(json!({
        "message": "Test span created",
        "trace_id": context.trace_id().to_string(),
        "span_id": span_id,
        "correlation_id": context.correlation_id().as_str(),
    }))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutRequest {
    pub product_id: u64,
    pub quantity: u32,
}

async fn checkout(
    State(state): State<AppState>,
    RequestContext(context): RequestContext,
    Json(order): Json<CheckoutRequest>,
) -> Response {
    let telemetry = &state.telemetry;
    let guard = telemetry.spans.enter(&context, "checkout_order");
    let span_context = guard.context().clone();

    let mut attributes = Attributes::new();
    attributes.insert("order.product_id".to_string(), order.product_id.into());
    attributes.insert("order.quantity".to_string(), order.quantity.into());
    guard.annotate(attributes);

    if order.quantity == 0 {
        telemetry.events.warn(&span_context, "Checkout rejected: quantity must be positive");
        if let Err(e) = guard.finish(SpanStatus::Error, Attributes::new()) {
            tracing::debug!(error = %e, "checkout_order already closed");
        }
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": "quantity must be positive" })),
        )
            .into_response();
    }

    let order_id = state.orders.fetch_add(1, Ordering::Relaxed) + 1;
    let process = state.hop.wrap(
        &span_context,
        PROCESS_ORDER,
        OrderPayload {
            order_id,
            product_id: order.product_id,
            quantity: order.quantity,
        },
    );
    let confirm = state.hop.wrap(
        &span_context,
        SEND_ORDER_CONFIRMATION,
        ConfirmationPayload { order_id },
    );
    let task_id = process.task_id;

    let published = state
        .broker
        .publish(&process)
        .and_then(|()| state.broker.publish(&confirm));

    match published {
        Ok(()) => {
            telemetry.metrics.add_traced("orders_placed_total", &[], 1, &span_context);
            let mut log_attributes = Attributes::new();
            log_attributes.insert("order_id".to_string(), order_id.into());
            log_attributes.insert("product_id".to_string(), order.product_id.into());
            log_attributes.insert("quantity".to_string(), order.quantity.into());
            log_attributes.insert("task_id".to_string(), task_id.to_string().into());
            telemetry.events.log(
                &span_context,
                LogLevel::Info,
                "Order placed",
                log_attributes,
            );

            let mut close = Attributes::new();
            close.insert("order.id".to_string(), order_id.into());
            if let Err(e) = guard.finish(SpanStatus::Ok, close) {
                tracing::debug!(error = %e, order_id, "checkout_order already closed");
            }

            Json(json!({
                "message": "Order received, processing in the background",
                "order_id": order_id,
                "task_id": task_id.to_string(),
                "trace_id": context.trace_id().to_string(),
                "correlation_id": context.correlation_id().as_str(),
            }))
            .into_response()
        }
        Err(e) => {
            let status = match e {
                QueueError::Full { .. } | QueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
                QueueError::Envelope(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(error = %e, order_id, "Order could not be queued");
            telemetry.events.error(&span_context, format!("Order could not be queued: {}", e));
            let mut close = Attributes::new();
            close.insert("error.message".to_string(), e.to_string().into());
            if let Err(e) = guard.finish(SpanStatus::Error, close) {
                tracing::debug!(error = %e, order_id, "checkout_order already closed");
            }
            (status, Json(json!({ "detail": e.to_string() }))).into_response()
        }
    }
}

async fn metrics_snapshot(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "metrics": state.telemetry.metrics.snapshot(),
        "kind_conflicts": state.telemetry.metrics.kind_conflicts(),
        "pipelines": {
            "spans": state.telemetry.spans.dispatcher().stats(),
            "logs": state.telemetry.events.dispatcher().stats(),
        },
    }))
}
