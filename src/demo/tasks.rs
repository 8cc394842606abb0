//! Background tasks of the record-store demo.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::{TaskContext, TaskError, TaskRegistry};
use crate::span::SpanStatus;
use crate::Attributes;

pub const PROCESS_ORDER: &str = "process_order";
pub const SEND_ORDER_CONFIRMATION: &str = "send_order_confirmation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order_id: u64,
    pub product_id: u64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    pub order_id: u64,
}

/// Handlers for the demo tasks. `simulated_work` stands in for the real
/// fulfilment time.
pub fn registry(simulated_work: Duration) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register(PROCESS_ORDER, move |ctx: TaskContext, payload: Value| {
        process_order(ctx, payload, simulated_work)
    });
    registry.register(SEND_ORDER_CONFIRMATION, send_order_confirmation);
    registry
}

async fn process_order(ctx: TaskContext, payload: Value, simulated_work: Duration) -> Result<(), TaskError> {
    let order: OrderPayload = serde_json::from_value(payload)?;
    let telemetry = &ctx.telemetry;
    let started = Instant::now();

    let guard = telemetry.spans.enter(&ctx.context, "order.fulfil");
    let mut attributes = Attributes::new();
    attributes.insert("order.id".to_string(), order.order_id.into());
    attributes.insert("order.quantity".to_string(), order.quantity.into());
    guard.annotate(attributes);

    tokio::time::sleep(simulated_work).await;

    telemetry.events.info(
        guard.context(),
        format!("Order {} processed: product {} x{}", order.order_id, order.product_id, order.quantity),
    );
    guard.finish(SpanStatus::Ok, Attributes::new())?;

    telemetry.metrics.observe_traced(
        "order_processing_time_seconds",
        &[],
        started.elapsed().as_secs_f64(),
        &ctx.context,
    );
    Ok(())
}

async fn send_order_confirmation(ctx: TaskContext, payload: Value) -> Result<(), TaskError> {
    let confirmation: ConfirmationPayload = serde_json::from_value(payload)?;
    let telemetry = &ctx.telemetry;

    let guard = telemetry.spans.enter(&ctx.context, "email.send");
    let mut attributes = Attributes::new();
    attributes.insert("order.id".to_string(), confirmation.order_id.into());
    guard.annotate(attributes);
    telemetry.events.info(
        guard.context(),
        format!("Confirmation sent for order {}", confirmation.order_id),
    );
    guard.finish(SpanStatus::Ok, Attributes::new())?;
    Ok(())
}
