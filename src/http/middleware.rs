//! Ingress middleware.
//!
//! # Responsibilities
//! - Build the request's correlation context from inbound headers
//! - Open the request's root span and close it with the response status
//! - Record HTTP request metrics with the trace id as exemplar
//! - Echo the correlation headers on the response
//!
//! # Design Decisions
//! - The span lives in a guard owned by the request future; a timed-out or
//!   disconnected request drops it and the span closes as cancelled
//! - Handlers get the context through the [`RequestContext`] extractor
//! - Metric labels and span names use the matched route template, so the
//!   number of series is bounded by the router, not by clients

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::correlation::{headers, CorrelationContext};
use crate::span::SpanStatus;
use crate::Attributes;
use super::server::AppState;

/// Endpoint label for requests no route matched.
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// The active context of the current request, as seen by handlers.
#[derive(Debug, Clone)]
pub struct RequestContext(pub CorrelationContext);

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Outside the middleware (unit-tested handlers) a fresh context is used.
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext(CorrelationContext::new_context())))
    }
}

/// Correlation, root span and request metrics for every request.
pub async fn telemetry_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let target = request.uri().path().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());

    let context = headers::extract(request.headers(), &state.config.correlation);
    let guard = state
        .telemetry
        .spans
        .enter(&context, format!("{} {}", method, endpoint));

    let mut attributes = Attributes::new();
    attributes.insert("http.method".to_string(), method.clone().into());
    attributes.insert("http.route".to_string(), endpoint.clone().into());
    attributes.insert("http.target".to_string(), target.clone().into());
    attributes.insert(
        "correlation_id".to_string(),
        context.correlation_id().as_str().into(),
    );
    guard.annotate(attributes);

    let span_context = guard.context().clone();
    tracing::debug!(
        correlation_id = %span_context.correlation_id(),
        trace_id = %span_context.trace_id(),
        method = %method,
        path = %target,
        "Request received"
    );
    request
        .extensions_mut()
        .insert(RequestContext(span_context.clone()));

    let mut response = next.run(request).await;

    let status = response.status().as_u16();
    let status_label = status.to_string();
    let metrics = &state.telemetry.metrics;
    metrics.add_traced(
        "http_requests_total",
        &[
            ("method", method.as_str()),
            ("endpoint", endpoint.as_str()),
            ("status_code", status_label.as_str()),
        ],
        1,
        &span_context,
    );
    metrics.observe_traced(
        "http_request_duration_seconds",
        &[("method", method.as_str()), ("endpoint", endpoint.as_str())],
        start.elapsed().as_secs_f64(),
        &span_context,
    );
    if status >= 400 {
        let error_type = format!("http_{}", status);
        metrics.add_traced(
            "http_request_errors_total",
            &[
                ("method", method.as_str()),
                ("endpoint", endpoint.as_str()),
                ("error_type", error_type.as_str()),
            ],
            1,
            &span_context,
        );
    }

    if state.config.correlation.echo_response_headers {
        headers::inject(
            &span_context,
            response.headers_mut(),
            &state.config.correlation.header_name,
        );
    }

    let span_status = if status >= 500 {
        SpanStatus::Error
    } else {
        SpanStatus::Ok
    };
    let mut close_attributes = Attributes::new();
    close_attributes.insert("http.status_code".to_string(), status.into());
    if let Err(e) = guard.finish(span_status, close_attributes) {
        tracing::debug!(error = %e, "Request span already closed");
    }

    response
}
