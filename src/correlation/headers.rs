//! Header extraction and injection.
//!
//! # Responsibilities
//! - Build a context from inbound headers at the ingress boundary
//! - Parse and format W3C `traceparent` and `baggage`
//! - Write the active context back onto outbound/response headers
//!
//! # Design Decisions
//! - Precedence: `traceparent` > correlation header > `x-request-id` > mint
//! - Unreadable or malformed headers are ignored, never rejected

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::CorrelationConfig;
use super::context::CorrelationContext;
use super::ids::{CorrelationId, SpanId, TraceId};

pub const X_CORRELATION_ID: &str = "x-correlation-id";
pub const X_REQUEST_ID: &str = "x-request-id";
pub const TRACEPARENT: &str = "traceparent";
pub const BAGGAGE: &str = "baggage";

const MAX_BAGGAGE_ENTRIES: usize = 64;

/// Parse a W3C `traceparent` header into its trace id and parent span id.
pub fn parse_traceparent(value: &str) -> Option<(TraceId, SpanId)> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if version.len() != 2 || version == "ff" || !version.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    // Version 00 has exactly four fields; later versions may append more.
    if version == "00" && parts.next().is_some() {
        return None;
    }
    if flags.len() != 2 || !flags.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    Some((trace_id.parse().ok()?, span_id.parse().ok()?))
}

/// Format the context as a sampled version-00 `traceparent`.
pub fn format_traceparent(context: &CorrelationContext) -> String {
    format!("00-{}-{}-01", context.trace_id(), context.current_span_id())
}

/// Parse a W3C `baggage` header. Entry properties after `;` are dropped.
pub fn parse_baggage(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|member| {
            let pair = member.split(';').next()?.trim();
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .take(MAX_BAGGAGE_ENTRIES)
        .collect()
}

pub fn format_baggage(baggage: &BTreeMap<String, String>) -> String {
    baggage
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the request's context from inbound headers.
pub fn extract(headers: &HeaderMap, config: &CorrelationConfig) -> CorrelationContext {
    let incoming = header_str(headers, &config.header_name)
        .or_else(|| {
            config
                .fallback_to_request_id
                .then(|| header_str(headers, X_REQUEST_ID))
                .flatten()
        })
        .filter(|v| v.len() <= config.max_length);

    let traceparent = config
        .accept_traceparent
        .then(|| header_str(headers, TRACEPARENT).and_then(parse_traceparent))
        .flatten();

    let context = match (traceparent, incoming) {
        (Some((trace_id, parent_span)), incoming) => {
            let correlation_id = incoming
                .and_then(CorrelationId::parse)
                .unwrap_or_else(|| CorrelationId::from(trace_id));
            CorrelationContext::remote(correlation_id, trace_id, parent_span, BTreeMap::new())
        }
        (None, Some(value)) => CorrelationContext::from_incoming(value),
        (None, None) => CorrelationContext::new_context(),
    };

    match header_str(headers, BAGGAGE) {
        Some(raw) => context.with_baggage_entries(parse_baggage(raw)),
        None => context,
    }
}

/// Write the context onto a header map (responses or outbound calls).
pub fn inject(context: &CorrelationContext, headers: &mut HeaderMap, header_name: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(header_name),
        HeaderValue::from_str(context.correlation_id().as_str()),
    ) {
        headers.insert(name, value);
    }

    if let Ok(value) = HeaderValue::from_str(&format_traceparent(context)) {
        headers.insert(TRACEPARENT, value);
    }

    if !context.baggage().is_empty() {
        match HeaderValue::from_str(&format_baggage(context.baggage())) {
            Ok(value) => {
                headers.insert(BAGGAGE, value);
            }
            Err(_) => tracing::debug!("Baggage not representable as a header, skipped"),
        }
    }
}
