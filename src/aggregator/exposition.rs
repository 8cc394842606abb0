//! Prometheus text exposition, format version 0.0.4.

use std::fmt::Write;

use super::sample::{Labels, MetricKind, MetricSample};

/// Content type of the rendered text.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples. Input must be grouped by name (as `snapshot` returns it).
pub fn render(samples: &[MetricSample]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;

    for sample in samples {
        if current != Some(sample.name.as_str()) {
            let _ = writeln!(out, "# TYPE {} {}", sample.name, sample.kind.as_str());
            current = Some(sample.name.as_str());
        }

        match (sample.kind, &sample.histogram) {
            (MetricKind::Histogram, Some(histogram)) => {
                for bucket in &histogram.buckets {
                    let le = format_value(bucket.le);
                    let _ = writeln!(
                        out,
                        "{}_bucket{} {}",
                        sample.name,
                        format_labels(&sample.labels, Some(&le)),
                        bucket.count
                    );
                }
                let _ = writeln!(
                    out,
                    "{}_bucket{} {}",
                    sample.name,
                    format_labels(&sample.labels, Some("+Inf")),
                    histogram.count
                );
                let labels = format_labels(&sample.labels, None);
                let _ = writeln!(out, "{}_sum{} {}", sample.name, labels, format_value(histogram.sum));
                let _ = writeln!(out, "{}_count{} {}", sample.name, labels, histogram.count);
            }
            _ => {
                let _ = writeln!(
                    out,
                    "{}{} {}",
                    sample.name,
                    format_labels(&sample.labels, None),
                    format_value(sample.value)
                );
            }
        }
    }
    out
}

fn format_labels(labels: &Labels, le: Option<&str>) -> String {
    if labels.is_empty() && le.is_none() {
        return String::new();
    }
    let mut pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{}\"", le));
    }
    format!("{{{}}}", pairs.join(","))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
