//! JSON batch export to an HTTP collector.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::config::ExportRetryConfig;
use crate::resilience::retries::retry_transient;
use super::{Sink, SinkError};

/// POSTs each batch as a JSON array to `endpoint`.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    retry: ExportRetryConfig,
}

impl HttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: ExportRetryConfig,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("record-store-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            retry,
        })
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Status(status.as_u16()))
        }
    }
}

impl<T> Sink<T> for HttpSink
where
    T: Serialize + Sync,
{
    fn name(&self) -> &'static str {
        "http"
    }

    async fn export(&self, batch: &[T]) -> Result<(), SinkError> {
        let body = serde_json::to_vec(batch)?;
        retry_transient(&self.retry, || self.post(body.clone())).await
    }
}
