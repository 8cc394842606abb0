//! Newline-delimited JSON on stdout.
//!
//! Container log shippers (Fluent Bit, Promtail) tail stdout and forward each
//! line to the log aggregator, so this is the default sink.

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use super::{Sink, SinkError};

#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl<T> Sink<T> for StdoutSink
where
    T: Serialize + Sync,
{
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn export(&self, batch: &[T]) -> Result<(), SinkError> {
        let mut buf = Vec::with_capacity(batch.len() * 256);
        for record in batch {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&buf).await?;
        stdout.flush().await?;
        Ok(())
    }
}
