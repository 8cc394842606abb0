//! Record-store telemetry shim.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http ingress ──▶ correlation context ──▶ root span
//!                         │                                       │
//!                         ▼                                       ▼
//!                     demo routes ──▶ child spans, log events, metrics
//!                         │
//!                         ▼ queue hop (envelope carries the context)
//!                     workers ──▶ task.<name> span, same trace
//!
//!     spans / logs ──▶ bounded dispatchers ──▶ sinks (stdout, http)
//!     metrics      ──▶ aggregator ──▶ GET /metrics (Prometheus text)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use record_store_telemetry::config::{load_config, TelemetryConfig};
use record_store_telemetry::lifecycle::{shutdown_on_signal, Application};
use record_store_telemetry::observability::logging;

#[derive(Parser)]
#[command(name = "record-store-telemetry")]
#[command(about = "Correlation and telemetry shim for the record-store demo", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => TelemetryConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "record-store-telemetry starting");
    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        bind_address = %config.listener.bind_address,
        span_sink = ?config.sinks.spans.kind,
        log_sink = ?config.sinks.logs.kind,
        workers = config.queue.workers,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let app = Application::start(config, listener).await?;
    tracing::info!(address = %app.local_addr(), "Listening for connections");

    tokio::spawn(shutdown_on_signal(app.shutdown_handle()));
    app.run_until_stopped().await?;
    Ok(())
}
