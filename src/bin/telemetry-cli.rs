use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "telemetry-cli")]
#[command(about = "Drive traffic against the record-store telemetry shim", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Correlation id to send; a fresh one per request when omitted.
    #[arg(short, long)]
    correlation_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service health and pipeline counters
    Health {
        /// Poll until healthy, up to this many seconds
        #[arg(long, default_value_t = 0)]
        wait: u64,
    },
    /// Print the Prometheus scrape output
    Metrics,
    /// Create a test span
    TraceTest,
    /// Place one order
    Checkout {
        #[arg(long, default_value_t = 1)]
        product_id: u64,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
    /// Send a burst of mixed traffic
    Generate {
        #[arg(long, default_value_t = 20)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    match cli.command {
        Commands::Health { wait } => {
            let deadline = Instant::now() + Duration::from_secs(wait);
            loop {
                match client.get(format!("{}/health", cli.url)).send().await {
                    Ok(res) if res.status().is_success() => {
                        print_response(res).await?;
                        break;
                    }
                    Ok(res) if Instant::now() >= deadline => {
                        print_response(res).await?;
                        break;
                    }
                    Err(e) if Instant::now() >= deadline => return Err(e.into()),
                    _ => tokio::time::sleep(Duration::from_millis(500)).await,
                }
            }
        }
        Commands::Metrics => {
            let res = client.get(format!("{}/metrics", cli.url)).send().await?;
            println!("{}", res.text().await?);
        }
        Commands::TraceTest => {
            let res = client
                .get(format!("{}/trace-test", cli.url))
                .headers(correlation_headers(&cli.correlation_id)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Checkout { product_id, quantity } => {
            let res = client
                .post(format!("{}/checkout", cli.url))
                .headers(correlation_headers(&cli.correlation_id)?)
                .json(&json!({ "product_id": product_id, "quantity": quantity }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Generate { count } => {
            let mut failures = 0;
            for i in 0..count {
                let headers = correlation_headers(&cli.correlation_id)?;
                let request = match i % 3 {
                    0 => client.get(format!("{}/", cli.url)),
                    1 => client.get(format!("{}/trace-test", cli.url)),
                    _ => client
                        .post(format!("{}/checkout", cli.url))
                        .json(&json!({ "product_id": 1 + u64::from(i % 5), "quantity": 1 + i % 3 })),
                };
                match request.headers(headers).send().await {
                    Ok(res) if res.status().is_success() => {}
                    Ok(res) => {
                        failures += 1;
                        eprintln!("Request {} returned {}", i, res.status());
                    }
                    Err(e) => {
                        failures += 1;
                        eprintln!("Request {} failed: {}", i, e);
                    }
                }
            }
            println!("Sent {} requests, {} failed", count, failures);
        }
    }

    Ok(())
}

fn correlation_headers(fixed: &Option<String>) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let id = fixed.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut headers = HeaderMap::new();
    headers.insert("x-correlation-id", HeaderValue::from_str(&id)?);
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let correlation = res
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let traceparent = res
        .headers()
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
    }
    if let Some(id) = correlation {
        eprintln!("x-correlation-id: {}", id);
    }
    if let Some(tp) = traceparent {
        eprintln!("traceparent: {}", tp);
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
