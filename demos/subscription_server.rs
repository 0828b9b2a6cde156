//! WebSocket test server example
//!
//! This example runs linkspeed with the default network collaborators and the
//! WebSocket API enabled.
//!
//! After starting, connect a WebSocket client to ws://127.0.0.1:10888/test and
//! send a batch request, for example:
//!
//! ```text
//! trojan://password@example.com:443#tokyo^Friends^all^^^^4^30
//! ```
//!
//! or a subscription URL followed by the same options. Set `RUST_LOG=debug` to
//! see per-link pipeline transitions.

use std::sync::Arc;
use linkspeed::api::start_api_server;
use linkspeed::config::{ApiConfig, Config, EngineConfig, ServerIntegrationConfig};
use linkspeed::{TestOrchestrator, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config {
        engine: EngineConfig {
            max_subscription_depth: 2,
            ..Default::default()
        },
        server: ServerIntegrationConfig {
            api: ApiConfig::default(),
        },
    };
    config.validate()?;

    let engine = Arc::new(TestOrchestrator::new(&config)?);
    let config = Arc::new(config);

    println!("Starting linkspeed WebSocket server");
    println!("Health:  http://{}/health", config.server.api.bind_address);
    println!("Tests:   ws://{}/test", config.server.api.bind_address);
    println!();
    println!("Press Ctrl+C to stop");

    let server = tokio::spawn(start_api_server(engine.clone(), config));

    run_with_shutdown(engine).await?;
    server.await??;

    println!("Server stopped");
    Ok(())
}
