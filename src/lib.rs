//! # linkspeed
//!
//! Batch test engine for proxy links: measures latency and throughput for every
//! link of a batch and streams ordered progress events back to the requester.
//!
//! ## Design Philosophy
//!
//! linkspeed is designed to be:
//! - **Bounded** - A batch never runs more pipelines than its concurrency allows
//! - **Ordered** - Every link ends with exactly one `endone`, the batch with one `eof`
//! - **Cancellable** - Closing the requester's connection stops dispatch
//! - **Pluggable** - Probing, measuring and subscription fetching sit behind traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use linkspeed::{Config, ProgressReporter, TestOrchestrator};
//! use linkspeed::reporter::ChannelSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = TestOrchestrator::new(&Config::default())?;
//!
//!     // Frames arrive on the receiver as JSON text
//!     let (sink, mut frames) = ChannelSink::new();
//!     tokio::spawn(async move {
//!         while let Some(frame) = frames.recv().await {
//!             println!("{}", frame);
//!         }
//!     });
//!
//!     let batch = engine.parse(b"trojan://pw@example.com:443#tokyo^Friends^all^^^^4^30").await?;
//!     let outcome = engine
//!         .run(batch, ProgressReporter::new(sink), engine.batch_token())
//!         .await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Streaming speed sample aggregation
pub mod aggregator;
/// WebSocket API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Link extraction and subscription fetching
pub mod links;
/// Latency probe and throughput meter collaborators
pub mod meter;
/// Batch message parsing
pub mod options;
/// Batch orchestration and per-link pipelines
pub mod orchestrator;
/// Descriptor metadata
pub mod profile;
/// Progress frame reporting
pub mod reporter;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use aggregator::{SpeedAggregator, SpeedReading};
pub use config::{ApiConfig, Config, EngineConfig, ServerIntegrationConfig};
pub use error::{Error, Result};
pub use links::{HttpSubscriptionFetcher, LinkExtractor, SubscriptionFetcher};
pub use meter::{HttpThroughputMeter, LatencyProbe, TcpLatencyProbe, ThroughputMeter};
pub use orchestrator::TestOrchestrator;
pub use reporter::{FrameSink, ProgressReporter};
pub use types::{
    LinkId, ProgressEvent, ProxyLink, RunOutcome, SpeedTestMode, TestBatch, TestMode, TestOptions,
};

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then shuts the engine down, which
/// cancels every running batch and stops [`api::start_api_server`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use linkspeed::{Config, TestOrchestrator, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(Config::default());
///     let engine = Arc::new(TestOrchestrator::new(&config)?);
///
///     let server = tokio::spawn(linkspeed::api::start_api_server(engine.clone(), config));
///
///     // Run with automatic signal handling
///     run_with_shutdown(engine).await?;
///     server.await??;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: std::sync::Arc<TestOrchestrator>) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
