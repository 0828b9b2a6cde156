//! Measurement collaborators -- latency probe and throughput meter.
//!
//! The orchestrator only sees the [`LatencyProbe`] and [`ThroughputMeter`] traits.
//! The defaults here measure from the host network: [`TcpLatencyProbe`] times a
//! TCP connect to the server named by the descriptor and [`HttpThroughputMeter`]
//! downloads a test file while streaming per-interval samples.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::profile::LinkProfile;
use crate::types::ProxyLink;

/// Measures round-trip latency through one link
#[async_trait::async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Elapsed milliseconds; values below 1 mean failure
    async fn probe(&self, link: &ProxyLink, budget: Duration) -> Result<i64>;
}

/// Measures download throughput through one link
#[async_trait::async_trait]
pub trait ThroughputMeter: Send + Sync {
    /// Stream bytes-per-second samples into `sink` while measuring
    ///
    /// Returns the overall result in bytes per second; values below 1 mean
    /// failure. `sink` is dropped on return, which ends the sample stream.
    async fn measure(
        &self,
        link: &ProxyLink,
        connect_timeout: Duration,
        total_timeout: Duration,
        sink: mpsc::Sender<i64>,
    ) -> Result<i64>;
}

/// [`LatencyProbe`] that times a TCP connect to the link's server
#[derive(Clone, Debug, Default)]
pub struct TcpLatencyProbe;

impl TcpLatencyProbe {
    /// Create a probe
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl LatencyProbe for TcpLatencyProbe {
    async fn probe(&self, link: &ProxyLink, budget: Duration) -> Result<i64> {
        let profile = LinkProfile::parse(link);
        let Some(endpoint) = profile.endpoint() else {
            return Err(Error::Probe(format!(
                "no server endpoint in {} link",
                profile.protocol
            )));
        };

        let start = Instant::now();
        let connect = tokio::net::TcpStream::connect(endpoint.as_str());
        match tokio::time::timeout(budget, connect).await {
            Ok(Ok(_stream)) => Ok((start.elapsed().as_millis() as i64).max(1)),
            Ok(Err(e)) => Err(Error::Probe(format!("connect to {} failed: {}", endpoint, e))),
            Err(_) => Err(Error::Probe(format!(
                "connect to {} exceeded {}ms",
                endpoint,
                budget.as_millis()
            ))),
        }
    }
}

/// [`ThroughputMeter`] that downloads a test file over HTTP
///
/// The download goes out over the host network, not through the proxy, so every
/// link measures the same route and `link` only labels log lines. Plug in a
/// proxy-aware meter through [`crate::TestOrchestrator::with_collaborators`] for
/// per-link numbers.
#[derive(Clone, Debug)]
pub struct HttpThroughputMeter {
    url: String,
    sample_interval: Duration,
}

impl HttpThroughputMeter {
    /// Create a meter downloading `url` and sampling every `sample_interval`
    pub fn new(url: impl Into<String>, sample_interval: Duration) -> Self {
        Self {
            url: url.into(),
            sample_interval,
        }
    }

    /// Create a meter from engine settings
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.speed_test_url.clone(), config.sample_interval)
    }
}

fn bytes_per_second(bytes: u64, elapsed: Duration) -> i64 {
    let millis = elapsed.as_millis().max(1);
    i64::try_from(u128::from(bytes) * 1000 / millis).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl ThroughputMeter for HttpThroughputMeter {
    async fn measure(
        &self,
        link: &ProxyLink,
        connect_timeout: Duration,
        total_timeout: Duration,
        sink: mpsc::Sender<i64>,
    ) -> Result<i64> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .build()
            .map_err(|e| Error::Throughput(format!("Failed to create HTTP client: {}", e)))?;

        let mut response = client.get(&self.url).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!(
                    "Timeout requesting '{}' (exceeded {} seconds)",
                    self.url,
                    total_timeout.as_secs()
                )
            } else if e.is_connect() {
                format!("Connection failed for '{}': {}", self.url, e)
            } else {
                format!("Failed to request '{}': {}", self.url, e)
            };
            Error::Throughput(message)
        })?;

        if !response.status().is_success() {
            return Err(Error::Throughput(format!(
                "HTTP error from speed test endpoint: {} {}",
                response.status(),
                self.url
            )));
        }

        let start = Instant::now();
        let mut window_start = start;
        let mut window_bytes: u64 = 0;
        let mut total_bytes: u64 = 0;

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    window_bytes += chunk.len() as u64;
                    total_bytes += chunk.len() as u64;
                }
                Ok(None) => break,
                // a timeout mid-body still counts what arrived
                Err(e) if e.is_timeout() => break,
                Err(e) => {
                    tracing::debug!(link = %link, error = %e, "Speed test body read failed");
                    break;
                }
            }

            let window = window_start.elapsed();
            if window >= self.sample_interval {
                sink.send(bytes_per_second(window_bytes, window)).await.ok();
                window_start = Instant::now();
                window_bytes = 0;
            }
        }

        // flush the partial window so short downloads still report a sample
        if window_bytes > 0 {
            sink.send(bytes_per_second(window_bytes, window_start.elapsed()))
                .await
                .ok();
        }

        if total_bytes == 0 {
            return Err(Error::Throughput(format!(
                "no data received from '{}'",
                self.url
            )));
        }
        Ok(bytes_per_second(total_bytes, start.elapsed()).max(1))
    }
}
