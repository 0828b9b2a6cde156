//! Shared fakes for unit tests: subscription fetcher, probe, meter and frame capture.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::links::SubscriptionFetcher;
use crate::meter::{LatencyProbe, ThroughputMeter};
use crate::reporter::{ChannelSink, ProgressReporter};
use crate::types::{ProgressEvent, ProxyLink};

/// Serves canned subscription bodies and counts fetches
#[derive(Default)]
pub(crate) struct StaticFetcher {
    bodies: HashMap<String, String>,
    pub(crate) calls: Arc<AtomicUsize>,
}

impl StaticFetcher {
    pub(crate) fn with_body(url: &str, body: &str) -> Self {
        let mut fetcher = Self::default();
        fetcher.bodies.insert(url.to_string(), body.to_string());
        fetcher
    }
}

#[async_trait::async_trait]
impl SubscriptionFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("HTTP error fetching subscription: 404 {}", url)))
    }
}

/// Latency probe answering from a table keyed by dial target
///
/// Links missing from the table get `default`; a negative entry is reported as
/// a probe error.
pub(crate) struct FixedProbe {
    pings: HashMap<String, i64>,
    default: i64,
    pub(crate) seen: Arc<std::sync::Mutex<Vec<String>>>,
}

impl FixedProbe {
    pub(crate) fn always(ping: i64) -> Self {
        Self {
            pings: HashMap::new(),
            default: ping,
            seen: Arc::default(),
        }
    }

    pub(crate) fn with(mut self, link: &str, ping: i64) -> Self {
        self.pings.insert(link.to_string(), ping);
        self
    }
}

#[async_trait::async_trait]
impl LatencyProbe for FixedProbe {
    async fn probe(&self, link: &ProxyLink, _budget: Duration) -> Result<i64> {
        self.seen.lock().unwrap().push(link.as_str().to_string());
        let ping = self.pings.get(link.as_str()).copied().unwrap_or(self.default);
        if ping < 0 {
            return Err(Error::Probe(format!("unreachable: {}", link)));
        }
        Ok(ping)
    }
}

/// Throughput meter that replays a fixed sample script
///
/// Tracks how many measurements overlap so tests can assert the concurrency
/// bound.
pub(crate) struct ScriptedMeter {
    samples: Vec<i64>,
    result: i64,
    delay: Duration,
    active: AtomicUsize,
    pub(crate) peak: Arc<AtomicUsize>,
    pub(crate) calls: Arc<AtomicUsize>,
    pub(crate) seen: Arc<std::sync::Mutex<Vec<String>>>,
}

impl ScriptedMeter {
    pub(crate) fn new(samples: Vec<i64>, result: i64) -> Self {
        Self {
            samples,
            result,
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            peak: Arc::default(),
            calls: Arc::default(),
            seen: Arc::default(),
        }
    }

    /// Sleep this long between samples
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl ThroughputMeter for ScriptedMeter {
    async fn measure(
        &self,
        link: &ProxyLink,
        _connect_timeout: Duration,
        _total_timeout: Duration,
        sink: mpsc::Sender<i64>,
    ) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(link.as_str().to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        for sample in &self.samples {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            sink.send(*sample).await.ok();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.result < 0 {
            return Err(Error::Throughput("scripted failure".to_string()));
        }
        Ok(self.result)
    }
}

/// Reporter whose frames land in the returned receiver
pub(crate) fn capture_reporter() -> (ProgressReporter, mpsc::UnboundedReceiver<String>) {
    let (sink, rx) = ChannelSink::new();
    (ProgressReporter::new(sink), rx)
}

/// Every frame received so far, decoded
pub(crate) fn drain_events(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        events.push(serde_json::from_str(&frame).unwrap());
    }
    events
}
