//! Common test utilities for linkspeed integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use linkspeed::reporter::ChannelSink;
use linkspeed::{
    EngineConfig, LatencyProbe, LinkExtractor, ProgressEvent, ProgressReporter, ProxyLink,
    Result, SubscriptionFetcher, TestOrchestrator, ThroughputMeter,
};
use tokio::sync::mpsc;

/// Probe that answers with a fixed latency for every link
pub struct ConstantProbe(pub i64);

#[async_trait::async_trait]
impl LatencyProbe for ConstantProbe {
    async fn probe(&self, _link: &ProxyLink, _budget: Duration) -> Result<i64> {
        Ok(self.0)
    }
}

/// Meter that streams a fixed sample list and returns their last value
pub struct SampleMeter(pub Vec<i64>);

#[async_trait::async_trait]
impl ThroughputMeter for SampleMeter {
    async fn measure(
        &self,
        _link: &ProxyLink,
        _connect_timeout: Duration,
        _total_timeout: Duration,
        sink: mpsc::Sender<i64>,
    ) -> Result<i64> {
        for sample in &self.0 {
            sink.send(*sample).await.ok();
        }
        Ok(self.0.last().copied().unwrap_or(0))
    }
}

/// Fetcher serving canned subscription bodies
#[derive(Default)]
pub struct MapFetcher(pub HashMap<String, String>);

#[async_trait::async_trait]
impl SubscriptionFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.0
            .get(url)
            .cloned()
            .ok_or_else(|| linkspeed::Error::Fetch(format!("unknown subscription {}", url)))
    }
}

/// Engine wired to the fakes above
pub fn test_engine(ping: i64, samples: Vec<i64>, fetcher: MapFetcher) -> TestOrchestrator {
    TestOrchestrator::with_collaborators(
        EngineConfig::default(),
        LinkExtractor::new(Arc::new(fetcher), 3),
        Arc::new(ConstantProbe(ping)),
        Arc::new(SampleMeter(samples)),
    )
}

/// Reporter capturing frames into a channel
pub fn capture() -> (ProgressReporter, mpsc::UnboundedReceiver<String>) {
    let (sink, rx) = ChannelSink::new();
    (ProgressReporter::new(sink), rx)
}

/// Decode every frame received so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        events.push(serde_json::from_str(&frame).unwrap());
    }
    events
}
