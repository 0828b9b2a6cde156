//! Per-link pipeline -- optional latency probe followed by a throughput measurement.
//!
//! ```text
//! idle -> pinging -> { ping_failed, ping_only } ---------------> finished
//!      \-(speed only)-> speedtesting -> { done, speed_failed } -> finished
//! ```
//!
//! Every path ends with exactly one `endone` for the link.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregator::SpeedAggregator;
use crate::meter::{LatencyProbe, ThroughputMeter};
use crate::profile::LinkProfile;
use crate::reporter::ProgressReporter;
use crate::types::{LinkId, ProgressEvent, ProxyLink, SpeedTestMode, TestOptions};
use crate::utils::byte_count_iec;

/// How one pipeline finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PipelineOutcome {
    /// Throughput measured
    Done,
    /// Probe failed or returned less than 1ms
    PingFailed,
    /// Ping-only mode; no measurement was attempted
    PingOnly,
    /// Meter failed or measured less than 1 B/s
    SpeedFailed,
}

impl PipelineOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            PipelineOutcome::Done => "done",
            PipelineOutcome::PingFailed => "ping_failed",
            PipelineOutcome::PingOnly => "ping_only",
            PipelineOutcome::SpeedFailed => "speed_failed",
        }
    }
}

/// Everything one pipeline needs, so the spawned task owns its inputs
pub(crate) struct PipelineContext {
    pub(crate) id: LinkId,
    /// Descriptor handed to the collaborators as-is
    pub(crate) link: ProxyLink,
    pub(crate) options: Arc<TestOptions>,
    pub(crate) probe: Arc<dyn LatencyProbe>,
    pub(crate) meter: Arc<dyn ThroughputMeter>,
    pub(crate) reporter: ProgressReporter,
    pub(crate) cancel: CancellationToken,
    pub(crate) ping_budget: Duration,
    pub(crate) sample_capacity: usize,
}

/// Run the full pipeline for one link, always finishing with `endone`
pub(crate) async fn run_pipeline(ctx: PipelineContext) -> PipelineOutcome {
    let outcome = match ping_phase(&ctx).await {
        Some(outcome) => outcome,
        None => speed_phase(&ctx).await,
    };

    ctx.reporter.emit(ProgressEvent::EndOne { id: ctx.id }).await;
    tracing::debug!(
        link_id = ctx.id.0,
        outcome = outcome.as_str(),
        "Pipeline finished"
    );
    outcome
}

/// Returns `Some` when the pipeline ends without a throughput measurement
async fn ping_phase(ctx: &PipelineContext) -> Option<PipelineOutcome> {
    let mode = ctx.options.speed_test_mode;
    if mode == SpeedTestMode::SpeedOnly {
        return None;
    }

    ctx.reporter
        .emit(ProgressEvent::StartPing { id: ctx.id })
        .await;

    let probe = ctx.probe.probe(&ctx.link, ctx.ping_budget);
    let ping = match tokio::time::timeout(ctx.ping_budget, probe).await {
        Ok(Ok(ms)) => ms,
        Ok(Err(e)) => {
            tracing::warn!(link_id = ctx.id.0, error = %e, "Latency probe failed");
            0
        }
        Err(_) => {
            tracing::warn!(
                link_id = ctx.id.0,
                budget_ms = ctx.ping_budget.as_millis() as u64,
                "Latency probe exceeded its budget"
            );
            0
        }
    };

    ctx.reporter
        .emit(ProgressEvent::GotPing { id: ctx.id, ping })
        .await;

    if ping < 1 {
        ctx.reporter.emit(ProgressEvent::speed_sentinel(ctx.id)).await;
        return Some(PipelineOutcome::PingFailed);
    }
    if mode == SpeedTestMode::PingOnly {
        ctx.reporter.emit(ProgressEvent::speed_sentinel(ctx.id)).await;
        return Some(PipelineOutcome::PingOnly);
    }
    None
}

async fn speed_phase(ctx: &PipelineContext) -> PipelineOutcome {
    ctx.reporter
        .emit(ProgressEvent::StartSpeed { id: ctx.id })
        .await;

    let (tx, rx) = mpsc::channel(ctx.sample_capacity.max(1));
    let name = LinkProfile::parse(&ctx.link).display_name(ctx.id.0);
    let consumer = tokio::spawn(consume_samples(
        ctx.id,
        name,
        rx,
        ctx.reporter.clone(),
        ctx.cancel.clone(),
    ));

    let timeout = ctx.options.timeout;
    let result = match ctx.meter.measure(&ctx.link, timeout, timeout, tx).await {
        Ok(bytes_per_second) => bytes_per_second,
        Err(e) => {
            tracing::warn!(link_id = ctx.id.0, error = %e, "Throughput measurement failed");
            0
        }
    };

    // every gotspeed must be written before endone
    if let Err(e) = consumer.await {
        tracing::warn!(link_id = ctx.id.0, error = %e, "Sample consumer task failed");
    }

    if result < 1 {
        ctx.reporter.emit(ProgressEvent::speed_sentinel(ctx.id)).await;
        return PipelineOutcome::SpeedFailed;
    }
    tracing::debug!(
        link_id = ctx.id.0,
        speed = %format!("{}/s", byte_count_iec(result)),
        "Throughput measured"
    );
    PipelineOutcome::Done
}

/// Feed samples into a [`SpeedAggregator`] until the stream ends or the batch is cancelled
async fn consume_samples(
    id: LinkId,
    name: String,
    mut rx: mpsc::Receiver<i64>,
    reporter: ProgressReporter,
    cancel: CancellationToken,
) {
    let mut aggregator = SpeedAggregator::new();
    loop {
        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(link_id = id.0, "Sample consumer cancelled");
                break;
            }
            sample = rx.recv() => sample,
        };
        let Some(sample) = sample else {
            break;
        };
        let Some(reading) = aggregator.push(sample) else {
            break;
        };
        tracing::debug!(
            link_id = id.0,
            name = %name,
            speed = %format!("{}/s", byte_count_iec(sample)),
            "Speed sample received"
        );
        reporter
            .emit(ProgressEvent::GotSpeed {
                id,
                average: reading.average,
                maximum: reading.maximum,
                current: reading.current,
            })
            .await;
    }
}
