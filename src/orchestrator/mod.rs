//! Batch orchestration -- bounded-concurrency dispatch of per-link pipelines.
//!
//! Split into focused submodules:
//! - [`barrier`] - Completion barrier counting in-flight pipelines
//! - [`pipeline`] - Per-link ping/speed state machine and sample consumer
//!
//! One control task per batch emits `started` and every `gotserver`, then
//! dispatches pipelines in link order while holding at most `concurrency`
//! permits, waits for all of them and emits `eof`.

mod barrier;
mod pipeline;


use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, EngineConfig};
use crate::error::Result;
use crate::links::LinkExtractor;
use crate::meter::{HttpThroughputMeter, LatencyProbe, TcpLatencyProbe, ThroughputMeter};
use crate::profile::LinkProfile;
use crate::reporter::ProgressReporter;
use crate::types::{LinkId, ProgressEvent, ProxyLink, RunOutcome, TestBatch};

use barrier::CompletionBarrier;
use pipeline::{PipelineContext, run_pipeline};

/// Reason carried by the `error` frame of a batch without links
pub const NO_LINKS_REASON: &str = "nonodes";

/// Runs test batches against shared collaborators
///
/// Cheap to clone; clones share collaborators and the shutdown token.
#[derive(Clone)]
pub struct TestOrchestrator {
    config: Arc<EngineConfig>,
    extractor: LinkExtractor,
    probe: Arc<dyn LatencyProbe>,
    meter: Arc<dyn ThroughputMeter>,
    shutdown: CancellationToken,
}

impl TestOrchestrator {
    /// Create an orchestrator with the default network collaborators
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] for invalid settings, [`crate::Error::Fetch`] when
    /// the HTTP client can't be built.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let engine = &config.engine;
        Ok(Self::with_collaborators(
            engine.clone(),
            LinkExtractor::from_config(engine)?,
            Arc::new(TcpLatencyProbe::new()),
            Arc::new(HttpThroughputMeter::from_config(engine)),
        ))
    }

    /// Create an orchestrator with caller-supplied collaborators
    pub fn with_collaborators(
        config: EngineConfig,
        extractor: LinkExtractor,
        probe: Arc<dyn LatencyProbe>,
        meter: Arc<dyn ThroughputMeter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
            probe,
            meter,
            shutdown: CancellationToken::new(),
        }
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh batch token that is cancelled when the engine shuts down
    pub fn batch_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancel every running and future batch
    pub fn shutdown(&self) {
        tracing::info!("Shutting down test orchestrator");
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Parse one inbound message into a batch
    pub async fn parse(&self, raw: &[u8]) -> Result<TestBatch> {
        crate::options::parse_message(raw, &self.extractor).await
    }

    /// Parse and run one inbound message
    ///
    /// A message that can't be parsed is reported as a single `error` frame and
    /// returned as the error; nothing else is emitted for it.
    pub async fn handle_message(
        &self,
        raw: &[u8],
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        match self.parse(raw).await {
            Ok(batch) => Ok(self.run(batch, reporter, cancel).await),
            Err(e) => {
                tracing::warn!(reason = e.reason(), error = %e, "Rejected batch message");
                reporter.emit_error(&e).await;
                Err(e)
            }
        }
    }

    /// Run one batch to completion or cancellation
    ///
    /// Event order: `started`, one `gotserver` per link addressed by position, per-link
    /// pipeline events, then a single `eof` once every dispatched pipeline has
    /// emitted `endone`. A batch without links emits one `error` instead. When
    /// `cancel` fires before every link has been dispatched, dispatch stops and
    /// no `eof` is emitted; pipelines already running finish on their own.
    pub async fn run(
        &self,
        batch: TestBatch,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let targets: Vec<(LinkId, ProxyLink)> = (0..)
            .map_while(|index| batch.target(index))
            .map(|(id, link)| (id, link.clone()))
            .collect();

        if targets.is_empty() {
            tracing::warn!("Batch has no links");
            reporter
                .emit(ProgressEvent::Error {
                    reason: NO_LINKS_REASON.to_string(),
                    message: None,
                })
                .await;
            return RunOutcome::NoLinks;
        }

        let options = Arc::new(batch.options);
        tracing::info!(
            links = targets.len(),
            concurrency = options.concurrency,
            mode = options.speed_test_mode.as_str(),
            test_mode = options.test_mode.as_i64(),
            group = %options.group_name,
            "Starting test batch"
        );

        reporter.emit(ProgressEvent::Started).await;
        // servers are listed by position; only pipelines use retest ids
        for (index, (_, link)) in targets.iter().enumerate() {
            let profile = LinkProfile::parse(link);
            reporter
                .emit(ProgressEvent::GotServer {
                    id: LinkId::from(index),
                    link: link.as_str().to_string(),
                    group: options.group_name.clone(),
                    remarks: profile.remarks,
                    protocol: profile.protocol,
                })
                .await;
        }

        let permits = options.concurrency.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let verbatim_links = options.has_overrides();
        let barrier = CompletionBarrier::new();

        for (id, link) in targets {
            // cancellation wins over a free permit
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        link_id = id.0,
                        in_flight = barrier.pending(),
                        "Test batch cancelled, dispatch stopped"
                    );
                    return RunOutcome::Cancelled;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };
            let permit = match permit {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!(link_id = id.0, "Concurrency limiter closed");
                    return RunOutcome::Cancelled;
                }
            };

            // released on drop for every pipeline, retest-addressed ones included
            let guard = barrier.register();
            // retest links are dialed as sent; batch descriptors lose their `^` suffix
            let link = if verbatim_links {
                link
            } else {
                ProxyLink::new(link.dial_target())
            };
            let ctx = PipelineContext {
                id,
                link,
                options: Arc::clone(&options),
                probe: Arc::clone(&self.probe),
                meter: Arc::clone(&self.meter),
                reporter: reporter.clone(),
                cancel: cancel.clone(),
                ping_budget: self.config.ping_budget,
                sample_capacity: self.config.sample_channel_capacity,
            };

            tracing::debug!(link_id = id.0, "Dispatching pipeline");
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                run_pipeline(ctx).await;
            });
        }

        barrier.wait().await;
        reporter.emit(ProgressEvent::Eof).await;
        tracing::info!("Test batch finished");
        RunOutcome::Completed
    }
}
