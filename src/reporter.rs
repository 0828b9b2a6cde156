//! Progress reporting -- serializes events and writes them to the shared sink.
//!
//! Every pipeline of a batch and the batch scheduler itself write through one
//! [`ProgressReporter`]. Writes are serialized under a single async mutex so two
//! frames never interleave; their relative order across links is unspecified.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::ProgressEvent;

/// Outbound half of the duplex channel a subscriber listens on
#[async_trait::async_trait]
pub trait FrameSink: Send {
    /// Deliver one complete frame
    async fn send_frame(&mut self, frame: String) -> Result<()>;
}

/// [`FrameSink`] that forwards frames into an unbounded channel
///
/// Fails once the receiving side is gone.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver its frames arrive on
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::Transport("frame receiver dropped".to_string()))
    }
}

/// Builds frames and writes them to the shared sink
///
/// Cheap to clone; clones share the sink and its lock.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
}

impl ProgressReporter {
    /// Wrap `sink`
    pub fn new(sink: impl FrameSink + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Serialize `event` into a frame
    pub fn frame(event: &ProgressEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }

    /// Write one event, best effort
    ///
    /// Failures are logged and dropped; the transport owns connection health.
    pub async fn emit(&self, event: ProgressEvent) {
        let frame = match Self::frame(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(kind = event.kind(), error = %e, "Failed to serialize progress event");
                return;
            }
        };

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send_frame(frame).await {
            tracing::debug!(kind = event.kind(), error = %e, "Dropped progress frame");
        }
    }

    /// Write a batch-level error frame for `error`
    pub async fn emit_error(&self, error: &Error) {
        self.emit(ProgressEvent::Error {
            reason: error.reason().to_string(),
            message: Some(error.to_string()),
        })
        .await;
    }
}
