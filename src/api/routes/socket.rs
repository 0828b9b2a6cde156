//! WebSocket batch endpoint.
//!
//! Each inbound text or binary message is one batch request. Progress frames
//! for every batch of the connection share the socket's outbound half; batches
//! run concurrently and are cancelled together when the socket closes.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::reporter::{FrameSink, ProgressReporter};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

/// Outbound half of a WebSocket as a [`FrameSink`]
struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.inner
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// GET /test - Upgrade to a WebSocket that runs batch tests
pub async fn test_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let reporter = ProgressReporter::new(WebSocketSink { inner: sender });
    let cancel = state.engine.batch_token();

    tracing::debug!("Test socket connected");

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = receiver.next() => message,
        };

        let raw = match message {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Test socket read failed");
                break;
            }
        };

        let engine = state.engine.clone();
        let reporter = reporter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            // rejected messages are already reported on the socket
            let _ = engine.handle_message(&raw, reporter, cancel).await;
        });
    }

    cancel.cancel();
    tracing::debug!("Test socket closed, batches cancelled");
}
