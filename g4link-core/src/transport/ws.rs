//! Binary WebSocket channel.
//!
//! One connection per frame: connect, send every chunk as a binary message
//! (`[row_start u16 LE][row_count u16 LE][payload]`), close. The controller
//! sends no per-chunk acknowledgement, so a send that completes without a
//! transport error counts as delivered.

use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::chunk::{Chunk, ChunkPlan};
use crate::error::{LinkError, TransportError};
use crate::frame::LevelMatrix;
use crate::transport::{Delivery, Endpoint, Timeouts, Transport};

// ── WsTransport ──────────────────────────────────────────────────

/// Per-frame WebSocket delivery to `ws://host:81/`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    timeouts: Timeouts,
}

impl WsTransport {
    pub fn new(endpoint: &Endpoint, timeouts: Timeouts) -> Self {
        Self::with_url(endpoint.ws_url(), timeouts)
    }

    /// Target an explicit `ws://` URL.
    pub fn with_url(url: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            url: url.into(),
            timeouts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the channel for one frame.
    pub async fn open(&self) -> Result<WsSession, TransportError> {
        let connect = connect_async(self.url.as_str());
        let (stream, _response) = tokio::time::timeout(self.timeouts.connect, connect)
            .await
            .map_err(|_| TransportError::Timeout(self.timeouts.connect))?
            .map_err(|e| TransportError::Connect {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;
        debug!(url = %self.url, "websocket connected");
        Ok(WsSession {
            stream,
            send_timeout: self.timeouts.request,
            sent: Delivery::default(),
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn send_frame(
        &self,
        levels: &LevelMatrix,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<Delivery, LinkError> {
        // Checked once per frame; a started frame always finishes.
        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }

        let mut session = self.open().await?;
        for (index, chunk) in plan.chunks(levels).enumerate() {
            if let Err(e) = session.send_chunk(&chunk).await {
                session.abort();
                return Err(TransportError::Send {
                    index,
                    row_start: chunk.range.row_start,
                    row_end: chunk.range.row_end(),
                    reason: e.to_string(),
                }
                .into());
            }
        }
        Ok(session.close().await)
    }
}

// ── WsSession ────────────────────────────────────────────────────

/// An open channel, valid for one frame's chunks.
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    send_timeout: Duration,
    sent: Delivery,
}

impl WsSession {
    /// Send one chunk as a single binary message.
    pub async fn send_chunk(&mut self, chunk: &Chunk) -> Result<(), TransportError> {
        let msg = Message::Binary(chunk.encode().to_vec());
        tokio::time::timeout(self.send_timeout, self.stream.send(msg))
            .await
            .map_err(|_| TransportError::Timeout(self.send_timeout))??;
        trace!(
            row_start = chunk.range.row_start,
            rows = chunk.range.row_count,
            "chunk sent"
        );
        self.sent.chunks += 1;
        self.sent.bytes += chunk.payload.len();
        Ok(())
    }

    /// Close the channel gracefully and report what was sent.
    pub async fn close(mut self) -> Delivery {
        let closing = tokio::time::timeout(self.send_timeout, self.stream.close(None)).await;
        match closing {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("websocket close: {e}"),
            Err(_) => debug!("websocket close timed out"),
        }
        self.sent
    }

    /// Drop the channel after a failure without waiting on the peer.
    fn abort(self) {
        drop(self.stream);
    }
}
