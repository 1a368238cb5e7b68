//! Delivery of quantized frames to the panel controller.
//!
//! Three interchangeable strategies implement [`Transport`]:
//!
//! | Kind                        | Wire                                              |
//! |-----------------------------|---------------------------------------------------|
//! | [`TransportKind::WebSocket`]| `ws://host:81/`, one binary message per chunk      |
//! | [`TransportKind::ChunkPush`]| `POST /stream-chunk?rowStart=&rows=&packed=1`      |
//! | [`TransportKind::UploadApply`]| `POST /upload` (whole frame) then `POST /apply` |
//!
//! Chunks are always sent strictly in row order, one frame at a time.
//! Cancellation is cooperative: the WebSocket transport checks it once per
//! frame, the chunk-push transport before every chunk, and upload-apply
//! before the upload.

pub mod http;
pub mod ws;

pub use http::{ChunkPushTransport, HealthReport, HttpClient, StatusLine, UploadApplyTransport};
pub use ws::{WsSession, WsTransport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::chunk::ChunkPlan;
use crate::error::{ConfigError, LinkError};
use crate::frame::LevelMatrix;

// ── Delivery ─────────────────────────────────────────────────────

/// What a completed frame delivery put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Chunks (or uploads) that completed.
    pub chunks: usize,
    /// Payload bytes sent, headers excluded.
    pub bytes: usize,
}

// ── Transport ────────────────────────────────────────────────────

/// A strategy for getting one frame of levels onto the panel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Deliver `levels` partitioned by `plan`.
    ///
    /// Returns on the first failed chunk; earlier chunks stay applied.
    async fn send_frame(
        &self,
        levels: &LevelMatrix,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<Delivery, LinkError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn send_frame(
        &self,
        levels: &LevelMatrix,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<Delivery, LinkError> {
        (**self).send_frame(levels, plan, cancel).await
    }
}

// ── TransportKind ────────────────────────────────────────────────

/// Which delivery strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Binary chunks over a per-frame WebSocket connection.
    #[default]
    #[serde(rename = "websocket")]
    WebSocket,
    /// One HTTP request per chunk; the panel may tear while updating.
    ChunkPush,
    /// Whole-frame upload followed by an explicit swap.
    UploadApply,
}

// ── Endpoint ─────────────────────────────────────────────────────

/// Network address of the panel controller.
///
/// HTTP requests go to `host[:http_port]`; the WebSocket channel always
/// uses `host:ws_port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    http_port: Option<u16>,
    ws_port: u16,
}

/// Default WebSocket port of the controller firmware.
pub const DEFAULT_WS_PORT: u16 = 81;

impl Endpoint {
    /// Accepts a bare host (`192.168.1.189`), a host with an HTTP port
    /// (`192.168.1.189:8080`) or an HTTP URL (`http://192.168.1.189/`).
    pub fn new(host: &str, ws_port: u16) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidHost(host.to_string());
        let trimmed = host.trim();
        let bare = trimmed
            .strip_prefix("http://")
            .unwrap_or(trimmed)
            .trim_end_matches('/');
        if bare.is_empty() || bare.contains(char::is_whitespace) || bare.contains('/') {
            return Err(invalid());
        }
        let (name, http_port) = match bare.rsplit_once(':') {
            Some((name, port)) => (name, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (bare, None),
        };
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: name.to_string(),
            http_port,
            ws_port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `http://host[:port]` with no trailing slash.
    pub fn http_base(&self) -> String {
        match self.http_port {
            Some(port) => format!("http://{}:{port}", self.host),
            None => format!("http://{}", self.host),
        }
    }

    /// `ws://host:ws_port/`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.ws_port)
    }
}

// ── Timeouts ─────────────────────────────────────────────────────

/// Deadlines for every network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP / WebSocket handshake.
    pub connect: Duration,
    /// A single chunk send or HTTP request.
    pub request: Duration,
    /// Health-check requests.
    pub health: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(10),
            health: Duration::from_secs(5),
        }
    }
}

/// Build the transport for `kind`.
pub fn build(
    kind: TransportKind,
    endpoint: &Endpoint,
    timeouts: Timeouts,
) -> Result<Arc<dyn Transport>, LinkError> {
    Ok(match kind {
        TransportKind::WebSocket => Arc::new(WsTransport::new(endpoint, timeouts)),
        TransportKind::ChunkPush => {
            Arc::new(ChunkPushTransport::new(HttpClient::new(endpoint, timeouts)?))
        }
        TransportKind::UploadApply => {
            Arc::new(UploadApplyTransport::new(HttpClient::new(endpoint, timeouts)?))
        }
    })
}
