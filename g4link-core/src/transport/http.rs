//! HTTP request/response fallback transports and health checks.
//!
//! Endpoints on the controller:
//!
//! ```text
//! POST /upload                                  multipart "file" = packed frame
//! POST /apply                                   no body
//! POST /stream-chunk?rowStart=N&rows=M&packed=1 multipart "file" = packed chunk
//! GET  /api/fs-status
//! GET  /api/runtime-status
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chunk::{Chunk, ChunkPlan};
use crate::error::{LinkError, TransportError};
use crate::frame::LevelMatrix;
use crate::pack::pack_frame;
use crate::transport::{Delivery, Endpoint, Timeouts, Transport};

/// Longest status body kept in reports and log lines.
const STATUS_BODY_LIMIT: usize = 120;

/// Multipart field name carrying binary payloads.
const FILE_FIELD: &str = "file";

// ── HttpClient ───────────────────────────────────────────────────

/// Thin client for the controller's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base: String,
    client: Client,
    timeouts: Timeouts,
}

impl HttpClient {
    pub fn new(endpoint: &Endpoint, timeouts: Timeouts) -> Result<Self, LinkError> {
        Self::with_base(endpoint.http_base(), timeouts)
    }

    /// Target an explicit `http://host[:port]` base URL.
    pub fn with_base(base: impl Into<String>, timeouts: Timeouts) -> Result<Self, LinkError> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(|e| LinkError::Capability(format!("http client: {e}")))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
            timeouts,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Upload a full packed frame. Returns the controller's status text.
    pub async fn upload(&self, packed: Bytes) -> Result<String, TransportError> {
        let form = Form::new().part(FILE_FIELD, binary_part(packed, "current_image.bin")?);
        let resp = self.client.post(self.url("/upload")).multipart(form).send().await?;
        let text = expect_success("/upload", resp).await?;
        debug!("upload: {text}");
        Ok(text)
    }

    /// Swap the last uploaded frame into the visible framebuffer.
    pub async fn apply(&self) -> Result<String, TransportError> {
        let resp = self.client.post(self.url("/apply")).send().await?;
        let text = expect_success("/apply", resp).await?;
        debug!("apply: {text}");
        Ok(text)
    }

    /// Push one packed chunk; the controller writes it straight into the
    /// framebuffer.
    pub async fn push_chunk(&self, chunk: &Chunk) -> Result<(), TransportError> {
        let form = Form::new().part(FILE_FIELD, binary_part(chunk.payload.clone(), "chunk.bin")?);
        let resp = self
            .client
            .post(self.url("/stream-chunk"))
            .query(&[
                ("rowStart", chunk.range.row_start.to_string()),
                ("rows", chunk.range.row_count.to_string()),
                ("packed", "1".to_string()),
            ])
            .multipart(form)
            .send()
            .await?;
        expect_success("/stream-chunk", resp).await?;
        Ok(())
    }

    /// Query both status endpoints.
    ///
    /// Non-success statuses are reported, not treated as errors; only an
    /// unreachable controller fails.
    pub async fn health(&self) -> Result<HealthReport, TransportError> {
        let fs_status = self.status_line("/api/fs-status").await?;
        let runtime_status = self.status_line("/api/runtime-status").await?;
        info!(
            fs = fs_status.status,
            runtime = runtime_status.status,
            "health check"
        );
        Ok(HealthReport {
            fs_status,
            runtime_status,
        })
    }

    async fn status_line(&self, path: &str) -> Result<StatusLine, TransportError> {
        let resp = self
            .client
            .get(self.url(path))
            .timeout(self.timeouts.health)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(StatusLine {
            status,
            body: truncate(&body),
        })
    }
}

fn binary_part(data: Bytes, file_name: &'static str) -> Result<Part, TransportError> {
    Part::bytes(data.to_vec())
        .file_name(file_name)
        .mime_str("application/octet-stream")
        .map_err(TransportError::from)
}

async fn expect_success(endpoint: &str, resp: Response) -> Result<String, TransportError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(TransportError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: truncate(&body),
        });
    }
    Ok(body.trim().to_string())
}

fn truncate(body: &str) -> String {
    body.trim().chars().take(STATUS_BODY_LIMIT).collect()
}

// ── Health ───────────────────────────────────────────────────────

/// Status code and the start of the body of one status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub status: u16,
    pub body: String,
}

impl StatusLine {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of probing the controller before streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub fs_status: StatusLine,
    pub runtime_status: StatusLine,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.fs_status.is_ok() && self.runtime_status.is_ok()
    }
}

// ── ChunkPushTransport ───────────────────────────────────────────

/// One `POST /stream-chunk` per chunk, no apply step.
///
/// The panel updates row range by row range, so tearing is visible while a
/// frame is in flight.
#[derive(Debug, Clone)]
pub struct ChunkPushTransport {
    client: HttpClient,
}

impl ChunkPushTransport {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ChunkPushTransport {
    fn name(&self) -> &'static str {
        "chunk-push"
    }

    async fn send_frame(
        &self,
        levels: &LevelMatrix,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<Delivery, LinkError> {
        let mut sent = Delivery::default();
        for (index, chunk) in plan.chunks(levels).enumerate() {
            if cancel.is_cancelled() {
                debug!(index, "chunk push cancelled at chunk boundary");
                return Err(LinkError::Cancelled);
            }
            self.client
                .push_chunk(&chunk)
                .await
                .map_err(|e| TransportError::Send {
                    index,
                    row_start: chunk.range.row_start,
                    row_end: chunk.range.row_end(),
                    reason: e.to_string(),
                })?;
            sent.chunks += 1;
            sent.bytes += chunk.payload.len();
        }
        Ok(sent)
    }
}

// ── UploadApplyTransport ─────────────────────────────────────────

/// Whole-frame upload followed by `/apply`; tear-free.
///
/// The chunk plan is ignored: the upload is a single request.
#[derive(Debug, Clone)]
pub struct UploadApplyTransport {
    client: HttpClient,
}

impl UploadApplyTransport {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for UploadApplyTransport {
    fn name(&self) -> &'static str {
        "upload-apply"
    }

    async fn send_frame(
        &self,
        levels: &LevelMatrix,
        _plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<Delivery, LinkError> {
        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        let packed = pack_frame(levels);
        let bytes = packed.len();
        self.client.upload(packed).await?;
        self.client.apply().await?;
        Ok(Delivery { chunks: 1, bytes })
    }
}
