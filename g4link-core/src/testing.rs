//! In-memory capturer and transport for exercising the stream loop
//! without a desktop or a panel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capture::Capturer;
use crate::chunk::{ChunkPlan, RowRange};
use crate::error::{LinkError, TransportError};
use crate::frame::{LevelMatrix, PixelFormat, RawImage, Region};
use crate::transport::{Delivery, Transport};

// ── Capturers ────────────────────────────────────────────────────

/// Returns a uniformly gray bitmap of the requested size.
#[derive(Debug, Clone, Copy)]
pub struct SolidCapturer {
    value: u8,
}

impl SolidCapturer {
    pub fn new(value: u8) -> Self {
        Self { value }
    }
}

impl Capturer for SolidCapturer {
    fn name(&self) -> &'static str {
        "solid"
    }

    fn grab(&mut self, region: Region) -> Result<RawImage, LinkError> {
        region.validate()?;
        let len = region.width as usize * region.height as usize;
        RawImage::packed(
            region.width,
            region.height,
            PixelFormat::Gray8,
            vec![self.value; len],
        )
    }
}

/// A capture backend that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapturer;

impl Capturer for UnavailableCapturer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn grab(&mut self, _region: Region) -> Result<RawImage, LinkError> {
        Err(LinkError::Capability("no capture backend".into()))
    }
}

// ── RecordingTransport ───────────────────────────────────────────

/// One chunk as seen by [`RecordingTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentChunk {
    /// Zero-based index of the `send_frame` call.
    pub frame: u64,
    pub range: RowRange,
    pub payload_len: usize,
}

/// Records every chunk instead of sending it.
///
/// Checks cancellation once per frame, like the WebSocket transport.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentChunk>>,
    frames: AtomicU64,
    fail_at: Option<(u64, usize)>,
    chunk_delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail chunk `chunk` of frame `frame`; the remaining chunks of that
    /// frame are not sent.
    pub fn failing_at(mut self, frame: u64, chunk: usize) -> Self {
        self.fail_at = Some((frame, chunk));
        self
    }

    /// Sleep this long before each chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Every recorded chunk, in send order.
    pub fn sent(&self) -> Vec<SentChunk> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Chunks recorded for one frame.
    pub fn chunks_of(&self, frame: u64) -> Vec<SentChunk> {
        self.sent().into_iter().filter(|c| c.frame == frame).collect()
    }

    /// Number of `send_frame` calls that got past the cancellation check.
    pub fn frames_attempted(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    fn record(&self, chunk: SentChunk) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_frame(
        &self,
        levels: &LevelMatrix,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<Delivery, LinkError> {
        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        let frame = self.frames.fetch_add(1, Ordering::SeqCst);
        let mut sent = Delivery::default();
        for (index, chunk) in plan.chunks(levels).enumerate() {
            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_at == Some((frame, index)) {
                return Err(TransportError::Send {
                    index,
                    row_start: chunk.range.row_start,
                    row_end: chunk.range.row_end(),
                    reason: "injected failure".into(),
                }
                .into());
            }
            self.record(SentChunk {
                frame,
                range: chunk.range,
                payload_len: chunk.payload.len(),
            });
            sent.chunks += 1;
            sent.bytes += chunk.payload.len();
        }
        Ok(sent)
    }
}
