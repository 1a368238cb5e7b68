//! # g4link-core
//!
//! Streams a desktop region to a 640×480, 4-bit grayscale panel controller.
//!
//! This crate contains:
//! - **Frames**: `RawImage`, `Frame`, `LevelMatrix`, `Region`, `FitMode`
//! - **Quantizer**: 8-bit intensity → 4-bit level, with optional gamma and inversion
//! - **Packer**: two levels per byte, high nibble first
//! - **Chunker**: row-range partitioning and the 4-byte chunk header
//! - **Capture**: `Capturer` trait with DXGI and still-image backends
//! - **Transport**: WebSocket, per-chunk HTTP push, and upload + apply
//! - **Stream**: `StreamLoop`, the paced, cancellable, single-flight worker
//! - **Error**: `LinkError`, a `thiserror`-based error hierarchy

pub mod capture;
pub mod chunk;
pub mod error;
pub mod frame;
pub mod pack;
pub mod panel;
pub mod quantize;
pub mod stream;
pub mod testing;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{Capturer, DxgiCapturer, StillImage};
pub use chunk::{Chunk, ChunkHeader, ChunkPlan, DEFAULT_ROWS_PER_CHUNK, MAX_ROWS_PER_CHUNK, RowRange};
pub use error::{ConfigError, LinkError, TransportError};
pub use frame::{FitMode, Frame, LevelMatrix, PixelFormat, RawImage, Region};
pub use pack::{pack_frame, pack_row, pack_rows};
pub use panel::{FRAME_BYTES, PANEL_HEIGHT, PANEL_WIDTH, ROW_BYTES};
pub use quantize::{QuantizeOptions, Quantizer, quantize};
pub use stream::{StreamConfig, StreamLoop, StreamState, StreamStats, TickReport};
pub use transport::{
    ChunkPushTransport, Delivery, Endpoint, HealthReport, HttpClient, Timeouts, Transport,
    TransportKind, UploadApplyTransport, WsTransport,
};
