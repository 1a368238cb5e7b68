//! Domain-specific error types for the panel pipeline.
//!
//! Errors fall into three families:
//!
//! - [`ConfigError`]: bad geometry, frame rate or host, rejected before any
//!   pixel is converted.
//! - [`TransportError`]: a network call failed. Aborts the current frame only.
//! - [`LinkError::Capability`]: a capture backend or channel is unavailable
//!   on this platform. Reported once when the feature starts.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for g4link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Invalid configuration, detected before conversion.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A network call to the panel controller failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A capture backend or channel library is unavailable.
    #[error("capability unavailable: {0}")]
    Capability(String),

    /// An image file could not be decoded.
    #[error("image error: {0}")]
    Image(String),

    /// Local I/O failed (config or image files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── ConfigError ──────────────────────────────────────────────────

/// Configuration rejected before conversion starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Capture region has a zero or negative extent.
    #[error("invalid capture region {width}x{height}")]
    InvalidRegion { width: u32, height: u32 },

    /// Frame rate is NaN or infinite.
    #[error("invalid fps: {0}")]
    InvalidFps(f64),

    /// A frame or level buffer does not match the panel geometry.
    #[error("frame size mismatch: expected {expected} samples, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    /// The device host could not be turned into an endpoint URL.
    #[error("invalid host: {0:?}")]
    InvalidHost(String),

    /// A config file exists but could not be read.
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    /// A config file exists but is not valid TOML for the expected schema.
    #[error("invalid config {path}: {reason}")]
    Parse { path: String, reason: String },
}

// ── TransportError ───────────────────────────────────────────────

/// Failure of a single request or channel operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The controller refused or dropped the connection.
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// A network call exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Sending a chunk failed mid-frame.
    #[error("chunk {index} (rows {row_start}..{row_end}) failed: {reason}")]
    Send {
        index: usize,
        row_start: u16,
        row_end: u16,
        reason: String,
    },

    /// The controller answered with a non-success HTTP status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// HTTP client error without a status.
    #[error("http: {0}")]
    Http(String),

    /// WebSocket protocol error.
    #[error("websocket: {0}")]
    WebSocket(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LinkError {
    fn from(s: String) -> Self {
        LinkError::Other(s)
    }
}

impl From<&str> for LinkError {
    fn from(s: &str) -> Self {
        LinkError::Other(s.to_string())
    }
}

impl From<image::ImageError> for LinkError {
    fn from(e: image::ImageError) -> Self {
        LinkError::Image(e.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured deadline on the error.
            TransportError::Http(format!("timed out: {e}"))
        } else if e.is_connect() {
            TransportError::Connect {
                endpoint: e.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: e.to_string(),
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(e: reqwest::Error) -> Self {
        LinkError::Transport(e.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        LinkError::Transport(e.into())
    }
}

impl LinkError {
    /// Whether this error aborts a single frame rather than the stream.
    pub fn is_transient(&self) -> bool {
        matches!(self, LinkError::Transport(_))
    }
}
