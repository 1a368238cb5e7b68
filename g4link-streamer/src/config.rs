//! Configuration for the panel streamer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use g4link_core::chunk::clamp_rows_per_chunk;
use g4link_core::transport::DEFAULT_WS_PORT;
use g4link_core::{
    ConfigError, Endpoint, FitMode, QuantizeOptions, Region, StreamConfig, Timeouts, TransportKind,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Panel controller address and network deadlines.
    pub device: DeviceConfig,
    /// Desktop capture settings.
    pub capture: CaptureConfig,
    /// Frame rate, chunking and conversion.
    pub stream: StreamSettings,
    /// Still-image conversion.
    pub image: ImageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Panel controller address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host or IP, optionally with an HTTP port or `http://` prefix.
    pub host: String,
    /// WebSocket port.
    pub ws_port: u16,
    /// Per-request deadline in milliseconds.
    pub timeout_ms: u64,
    /// Health-check deadline in milliseconds.
    pub health_timeout_ms: u64,
    /// TCP / WebSocket handshake deadline in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Desktop capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Monitor index to capture (0 = primary).
    pub monitor_index: u32,
    /// DXGI acquire timeout in milliseconds.
    pub capture_timeout_ms: u32,
}

/// Streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Target frames per second; ≤ 0 means 1.
    pub fps: f64,
    /// Rows per chunk; outside 1..=60 means 10.
    pub rows_per_chunk: i64,
    /// `websocket`, `chunk-push` or `upload-apply`.
    pub transport: TransportKind,
    /// Map bright to dark.
    pub invert: bool,
    /// Optional gamma exponent; ≤ 0 disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f32>,
}

/// Still-image conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// `stretch` or `letterbox`.
    pub fit: FitMode,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.189".into(),
            ws_port: DEFAULT_WS_PORT,
            timeout_ms: 10_000,
            health_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let panel = Region::panel();
        Self {
            x: panel.x,
            y: panel.y,
            width: panel.width,
            height: panel.height,
            monitor_index: 0,
            capture_timeout_ms: 100,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            fps: 1.0,
            rows_per_chunk: 10,
            transport: TransportKind::WebSocket,
            invert: false,
            gamma: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl StreamerConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.message().to_string(),
        })
    }

    /// Default configuration as TOML text.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = Self::default_toml().map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn region(&self) -> Region {
        Region::new(
            self.capture.x,
            self.capture.y,
            self.capture.width,
            self.capture.height,
        )
    }

    pub fn quantize_options(&self) -> QuantizeOptions {
        QuantizeOptions::new(self.stream.gamma, self.stream.invert)
    }

    /// Convert stream settings into a validated `StreamConfig`.
    pub fn to_stream_config(&self) -> Result<StreamConfig, ConfigError> {
        let cfg = StreamConfig {
            region: self.region(),
            fps: self.stream.fps,
            rows_per_chunk: clamp_rows_per_chunk(self.stream.rows_per_chunk),
            quantize: self.quantize_options(),
            fit: self.image.fit,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::new(&self.device.host, self.device.ws_port)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.device.connect_timeout_ms),
            request: Duration::from_millis(self.device.timeout_ms),
            health: Duration::from_millis(self.device.health_timeout_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_serializes() {
        let text = StreamerConfig::default_toml().unwrap();
        assert!(text.contains("[device]"));
        assert!(text.contains("192.168.1.189"));
        assert!(text.contains("transport = \"websocket\""));
        assert!(!text.contains("gamma"));
    }

    #[test]
    fn websocket_transport_name_parses() {
        let parse = |name: &str| {
            toml::from_str::<StreamerConfig>(&format!("[stream]\ntransport = \"{name}\""))
                .map(|c| c.stream.transport)
        };
        assert_eq!(parse("websocket").unwrap(), TransportKind::WebSocket);
        assert_eq!(parse("chunk-push").unwrap(), TransportKind::ChunkPush);
        assert_eq!(parse("upload-apply").unwrap(), TransportKind::UploadApply);
        assert!(parse("web-socket").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = StreamerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.device.host, "192.168.1.189");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("g4link.toml");
        std::fs::write(
            &path,
            "[device]\nhost = \"10.0.0.9\"\n\n[stream]\nfps = \"fast\"\n",
        )
        .unwrap();

        let err = StreamerConfig::load(&path).unwrap_err();
        match err {
            ConfigError::Parse { path: p, reason } => {
                assert!(p.ends_with("g4link.toml"));
                assert!(reason.contains("fast"), "reason: {reason}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            StreamerConfig::load(dir.path()),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn written_defaults_load_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("g4link.toml");
        StreamerConfig::write_default(&path).unwrap();

        let cfg = StreamerConfig::load(&path).unwrap();
        assert_eq!(cfg.stream.transport, TransportKind::WebSocket);
        assert_eq!(cfg.device.ws_port, 81);
        assert_eq!(cfg.capture.width, 640);
    }

    #[test]
    fn roundtrip_config() {
        let text = StreamerConfig::default_toml().unwrap();
        let parsed: StreamerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.device.ws_port, 81);
        assert_eq!(parsed.stream.rows_per_chunk, 10);
        assert_eq!(parsed.image.fit, FitMode::Stretch);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: StreamerConfig = toml::from_str(
            r#"
            [stream]
            fps = 4.0
            transport = "upload-apply"
            gamma = 2.2

            [image]
            fit = "letterbox"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.stream.transport, TransportKind::UploadApply);
        assert_eq!(parsed.stream.gamma, Some(2.2));
        assert_eq!(parsed.image.fit, FitMode::Letterbox);
        assert_eq!(parsed.device.timeout_ms, 10_000);
        assert_eq!(parsed.capture.width, 640);
    }

    #[test]
    fn to_stream_config_clamps_chunk_rows() {
        let mut cfg = StreamerConfig::default();
        cfg.stream.rows_per_chunk = 200;
        assert_eq!(cfg.to_stream_config().unwrap().rows_per_chunk, 10);
        cfg.stream.rows_per_chunk = -1;
        assert_eq!(cfg.to_stream_config().unwrap().rows_per_chunk, 10);
        cfg.stream.rows_per_chunk = 60;
        assert_eq!(cfg.to_stream_config().unwrap().rows_per_chunk, 60);
    }

    #[test]
    fn to_stream_config_rejects_empty_region() {
        let mut cfg = StreamerConfig::default();
        cfg.capture.height = 0;
        assert!(matches!(
            cfg.to_stream_config(),
            Err(ConfigError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn endpoint_and_timeouts() {
        let mut cfg = StreamerConfig::default();
        cfg.device.host = "http://10.0.0.7/".into();
        assert_eq!(cfg.endpoint().unwrap().ws_url(), "ws://10.0.0.7:81/");
        assert_eq!(cfg.timeouts(), Timeouts::default());
    }
}
