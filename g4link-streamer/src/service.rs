//! Streamer commands.
//!
//! Each command builds its own capturer and transport from the loaded
//! [`StreamerConfig`]; nothing is shared between invocations.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use g4link_core::transport::{self, HealthReport, HttpClient};
use g4link_core::{
    Capturer, DxgiCapturer, LinkError, Region, StillImage, StreamConfig, StreamLoop, TickReport,
    Transport,
};

use crate::config::StreamerConfig;

// ── Streamer ─────────────────────────────────────────────────────

/// Runs one CLI command against the configured panel.
pub struct Streamer {
    config: StreamerConfig,
}

impl Streamer {
    pub fn new(config: StreamerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    fn transport(&self) -> Result<Arc<dyn Transport>, LinkError> {
        let endpoint = self.config.endpoint()?;
        let transport =
            transport::build(self.config.stream.transport, &endpoint, self.config.timeouts())?;
        info!(
            transport = transport.name(),
            host = endpoint.host(),
            "transport ready"
        );
        Ok(transport)
    }

    fn desktop(&self) -> Result<DxgiCapturer, LinkError> {
        DxgiCapturer::new(
            self.config.capture.monitor_index,
            self.config.capture.capture_timeout_ms,
        )
        .inspect_err(|e| error!("desktop capture unavailable: {e}"))
    }

    /// Stream the desktop region until Ctrl-C or a capability error.
    pub async fn stream(&self) -> Result<(), LinkError> {
        let config = self.config.to_stream_config()?;
        let capturer = self.desktop()?;
        let stream = StreamLoop::new(capturer, self.transport()?);

        let mut stats = stream.stats_receiver();
        stream.start(config)?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, stopping"),
            _ = stats.wait_for(|s| !s.running) => warn!("stream ended on its own"),
        }
        stream.shutdown().await;

        let stats = stream.stats();
        info!(
            frames_sent = stats.frames_sent,
            frames_failed = stats.frames_failed,
            bytes_sent = stats.bytes_sent,
            "session summary"
        );
        match stats.last_error {
            Some(e) if stats.frames_sent == 0 => Err(LinkError::Other(e)),
            _ => Ok(()),
        }
    }

    /// Capture and send a single desktop frame.
    pub async fn once(&self) -> Result<TickReport, LinkError> {
        let config = self.config.to_stream_config()?;
        let capturer = self.desktop()?;
        self.send_once_with(capturer, &config).await
    }

    /// Decode an image file and send it as one frame.
    pub async fn show(&self, path: &Path) -> Result<TickReport, LinkError> {
        let mut config = self.config.to_stream_config()?;
        let still = StillImage::open(path)?;
        // The whole image is the source, resized per the fit mode.
        let image = still.image();
        config.region = Region::new(0, 0, image.width, image.height);
        self.send_once_with(still, &config).await
    }

    async fn send_once_with<C>(
        &self,
        capturer: C,
        config: &StreamConfig,
    ) -> Result<TickReport, LinkError>
    where
        C: Capturer + 'static,
    {
        info!(source = capturer.name(), "sending one frame");
        let stream = StreamLoop::new(capturer, self.transport()?);
        stream.send_once(config).await
    }

    /// Query both status endpoints.
    pub async fn probe(&self) -> Result<HealthReport, LinkError> {
        let client = HttpClient::new(&self.config.endpoint()?, self.config.timeouts())?;
        Ok(client.health().await?)
    }
}
