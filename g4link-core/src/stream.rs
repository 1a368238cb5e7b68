//! The streaming worker.
//!
//! A [`StreamLoop`] owns a capturer and a transport and runs one tick per
//! frame interval:
//!
//! 1. [`Capturer::grab`] the configured region.
//! 2. Convert to a 640×480 [`Frame`] (resize when needed).
//! 3. [`Quantizer::apply`] to get 4-bit levels.
//! 4. [`Transport::send_frame`] chunk by chunk, in row order.
//! 5. Sleep for what is left of the interval.
//!
//! States:
//!
//! ```text
//!          start()            stop()          tick completes
//!   Idle ──────────► Running ───────► Stopping ──────────────► Idle
//! ```
//!
//! Ticks are single-flight. The worker and [`StreamLoop::send_once`] share
//! one async mutex over the pipeline, so a frame's chunk sequence never
//! interleaves with another's.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::Capturer;
use crate::chunk::{ChunkPlan, DEFAULT_ROWS_PER_CHUNK};
use crate::error::{ConfigError, LinkError};
use crate::frame::{FitMode, Frame, Region};
use crate::quantize::{QuantizeOptions, Quantizer};
use crate::transport::{Delivery, Transport};

// ── StreamConfig ─────────────────────────────────────────────────

/// Immutable settings for one streaming session.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Desktop rectangle to capture.
    pub region: Region,
    /// Target frames per second. Values ≤ 0 mean 1.
    pub fps: f64,
    /// Rows per chunk; outside `1..=60` becomes 10.
    pub rows_per_chunk: u16,
    pub quantize: QuantizeOptions,
    pub fit: FitMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            region: Region::panel(),
            fps: 1.0,
            rows_per_chunk: DEFAULT_ROWS_PER_CHUNK,
            quantize: QuantizeOptions::default(),
            fit: FitMode::default(),
        }
    }
}

impl StreamConfig {
    /// Reject settings that cannot produce a frame.
    ///
    /// A positive fps so small that its interval overflows [`Duration`] is
    /// rejected along with NaN and infinity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.region.validate()?;
        if !self.fps.is_finite() || (self.fps > 0.0 && self.checked_interval().is_none()) {
            return Err(ConfigError::InvalidFps(self.fps));
        }
        Ok(())
    }

    /// Time budget of one tick. Falls back to one second for fps ≤ 0 or an
    /// interval [`validate`](Self::validate) would reject.
    pub fn frame_interval(&self) -> Duration {
        self.checked_interval().unwrap_or(Duration::from_secs(1))
    }

    fn checked_interval(&self) -> Option<Duration> {
        if self.fps.is_finite() && self.fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.fps).ok()
        } else {
            None
        }
    }

    pub fn chunk_plan(&self) -> ChunkPlan {
        ChunkPlan::panel(self.rows_per_chunk)
    }
}

// ── StreamState ──────────────────────────────────────────────────

/// Lifecycle of a [`StreamLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Idle = 0,
    Running = 1,
    /// Stop requested; the in-flight tick is finishing.
    Stopping = 2,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => StreamState::Running,
            2 => StreamState::Stopping,
            _ => StreamState::Idle,
        }
    }
}

// ── StreamStats ──────────────────────────────────────────────────

/// Running counters, published after every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// A worker is active. Cleared once it has reached [`StreamState::Idle`].
    pub running: bool,
    pub frames_sent: u64,
    pub frames_failed: u64,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    /// Duration of the most recent tick.
    pub last_tick: Option<Duration>,
    pub last_error: Option<String>,
}

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub delivery: Delivery,
    pub elapsed: Duration,
}

// ── Pipeline ─────────────────────────────────────────────────────

struct Pipeline {
    capturer: Box<dyn Capturer>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Capture, convert and send one frame.
    async fn tick(
        &mut self,
        config: &StreamConfig,
        quantizer: &Quantizer,
        cancel: &CancellationToken,
    ) -> Result<TickReport, LinkError> {
        let started = Instant::now();
        let raw = self.capturer.grab(config.region)?;
        let frame = Frame::from_raw(&raw, config.fit);
        let levels = quantizer.apply(&frame);
        let delivery = self
            .transport
            .send_frame(&levels, config.chunk_plan(), cancel)
            .await?;
        Ok(TickReport {
            delivery,
            elapsed: started.elapsed(),
        })
    }
}

// ── StreamLoop ───────────────────────────────────────────────────

/// Periodic capture-and-send worker with start/stop control.
///
/// [`start`](Self::start) and [`stop`](Self::stop) only flip state and
/// return; all I/O happens on the spawned worker task.
pub struct StreamLoop {
    pipeline: Arc<Mutex<Pipeline>>,
    state: Arc<AtomicU8>,
    cancel: StdMutex<Option<CancellationToken>>,
    worker: StdMutex<Option<JoinHandle<()>>>,
    stats: Arc<watch::Sender<StreamStats>>,
}

impl StreamLoop {
    pub fn new<C>(capturer: C, transport: Arc<dyn Transport>) -> Self
    where
        C: Capturer + 'static,
    {
        let (stats, _) = watch::channel(StreamStats::default());
        Self {
            pipeline: Arc::new(Mutex::new(Pipeline {
                capturer: Box::new(capturer),
                transport,
            })),
            state: Arc::new(AtomicU8::new(StreamState::Idle as u8)),
            cancel: StdMutex::new(None),
            worker: StdMutex::new(None),
            stats: Arc::new(stats),
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == StreamState::Running
    }

    /// Subscribe to per-tick counters.
    pub fn stats_receiver(&self) -> watch::Receiver<StreamStats> {
        self.stats.subscribe()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> StreamStats {
        self.stats.borrow().clone()
    }

    /// Validate `config` and spawn the worker.
    ///
    /// Must be called from within a Tokio runtime. Fails if a session is
    /// running or still stopping.
    pub fn start(&self, config: StreamConfig) -> Result<(), LinkError> {
        config.validate()?;

        // Held until the worker is spawned so stop() never sees Running
        // without the matching token.
        let mut cancel_slot = lock(&self.cancel);
        self.state
            .compare_exchange(
                StreamState::Idle as u8,
                StreamState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| {
                LinkError::Other(format!(
                    "stream already active ({:?})",
                    StreamState::from_u8(current)
                ))
            })?;

        let cancel = CancellationToken::new();
        *cancel_slot = Some(cancel.clone());
        self.stats.send_modify(|s| s.running = true);

        info!(
            fps = config.fps,
            interval_ms = config.frame_interval().as_millis() as u64,
            rows_per_chunk = config.chunk_plan().rows_per_chunk(),
            region = ?config.region,
            "stream started"
        );

        let worker = Worker {
            pipeline: Arc::clone(&self.pipeline),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            cancel,
            config,
        };
        *lock(&self.worker) = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Request the worker to stop after its in-flight tick. Does not block.
    pub fn stop(&self) {
        let cancel_slot = lock(&self.cancel);
        let stopping = self
            .state
            .compare_exchange(
                StreamState::Running as u8,
                StreamState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if let Some(cancel) = cancel_slot.as_ref() {
            cancel.cancel();
        }
        drop(cancel_slot);
        if stopping {
            info!("stream stop requested");
        }
    }

    /// Stop and wait until the worker has reached [`StreamState::Idle`].
    pub async fn shutdown(&self) {
        self.stop();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("stream worker panicked: {e}");
                self.state.store(StreamState::Idle as u8, Ordering::SeqCst);
                self.stats.send_modify(|s| s.running = false);
            }
        }
    }

    /// Capture and send a single frame.
    ///
    /// Waits for any in-flight tick first, so it never overlaps a running
    /// session's sends.
    pub async fn send_once(&self, config: &StreamConfig) -> Result<TickReport, LinkError> {
        config.validate()?;
        let quantizer = Quantizer::new(config.quantize);
        let mut pipeline = self.pipeline.lock().await;
        let report = pipeline
            .tick(config, &quantizer, &CancellationToken::new())
            .await?;
        info!(
            chunks = report.delivery.chunks,
            bytes = report.delivery.bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "frame sent"
        );
        Ok(report)
    }
}

impl Drop for StreamLoop {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.cancel).as_ref() {
            cancel.cancel();
        }
    }
}

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Worker ───────────────────────────────────────────────────────

struct Worker {
    pipeline: Arc<Mutex<Pipeline>>,
    state: Arc<AtomicU8>,
    stats: Arc<watch::Sender<StreamStats>>,
    cancel: CancellationToken,
    config: StreamConfig,
}

impl Worker {
    async fn run(self) {
        let interval = self.config.frame_interval();
        let quantizer = Quantizer::new(self.config.quantize);
        let mut frame_number: u64 = 0;

        while !self.cancel.is_cancelled() {
            let loop_start = Instant::now();

            let outcome = {
                let mut pipeline = self.pipeline.lock().await;
                pipeline.tick(&self.config, &quantizer, &self.cancel).await
            };

            match outcome {
                Ok(report) => {
                    debug!(
                        frame = frame_number,
                        chunks = report.delivery.chunks,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "tick"
                    );
                    self.stats.send_modify(|s| {
                        s.frames_sent += 1;
                        s.chunks_sent += report.delivery.chunks as u64;
                        s.bytes_sent += report.delivery.bytes as u64;
                        s.last_tick = Some(report.elapsed);
                    });
                }
                Err(LinkError::Cancelled) => {
                    debug!(frame = frame_number, "frame abandoned on stop");
                    break;
                }
                Err(e @ LinkError::Capability(_)) => {
                    error!("stream disabled: {e}");
                    self.record_failure(&e, loop_start);
                    break;
                }
                Err(e) => {
                    warn!(frame = frame_number, "frame failed: {e}");
                    self.record_failure(&e, loop_start);
                }
            }
            frame_number += 1;

            self.pace(loop_start, interval).await;
        }

        self.state.store(StreamState::Idle as u8, Ordering::SeqCst);
        self.stats.send_modify(|s| s.running = false);
        info!(frames = frame_number, "stream stopped");
    }

    fn record_failure(&self, e: &LinkError, loop_start: Instant) {
        self.stats.send_modify(|s| {
            s.frames_failed += 1;
            s.last_tick = Some(loop_start.elapsed());
            s.last_error = Some(e.to_string());
        });
    }

    /// Sleep for the remainder of the frame interval, waking early on stop.
    async fn pace(&self, loop_start: Instant, interval: Duration) {
        let Some(deadline) = loop_start.checked_add(interval) else {
            // Past the clock's range: nothing to do but wait for stop.
            self.cancel.cancelled().await;
            return;
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {}
        }
    }
}
