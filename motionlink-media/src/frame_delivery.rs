//! Polling frame delivery
//!
//! A ticker samples the latest camera frame, JPEG-encodes it and uploads it
//! to the detection endpoint. At most one upload is in flight: a tick that
//! fires while a cycle is outstanding is skipped, never queued.

use crate::encoding::JpegEncoder;
use crate::error::{MediaError, MediaResult};
use crate::tracks::{CaptureTrack, VideoFrame};
use bytes::Bytes;
use motionlink_core::{BackendApi, DetectResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default upload period (about 4 fps)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(250);

/// Polling configuration
#[derive(Debug, Clone)]
pub struct FrameDeliveryConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Encoder applied to every sampled frame
    pub encoder: JpegEncoder,
}

impl Default for FrameDeliveryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_FRAME_INTERVAL,
            encoder: JpegEncoder::default(),
        }
    }
}

/// Counters describing the delivery loop
#[derive(Debug, Default)]
pub struct DeliveryStats {
    ticks: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_no_frame: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliverySnapshot {
    /// Ticks fired
    pub ticks: u64,
    /// Cycles started (each issues at most one upload)
    pub started: u64,
    /// Cycles that finished, successfully or not
    pub completed: u64,
    /// Ticks dropped because a cycle was in flight
    pub skipped_busy: u64,
    /// Ticks dropped because the camera had no frame yet
    pub skipped_no_frame: u64,
    /// Cycles that failed to encode or upload
    pub failures: u64,
}

impl DeliveryStats {
    /// Read all counters
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            ticks: self.ticks.load(Ordering::SeqCst),
            started: self.started.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            skipped_busy: self.skipped_busy.load(Ordering::SeqCst),
            skipped_no_frame: self.skipped_no_frame.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }
}

/// Clears the busy flag when a cycle ends, including when it is aborted
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Shared {
    config: FrameDeliveryConfig,
    track: Arc<CaptureTrack>,
    backend: Arc<dyn BackendApi>,
    results: mpsc::UnboundedSender<DetectResponse>,
    busy: Arc<AtomicBool>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<DeliveryStats>,
}

/// Running capture-encode-upload loop
pub struct FrameDelivery {
    shared: Arc<Shared>,
    ticker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FrameDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDelivery")
            .field("interval", &self.shared.config.interval)
            .field("running", &self.is_running())
            .field("stats", &self.shared.stats.snapshot())
            .finish()
    }
}

impl FrameDelivery {
    /// Start ticking; parsed responses are sent to `results`
    ///
    /// The first tick fires one interval after start.
    pub fn start(
        config: FrameDeliveryConfig,
        track: Arc<CaptureTrack>,
        backend: Arc<dyn BackendApi>,
        results: mpsc::UnboundedSender<DetectResponse>,
    ) -> MediaResult<Self> {
        if config.interval.is_zero() {
            return Err(MediaError::InvalidConfiguration {
                message: "frame interval must be non-zero".to_string(),
            });
        }

        let shared = Arc::new(Shared {
            config,
            track,
            backend,
            results,
            busy: Arc::new(AtomicBool::new(false)),
            in_flight: Mutex::new(None),
            stats: Arc::new(DeliveryStats::default()),
        });

        info!(
            interval_ms = shared.config.interval.as_millis() as u64,
            quality = shared.config.encoder.quality(),
            track = %shared.track.label(),
            "frame delivery started"
        );

        let ticker = tokio::spawn(run_ticker(shared.clone()));
        Ok(Self {
            shared,
            ticker: Some(ticker),
        })
    }

    /// Cancel the ticker and any in-flight cycle; safe to call twice
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            if let Some(cycle) = self.shared.in_flight.lock().take() {
                cycle.abort();
            }
            info!(stats = ?self.shared.stats.snapshot(), "frame delivery stopped");
        }
    }

    /// Whether the ticker is still scheduled
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.shared.stats.clone()
    }
}

impl Drop for FrameDelivery {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticker(shared: Arc<Shared>) {
    let period = shared.config.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        shared.stats.ticks.fetch_add(1, Ordering::SeqCst);

        let Some(frame) = shared.track.latest_frame() else {
            shared.stats.skipped_no_frame.fetch_add(1, Ordering::SeqCst);
            continue;
        };

        if shared.busy.swap(true, Ordering::SeqCst) {
            shared.stats.skipped_busy.fetch_add(1, Ordering::SeqCst);
            debug!("upload in flight, skipping tick");
            continue;
        }

        shared.stats.started.fetch_add(1, Ordering::SeqCst);
        let guard = BusyGuard(shared.busy.clone());
        let cycle = tokio::spawn(run_cycle(shared.clone(), frame, guard));
        *shared.in_flight.lock() = Some(cycle);
    }
}

async fn run_cycle(shared: Arc<Shared>, frame: Arc<VideoFrame>, _guard: BusyGuard) {
    match deliver(&shared, frame).await {
        Ok(response) => {
            debug!(events = response.events.len(), "detect response");
            let _ = shared.results.send(response);
        }
        Err(e) => {
            shared.stats.failures.fetch_add(1, Ordering::SeqCst);
            warn!(error = %e, "frame delivery cycle failed");
        }
    }
    shared.stats.completed.fetch_add(1, Ordering::SeqCst);
}

async fn deliver(shared: &Shared, frame: Arc<VideoFrame>) -> MediaResult<DetectResponse> {
    let encoder = shared.config.encoder.clone();
    let jpeg = tokio::task::spawn_blocking(move || encoder.encode(&frame))
        .await
        .map_err(|e| MediaError::EncodingFailed {
            codec: "jpeg".to_string(),
            reason: e.to_string(),
        })??;

    shared
        .backend
        .detect(Bytes::from(jpeg))
        .await
        .map_err(|source| MediaError::Upload { source })
}
