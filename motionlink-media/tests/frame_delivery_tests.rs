//! Tests for the polling frame delivery loop
//!
//! A fake backend records every upload so the tests can check the overlap
//! policy and failure handling under a paused clock.

use async_trait::async_trait;
use bytes::Bytes;
use motionlink_core::{BackendApi, DetectResponse, DetectionEvent, MotionLinkError};
use motionlink_media::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct SlowBackend {
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowBackend {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn failing(delay: Duration) -> Self {
        Self {
            delay,
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl BackendApi for SlowBackend {
    async fn clear_canvas(&self) -> motionlink_core::Result<bool> {
        Ok(true)
    }

    async fn set_detection_mode(&self, _mode: &str) -> motionlink_core::Result<()> {
        Ok(())
    }

    async fn set_monitoring(&self, _enabled: bool) -> motionlink_core::Result<()> {
        Ok(())
    }

    async fn detect(&self, jpeg: Bytes) -> motionlink_core::Result<DetectResponse> {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(MotionLinkError::BackendRejected {
                endpoint: "/api/detect".to_string(),
                status: 503,
                body: "busy".to_string(),
            });
        }
        Ok(DetectResponse {
            events: vec![DetectionEvent::new("motion")],
        })
    }

    fn video_feed_url(&self, cache_bust: u64) -> String {
        format!("http://backend/video_feed?t={}", cache_bust)
    }

    fn events_url(&self) -> String {
        "http://backend/events".to_string()
    }
}

async fn camera_track() -> Arc<CaptureTrack> {
    let camera = MockCamera::new().with_resolution(VideoResolution::new(32, 24));
    let track = camera.open(&MediaConstraints::default()).await.unwrap();
    Arc::new(track)
}

fn config(interval_ms: u64) -> FrameDeliveryConfig {
    FrameDeliveryConfig {
        interval: Duration::from_millis(interval_ms),
        encoder: JpegEncoder::new(60, None),
    }
}

// ============================================================================
// OVERLAP POLICY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_upload_never_overlaps() {
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(100)));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut delivery =
        FrameDelivery::start(config(20), camera_track().await, backend.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    delivery.stop();

    let stats = delivery.stats().snapshot();
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst) as u64, stats.started);
    assert!(stats.started - stats.completed <= 1);
    assert!(stats.completed >= 2);
    assert!(stats.skipped_busy > 0);
    assert!(stats.ticks > stats.started);

    let mut responses = 0;
    while rx.try_recv().is_ok() {
        responses += 1;
    }
    assert_eq!(responses as u64, stats.completed);
}

#[tokio::test(start_paused = true)]
async fn test_fast_upload_runs_every_tick() {
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(1)));
    let (tx, _rx) = mpsc::unbounded_channel();

    let mut delivery =
        FrameDelivery::start(config(50), camera_track().await, backend.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(520)).await;
    delivery.stop();

    let stats = delivery.stats().snapshot();
    assert_eq!(stats.skipped_busy, 0);
    assert_eq!(stats.started, stats.ticks);
    assert_eq!(backend.calls.load(Ordering::SeqCst) as u64, stats.started);
}

// ============================================================================
// FAILURES AND LIFECYCLE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_the_interval() {
    let backend = Arc::new(SlowBackend::failing(Duration::from_millis(1)));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut delivery =
        FrameDelivery::start(config(50), camera_track().await, backend.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(520)).await;
    assert!(delivery.is_running());
    delivery.stop();

    let stats = delivery.stats().snapshot();
    assert!(stats.failures >= 5);
    assert_eq!(stats.failures, stats.completed);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stopped_track_skips_ticks() {
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(1)));
    let (tx, _rx) = mpsc::unbounded_channel();
    let track = camera_track().await;
    track.stop();

    let mut delivery = FrameDelivery::start(config(50), track, backend.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(260)).await;
    delivery.stop();

    let stats = delivery.stats().snapshot();
    assert!(stats.skipped_no_frame >= 4);
    assert_eq!(stats.started, 0);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_uploads() {
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(1)));
    let (tx, _rx) = mpsc::unbounded_channel();

    let mut delivery =
        FrameDelivery::start(config(50), camera_track().await, backend.clone(), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    delivery.stop();
    delivery.stop();
    assert!(!delivery.is_running());

    let calls = backend.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let backend = Arc::new(SlowBackend::new(Duration::ZERO));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = FrameDelivery::start(config(0), camera_track().await, backend, tx);
    assert!(matches!(
        result,
        Err(MediaError::InvalidConfiguration { .. })
    ));
}
