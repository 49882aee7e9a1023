//! Tests for camera acquisition and track lifecycle

use motionlink_media::*;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// ACQUISITION LIFECYCLE TESTS
// ============================================================================

#[tokio::test]
async fn test_constraints_select_frame_size() {
    let camera = Arc::new(MockCamera::new());
    let acquisition = MediaAcquisition::new(camera.clone());

    let session =
        tokio_test::assert_ok!(acquisition.acquire(&MediaConstraints::peer_default()).await);
    let frame = session.video_track().unwrap().latest_frame().unwrap();

    assert_eq!(frame.resolution(), VideoResolution::QVGA);
    assert_eq!(frame.format, FrameFormat::Rgb24);
    assert_eq!(frame.data.len(), frame.expected_rgb_len());
}

#[tokio::test]
async fn test_stopped_track_yields_no_frames() {
    let camera = MockCamera::new();
    let track = camera.open(&MediaConstraints::default()).await.unwrap();
    assert!(track.latest_frame().is_some());

    track.stop();
    track.stop();
    assert!(!track.is_live());
    assert!(track.latest_frame().is_none());
    assert_eq!(camera.live_count(), 0);
}

#[tokio::test]
async fn test_dropping_track_releases_device() {
    let camera = MockCamera::new();
    {
        let _track = camera.open(&MediaConstraints::default()).await.unwrap();
        assert_eq!(camera.live_count(), 1);
    }
    assert_eq!(camera.live_count(), 0);
}

#[tokio::test]
async fn test_unavailable_camera_reports_device_error() {
    let acquisition = MediaAcquisition::new(Arc::new(MockCamera::unavailable()));
    let err = tokio_test::assert_err!(acquisition.acquire(&MediaConstraints::default()).await);

    assert!(matches!(err, MediaError::DeviceUnavailable { .. }));
    assert!(!err.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn test_slow_open_completes_after_delay() {
    let camera = Arc::new(MockCamera::new().with_open_delay(Duration::from_secs(2)));
    let acquisition = MediaAcquisition::new(camera.clone());

    let started = tokio::time::Instant::now();
    let session = acquisition
        .acquire(&MediaConstraints::default())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(session.is_active());
    assert_eq!(camera.open_count(), 1);
}
