//! Camera acquisition
//!
//! [`MediaAcquisition`] owns the single active [`MediaSession`]. Acquiring a
//! new session always releases the previous one first so the process never
//! holds two camera locks.

use crate::error::MediaResult;
use crate::tracks::{CaptureTrack, TrackKind, VideoResolution};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Requested capture parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Device index
    pub device_index: u32,
    /// Preferred resolution, `None` for the device's native one
    pub ideal_resolution: Option<VideoResolution>,
    /// Preferred frame rate
    pub ideal_frame_rate: Option<u32>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            device_index: 0,
            ideal_resolution: None,
            ideal_frame_rate: None,
        }
    }
}

impl MediaConstraints {
    /// Low-bandwidth constraints used for peer delivery (320x240 @ 15 fps)
    pub fn peer_default() -> Self {
        Self {
            device_index: 0,
            ideal_resolution: Some(VideoResolution::QVGA),
            ideal_frame_rate: Some(15),
        }
    }
}

/// Source of camera tracks
#[async_trait]
pub trait CameraBackend: Send + Sync + std::fmt::Debug {
    /// Open the camera and return its video track
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn open(&self, constraints: &MediaConstraints) -> MediaResult<CaptureTrack>;
}

/// An open camera stream and its tracks
#[derive(Debug)]
pub struct MediaSession {
    id: String,
    tracks: Vec<Arc<CaptureTrack>>,
}

impl MediaSession {
    /// Wrap already-opened tracks
    pub fn new(tracks: Vec<Arc<CaptureTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks
    pub fn tracks(&self) -> &[Arc<CaptureTrack>] {
        &self.tracks
    }

    /// First video track
    pub fn video_track(&self) -> Option<Arc<CaptureTrack>> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
            .cloned()
    }

    /// Whether any track is still live
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    /// Stop every track
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Stop every track and wait until their devices are closed
    pub async fn stop_and_wait(&self) {
        for track in &self.tracks {
            track.stop_and_wait().await;
        }
    }
}

/// Owner of the single active camera session
#[derive(Debug)]
pub struct MediaAcquisition {
    backend: Arc<dyn CameraBackend>,
    active: Mutex<Option<Arc<MediaSession>>>,
}

impl MediaAcquisition {
    /// Create an acquisition component over a camera backend
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            active: Mutex::new(None),
        }
    }

    /// Open the camera, releasing any session that is already active
    pub async fn acquire(&self, constraints: &MediaConstraints) -> MediaResult<Arc<MediaSession>> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(session_id = %previous.id(), "releasing previous media session");
            previous.stop_and_wait().await;
        }

        let track = self.backend.open(constraints).await?;
        let session = Arc::new(MediaSession::new(vec![Arc::new(track)]));
        info!(
            session_id = %session.id(),
            tracks = session.tracks().len(),
            "media session acquired"
        );

        *active = Some(session.clone());
        Ok(session)
    }

    /// Stop all tracks of the active session and wait for the device to
    /// close; safe to call when idle
    pub async fn release(&self) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.take() {
            session.stop_and_wait().await;
            info!(session_id = %session.id(), "media session released");
        }
    }

    /// The active session, if any
    pub async fn active(&self) -> Option<Arc<MediaSession>> {
        self.active.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reacquire_releases_previous_session() {
        let camera = Arc::new(MockCamera::new());
        let acquisition = MediaAcquisition::new(camera.clone());

        let first = acquisition
            .acquire(&MediaConstraints::default())
            .await
            .unwrap();
        let second = acquisition
            .acquire(&MediaConstraints::default())
            .await
            .unwrap();

        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(camera.open_count(), 2);
        assert_eq!(camera.live_count(), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let camera = Arc::new(MockCamera::new());
        let acquisition = MediaAcquisition::new(camera.clone());

        acquisition.release().await;
        let session = acquisition
            .acquire(&MediaConstraints::default())
            .await
            .unwrap();
        acquisition.release().await;
        acquisition.release().await;

        assert!(!session.is_active());
        assert_eq!(camera.live_count(), 0);
        assert!(acquisition.active().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_device_close() {
        let camera = Arc::new(MockCamera::new().with_release_delay(Duration::from_millis(300)));
        let acquisition = MediaAcquisition::new(camera.clone());

        acquisition
            .acquire(&MediaConstraints::default())
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        acquisition.release().await;

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(camera.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_never_overlaps_slow_close() {
        let camera = Arc::new(MockCamera::new().with_release_delay(Duration::from_millis(300)));
        let acquisition = MediaAcquisition::new(camera.clone());

        for _ in 0..3 {
            acquisition
                .acquire(&MediaConstraints::default())
                .await
                .unwrap();
        }
        acquisition.release().await;

        assert_eq!(camera.open_count(), 3);
        assert_eq!(camera.peak_live_count(), 1);
        assert_eq!(camera.live_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_nothing_active() {
        let camera = Arc::new(MockCamera::denying());
        let acquisition = MediaAcquisition::new(camera.clone());

        let result = acquisition.acquire(&MediaConstraints::default()).await;
        assert!(matches!(
            result,
            Err(crate::MediaError::PermissionDenied { .. })
        ));
        assert!(acquisition.active().await.is_none());
        assert_eq!(camera.live_count(), 0);
    }
}
