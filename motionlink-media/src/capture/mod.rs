#[cfg(feature = "camera")]
pub mod native;

use crate::acquisition::{CameraBackend, MediaConstraints};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{
    frame_channel, CaptureControl, CaptureTrack, FrameSender, VideoFrame, VideoResolution,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Get the appropriate camera backend for this build
pub fn default_camera() -> Arc<dyn CameraBackend> {
    #[cfg(feature = "camera")]
    {
        Arc::new(native::NokhwaCamera::new())
    }
    #[cfg(not(feature = "camera"))]
    {
        Arc::new(MockCamera::new())
    }
}

#[derive(Debug, Clone, Copy)]
enum MockFailure {
    Denied,
    Unavailable,
}

/// Synthetic camera producing a single grey frame
///
/// Used on builds without a native capture backend and by tests. It counts
/// opens and currently-live tracks so callers can check that sessions are
/// released. A release delay models a device that closes some time after
/// it was told to stop.
#[derive(Debug)]
pub struct MockCamera {
    resolution: VideoResolution,
    failure: Option<MockFailure>,
    open_delay: Duration,
    release_delay: Duration,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
    peak_live: AtomicUsize,
}

impl MockCamera {
    /// 320x240 camera that opens immediately
    pub fn new() -> Self {
        Self {
            resolution: VideoResolution::QVGA,
            failure: None,
            open_delay: Duration::ZERO,
            release_delay: Duration::ZERO,
            opens: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            peak_live: AtomicUsize::new(0),
        }
    }

    /// Camera whose every open fails with `PermissionDenied`
    pub fn denying() -> Self {
        Self {
            failure: Some(MockFailure::Denied),
            ..Self::new()
        }
    }

    /// Camera whose every open fails with `DeviceUnavailable`
    pub fn unavailable() -> Self {
        Self {
            failure: Some(MockFailure::Unavailable),
            ..Self::new()
        }
    }

    /// Delay each open, to model a slow permission prompt
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Keep the device open for `delay` after each stop
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    /// Use a different frame size
    pub fn with_resolution(mut self, resolution: VideoResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Number of open attempts so far
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of devices opened and not yet closed
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most devices ever open at the same time
    pub fn peak_live_count(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for MockCamera {
    async fn open(&self, constraints: &MediaConstraints) -> MediaResult<CaptureTrack> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        match self.failure {
            Some(MockFailure::Denied) => {
                return Err(MediaError::PermissionDenied {
                    operation: format!("open camera {}", constraints.device_index),
                })
            }
            Some(MockFailure::Unavailable) => {
                return Err(MediaError::DeviceUnavailable {
                    reason: format!("no camera at index {}", constraints.device_index),
                })
            }
            None => {}
        }

        let resolution = constraints.ideal_resolution.unwrap_or(self.resolution);
        let (sender, receiver) = frame_channel();
        let data = vec![128u8; resolution.pixel_count() as usize * 3];
        sender.send_replace(Some(Arc::new(VideoFrame::rgb(
            resolution.width,
            resolution.height,
            data,
        ))));

        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(now_live, Ordering::SeqCst);
        let (released, _) = watch::channel(false);
        let control = Arc::new(MockControl {
            live: self.live.clone(),
            stopped: AtomicBool::new(false),
            release_delay: self.release_delay,
            released: Arc::new(released),
            _sender: sender,
        });
        Ok(CaptureTrack::video("Mock Camera", receiver, control))
    }
}

#[derive(Debug)]
struct MockControl {
    live: Arc<AtomicUsize>,
    stopped: AtomicBool,
    release_delay: Duration,
    released: Arc<watch::Sender<bool>>,
    _sender: FrameSender,
}

fn close_device(live: &AtomicUsize, released: &watch::Sender<bool>) {
    live.fetch_sub(1, Ordering::SeqCst);
    released.send_replace(true);
}

#[async_trait]
impl CaptureControl for MockControl {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let runtime = tokio::runtime::Handle::try_current();
        match runtime {
            Ok(handle) if !self.release_delay.is_zero() => {
                let (live, released) = (self.live.clone(), self.released.clone());
                let delay = self.release_delay;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    close_device(&live, &released);
                });
            }
            _ => close_device(&self.live, &self.released),
        }
    }

    async fn wait_released(&self) {
        let mut released = self.released.subscribe();
        let _ = released.wait_for(|closed| *closed).await;
    }
}
