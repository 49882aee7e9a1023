//! Track abstractions and video frame types

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VideoResolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoResolution {
    /// Create a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 320x240
    pub const QVGA: Self = Self::new(320, 240);
    /// 640x480
    pub const VGA: Self = Self::new(640, 480);
    /// 960x540
    pub const QHD: Self = Self::new(960, 540);

    /// Number of pixels
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Both dimensions non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Pixel layout of a [`VideoFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// H.264 Annex B access unit
    H264,
}

/// Video frame representation
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame data (raw or encoded, see `format`)
    pub data: Vec<u8>,
    /// Pixel layout
    pub format: FrameFormat,
    /// Timestamp in milliseconds
    pub timestamp: u64,
}

impl VideoFrame {
    /// Build a raw RGB frame stamped with the current time
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            format: FrameFormat::Rgb24,
            timestamp: now_millis(),
        }
    }

    /// Expected byte length for a raw RGB frame of this size
    pub fn expected_rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Frame resolution
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Latest-frame slot shared between a capture backend and its consumers
pub type FrameReceiver = watch::Receiver<Option<Arc<VideoFrame>>>;
/// Producer side of [`FrameReceiver`]
pub type FrameSender = watch::Sender<Option<Arc<VideoFrame>>>;

/// Create an empty latest-frame slot
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    watch::channel(None)
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Video track
    Video,
    /// Audio track
    Audio,
}

/// Backend hook that releases the device behind a track
#[async_trait]
pub trait CaptureControl: Send + Sync + std::fmt::Debug {
    /// Stop producing frames and start releasing the device
    fn stop(&self);

    /// Resolve once the device is closed and may be opened again
    async fn wait_released(&self) {}
}

/// A live local capture track
#[derive(Debug)]
pub struct CaptureTrack {
    id: String,
    kind: TrackKind,
    label: String,
    frames: FrameReceiver,
    live: AtomicBool,
    control: Arc<dyn CaptureControl>,
}

impl CaptureTrack {
    /// Create a video track fed by `frames` and released through `control`
    pub fn video(
        label: impl Into<String>,
        frames: FrameReceiver,
        control: Arc<dyn CaptureControl>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: TrackKind::Video,
            label: label.into(),
            frames,
            live: AtomicBool::new(true),
            control,
        }
    }

    /// Track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Device label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the track still produces frames
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Most recent frame, if any has arrived yet
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        if !self.is_live() {
            return None;
        }
        self.frames.borrow().clone()
    }

    /// A receiver that wakes on every new frame
    pub fn subscribe(&self) -> FrameReceiver {
        self.frames.clone()
    }

    /// Stop the track; calling it again does nothing
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.control.stop();
            debug!(track_id = %self.id, label = %self.label, "track stopped");
        }
    }

    /// Stop the track and wait until the device behind it is closed
    pub async fn stop_and_wait(&self) {
        self.stop();
        self.control.wait_released().await;
    }
}

impl Drop for CaptureTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Consumer of frames for display
///
/// The peer delivery path draws remote frames into one of these.
pub trait FrameSink: Send + Sync {
    /// Present a frame
    fn present(&self, frame: &VideoFrame);

    /// Clear whatever is shown
    fn clear(&self);
}
