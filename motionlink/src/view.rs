//! Presentation seam
//!
//! The controller never draws anything itself. It tells a [`ViewSurface`]
//! which mode is active, which surface to show, and what was logged; the
//! peer path also hands it decoded remote frames through [`FrameSink`].

use crate::activity_log::LogEntry;
use crate::session::ViewMode;
use motionlink_core::StreamStatus;
use motionlink_media::{FrameSink, VideoFrame};
use parking_lot::Mutex;
use tracing::{debug, info};

/// What the main display area shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surface {
    /// Local canvas (demo animation or local preview)
    Canvas,
    /// Frames coming back over the peer connection
    RemoteVideo,
    /// Server-pushed MJPEG stream at this URL
    MjpegFeed(String),
}

/// UI affordances driven by the controller
pub trait ViewSurface: FrameSink {
    /// Highlight the demo or live button
    fn show_mode(&self, mode: ViewMode);

    /// Switch the display area
    fn show_surface(&self, surface: Surface);

    /// Monitoring indicator ("Monitoring Active" / "Paused")
    fn show_monitoring(&self, enabled: bool);

    /// Highlight the active detector button
    fn show_detection_mode(&self, mode: &str);

    /// Render a freshly appended log entry
    fn log_appended(&self, entry: &LogEntry);

    /// Event stream connection indicator
    fn show_backend_status(&self, status: StreamStatus);
}

/// View that reports everything through `tracing`
#[derive(Debug, Default)]
pub struct TracingView {
    frames: std::sync::atomic::AtomicU64,
}

impl TracingView {
    /// Create the view
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for TracingView {
    fn present(&self, frame: &VideoFrame) {
        let n = self
            .frames
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if n % 30 == 0 {
            debug!(width = frame.width, height = frame.height, frames = n + 1, "remote frame");
        }
    }

    fn clear(&self) {
        debug!("display cleared");
    }
}

impl ViewSurface for TracingView {
    fn show_mode(&self, mode: ViewMode) {
        info!(mode = %mode, "view mode");
    }

    fn show_surface(&self, surface: Surface) {
        info!(surface = ?surface, "display surface");
    }

    fn show_monitoring(&self, enabled: bool) {
        info!(status = if enabled { "Monitoring Active" } else { "Paused" }, "monitoring");
    }

    fn show_detection_mode(&self, mode: &str) {
        info!(mode, "detection mode");
    }

    fn log_appended(&self, entry: &LogEntry) {
        info!(category = entry.category.as_str(), "{}", entry.text);
    }

    fn show_backend_status(&self, status: StreamStatus) {
        info!(status = ?status, "backend status");
    }
}

/// Everything a [`RecordingView`] was told, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedView {
    /// Every mode shown
    pub modes: Vec<ViewMode>,
    /// Every surface shown
    pub surfaces: Vec<Surface>,
    /// Every monitoring flag shown
    pub monitoring: Vec<bool>,
    /// Every detector highlighted
    pub detection_modes: Vec<String>,
    /// Text of every appended log entry
    pub log: Vec<String>,
    /// Every backend status shown
    pub statuses: Vec<StreamStatus>,
    /// Remote frames presented
    pub frames_presented: usize,
    /// Times the display was cleared
    pub clears: usize,
}

/// Headless view that records calls, for tests and embedding
#[derive(Debug, Default)]
pub struct RecordingView {
    record: Mutex<RecordedView>,
}

impl RecordingView {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> RecordedView {
        self.record.lock().clone()
    }

    /// Last mode shown
    pub fn current_mode(&self) -> Option<ViewMode> {
        self.record.lock().modes.last().copied()
    }

    /// Last surface shown
    pub fn current_surface(&self) -> Option<Surface> {
        self.record.lock().surfaces.last().cloned()
    }
}

impl FrameSink for RecordingView {
    fn present(&self, _frame: &VideoFrame) {
        self.record.lock().frames_presented += 1;
    }

    fn clear(&self) {
        self.record.lock().clears += 1;
    }
}

impl ViewSurface for RecordingView {
    fn show_mode(&self, mode: ViewMode) {
        self.record.lock().modes.push(mode);
    }

    fn show_surface(&self, surface: Surface) {
        self.record.lock().surfaces.push(surface);
    }

    fn show_monitoring(&self, enabled: bool) {
        self.record.lock().monitoring.push(enabled);
    }

    fn show_detection_mode(&self, mode: &str) {
        self.record.lock().detection_modes.push(mode.to_string());
    }

    fn log_appended(&self, entry: &LogEntry) {
        self.record.lock().log.push(entry.text.clone());
    }

    fn show_backend_status(&self, status: StreamStatus) {
        self.record.lock().statuses.push(status);
    }
}
