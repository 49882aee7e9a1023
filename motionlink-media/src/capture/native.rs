//! Native camera capture through nokhwa
//!
//! The camera handle is not `Send` on every platform, so each session runs
//! on its own capture thread that publishes decoded RGB frames into the
//! track's latest-frame slot. Releasing a track joins that thread, so the
//! device is closed before the next session may open it.

use crate::acquisition::{CameraBackend, MediaConstraints};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{frame_channel, CaptureControl, CaptureTrack, FrameSender, VideoFrame};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Camera backend using the platform's native capture API
#[derive(Debug, Default)]
pub struct NokhwaCamera;

impl NokhwaCamera {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

fn classify(error: NokhwaError, device_index: u32) -> MediaError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("authoriz") {
        MediaError::PermissionDenied {
            operation: format!("open camera {}: {}", device_index, message),
        }
    } else {
        MediaError::DeviceUnavailable {
            reason: format!("camera {}: {}", device_index, message),
        }
    }
}

fn requested_format(constraints: &MediaConstraints) -> RequestedFormat<'static> {
    let kind = match constraints.ideal_resolution {
        Some(resolution) => RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(resolution.width, resolution.height),
            FrameFormat::MJPEG,
            constraints.ideal_frame_rate.unwrap_or(30),
        )),
        None => RequestedFormatType::AbsoluteHighestFrameRate,
    };
    RequestedFormat::new::<RgbFormat>(kind)
}

#[async_trait]
impl CameraBackend for NokhwaCamera {
    async fn open(&self, constraints: &MediaConstraints) -> MediaResult<CaptureTrack> {
        let (sender, receiver) = frame_channel();
        let running = Arc::new(AtomicBool::new(true));
        let (opened_tx, opened_rx) = oneshot::channel::<MediaResult<String>>();

        let device_index = constraints.device_index;
        let requested = requested_format(constraints);
        let thread_running = running.clone();

        let thread = thread::Builder::new()
            .name(format!("motionlink-camera-{}", device_index))
            .spawn(move || {
                capture_loop(device_index, requested, sender, thread_running, opened_tx)
            })?;
        let control = NokhwaControl {
            device_index,
            running,
            thread: Mutex::new(Some(thread)),
        };

        let label = match opened_rx.await {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => {
                control.wait_released().await;
                return Err(e);
            }
            Err(_) => {
                control.wait_released().await;
                return Err(MediaError::DeviceUnavailable {
                    reason: format!("capture thread for camera {} exited", device_index),
                });
            }
        };

        info!(device_index, label = %label, "camera opened");
        let control = Arc::new(control);
        Ok(CaptureTrack::video(label, receiver, control))
    }
}

fn capture_loop(
    device_index: u32,
    requested: RequestedFormat<'static>,
    frames: FrameSender,
    running: Arc<AtomicBool>,
    opened: oneshot::Sender<MediaResult<String>>,
) {
    let mut camera = match Camera::new(CameraIndex::Index(device_index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(classify(e, device_index)));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = opened.send(Err(classify(e, device_index)));
        return;
    }

    let label = camera.info().human_name();
    if opened.send(Ok(label)).is_err() {
        // The caller gave up while the device was opening
        let _ = camera.stop_stream();
        return;
    }

    while running.load(Ordering::SeqCst) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(device_index, error = %e, "frame capture error");
                thread::sleep(std::time::Duration::from_millis(100));
                continue;
            }
        };
        match buffer.decode_image::<RgbFormat>() {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                let frame = VideoFrame::rgb(width, height, image.into_raw());
                frames.send_replace(Some(Arc::new(frame)));
            }
            Err(e) => debug!(device_index, error = %e, "frame decode error"),
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!(device_index, error = %e, "failed to stop camera stream");
    }
    info!(device_index, "camera released");
}

#[derive(Debug)]
struct NokhwaControl {
    device_index: u32,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl CaptureControl for NokhwaControl {
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Joins the capture thread, which closes the stream on its way out
    async fn wait_released(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        let device_index = self.device_index;
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => debug!(device_index, "capture thread joined"),
            Ok(Err(_)) => warn!(device_index, "capture thread panicked"),
            Err(e) => warn!(device_index, error = %e, "failed to join capture thread"),
        }
    }
}
