//! # MotionLink Media
//!
//! Local camera acquisition, frame types, JPEG/H.264 encoding and the polling
//! frame delivery loop.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod acquisition;
/// Camera backends
pub mod capture;
pub mod encoding;
pub mod error;
pub mod frame_delivery;
pub mod tracks;

// Re-export main types
pub use acquisition::{CameraBackend, MediaAcquisition, MediaConstraints, MediaSession};
pub use capture::{default_camera, MockCamera};
#[cfg(feature = "camera")]
pub use capture::native::NokhwaCamera;
#[cfg(feature = "h264")]
pub use encoding::{H264Decoder, H264Encoder};
pub use encoding::{JpegEncoder, DEFAULT_JPEG_QUALITY};
pub use error::{MediaError, MediaResult};
pub use frame_delivery::{
    DeliverySnapshot, DeliveryStats, FrameDelivery, FrameDeliveryConfig, DEFAULT_FRAME_INTERVAL,
};
pub use tracks::{
    frame_channel, CaptureControl, CaptureTrack, FrameFormat, FrameReceiver, FrameSender,
    FrameSink, TrackKind, VideoFrame, VideoResolution,
};
