//! Frame encoders
//!
//! JPEG is what the polling path uploads. H.264 (behind the `h264` feature)
//! feeds the outbound peer track and decodes the annotated stream coming
//! back.

use crate::error::{MediaError, MediaResult};
use crate::tracks::{VideoFrame, VideoResolution};
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

#[cfg(feature = "h264")]
use openh264::{
    decoder::Decoder as OpenH264Decoder,
    encoder::Encoder as OpenH264Encoder,
    formats::{RgbSliceU8, YUVBuffer, YUVSource},
};

/// Default JPEG quality for uploaded frames
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Compresses RGB frames to JPEG, optionally downscaling first
#[derive(Debug, Clone)]
pub struct JpegEncoder {
    quality: u8,
    target: Option<VideoResolution>,
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            target: None,
        }
    }
}

impl JpegEncoder {
    /// Create an encoder; quality is clamped to 1..=100
    pub fn new(quality: u8, target: Option<VideoResolution>) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            target,
        }
    }

    /// JPEG quality in use
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Resize target, if any
    pub fn target(&self) -> Option<VideoResolution> {
        self.target
    }

    /// Encode a raw RGB frame
    pub fn encode(&self, frame: &VideoFrame) -> MediaResult<Vec<u8>> {
        let expected = frame.expected_rgb_len();
        if frame.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: frame.data.len(),
            });
        }

        let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(
            MediaError::InvalidFrameData {
                expected,
                actual: frame.data.len(),
            },
        )?;

        let image = match self.target {
            Some(target) if target.is_valid() && target != frame.resolution() => {
                imageops::resize(&image, target.width, target.height, FilterType::Triangle)
            }
            _ => image,
        };

        let mut out = Vec::with_capacity(image.as_raw().len() / 8);
        ImageJpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&image)
            .map_err(|e| MediaError::EncodingFailed {
                codec: "jpeg".to_string(),
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}

/// H.264 encoder for the outbound peer track
///
/// Not `Sync`; keep it on the thread that feeds it.
#[cfg(feature = "h264")]
pub struct H264Encoder {
    inner: OpenH264Encoder,
}

#[cfg(feature = "h264")]
impl std::fmt::Debug for H264Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H264Encoder").finish_non_exhaustive()
    }
}

#[cfg(feature = "h264")]
impl H264Encoder {
    /// Create an encoder with openh264's default settings
    pub fn new() -> MediaResult<Self> {
        let inner = OpenH264Encoder::new().map_err(|e| MediaError::CodecInitializationFailed {
            codec: "h264".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Encode one RGB frame into an Annex B access unit
    pub fn encode(&mut self, frame: &VideoFrame) -> MediaResult<Vec<u8>> {
        let expected = frame.expected_rgb_len();
        if frame.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: frame.data.len(),
            });
        }
        if frame.width % 2 != 0 || frame.height % 2 != 0 {
            return Err(MediaError::EncodingFailed {
                codec: "h264".to_string(),
                reason: format!("odd frame size {}x{}", frame.width, frame.height),
            });
        }

        let rgb = RgbSliceU8::new(&frame.data, (frame.width as usize, frame.height as usize));
        let yuv = YUVBuffer::from_rgb_source(rgb);
        let bitstream = self
            .inner
            .encode(&yuv)
            .map_err(|e| MediaError::EncodingFailed {
                codec: "h264".to_string(),
                reason: e.to_string(),
            })?;
        Ok(bitstream.to_vec())
    }
}

/// H.264 decoder for the annotated stream returned by the backend
#[cfg(feature = "h264")]
pub struct H264Decoder {
    inner: OpenH264Decoder,
}

#[cfg(feature = "h264")]
impl std::fmt::Debug for H264Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H264Decoder").finish_non_exhaustive()
    }
}

#[cfg(feature = "h264")]
impl H264Decoder {
    /// Create a decoder
    pub fn new() -> MediaResult<Self> {
        let inner = OpenH264Decoder::new().map_err(|e| MediaError::CodecInitializationFailed {
            codec: "h264".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Decode an access unit; `Ok(None)` until the decoder has a full picture
    pub fn decode(&mut self, access_unit: &[u8]) -> MediaResult<Option<VideoFrame>> {
        let decoded = self
            .inner
            .decode(access_unit)
            .map_err(|e| MediaError::EncodingFailed {
                codec: "h264".to_string(),
                reason: e.to_string(),
            })?;

        Ok(decoded.map(|yuv| {
            let (width, height) = yuv.dimensions();
            let mut rgb = vec![0u8; width * height * 3];
            yuv.write_rgb8(&mut rgb);
            VideoFrame::rgb(width as u32, height as u32, rgb)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 90]);
            }
        }
        VideoFrame::rgb(width, height, data)
    }

    #[test]
    fn test_jpeg_has_soi_marker() {
        let encoder = JpegEncoder::default();
        let jpeg = encoder.encode(&gradient(64, 48)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_jpeg_resizes_to_target() {
        let encoder = JpegEncoder::new(80, Some(VideoResolution::new(32, 24)));
        let jpeg = encoder.encode(&gradient(64, 48)).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_jpeg_rejects_short_buffer() {
        let frame = VideoFrame::rgb(10, 10, vec![0; 20]);
        let err = JpegEncoder::default().encode(&frame).unwrap_err();
        assert!(matches!(
            err,
            MediaError::InvalidFrameData {
                expected: 300,
                actual: 20
            }
        ));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegEncoder::new(0, None).quality(), 1);
        assert_eq!(JpegEncoder::new(200, None).quality(), 100);
    }

    #[cfg(feature = "h264")]
    #[test]
    fn test_h264_rejects_odd_dimensions() {
        let mut encoder = H264Encoder::new().unwrap();
        let err = encoder.encode(&gradient(33, 24)).unwrap_err();
        assert!(matches!(err, MediaError::EncodingFailed { .. }));
    }
}
