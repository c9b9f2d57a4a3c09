//! Decoded video frames
//!
//! Cameras send one encoded still image (normally JPEG) per WebSocket
//! message. Frames are decoded to RGB once on ingestion, annotated in place
//! by the worker and re-encoded as JPEG by the output relay.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use tokio::time::Instant;

use crate::error::FrameError;

/// Smallest payload that can plausibly be an encoded image
pub const MIN_FRAME_BYTES: usize = 100;

/// Default JPEG quality for relayed frames
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// A decoded frame travelling through a session's queues
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data
    pub image: RgbImage,
    /// Per-session arrival sequence number
    pub seq: u64,
    /// When the frame was accepted by ingestion
    pub received_at: Instant,
}

impl Frame {
    /// Wrap an already decoded image
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self {
            image,
            seq,
            received_at: Instant::now(),
        }
    }

    /// Decode an encoded still image
    ///
    /// Payloads shorter than `min_len` are rejected without attempting to
    /// decode them.
    pub fn decode(data: &[u8], min_len: usize) -> Result<RgbImage, FrameError> {
        if data.len() < min_len {
            return Err(FrameError::TooSmall {
                len: data.len(),
                min: min_len,
            });
        }

        let image = image::load_from_memory(data).map_err(|e| FrameError::Decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Decode("image has zero dimensions".into()));
        }
        Ok(image.to_rgb8())
    }

    /// Frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, FrameError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Solid-color JPEG used across the crate's tests
    pub(crate) fn sample_jpeg(width: u32, height: u32) -> Bytes {
        let image = RgbImage::from_pixel(width, height, image::Rgb([90, 120, 150]));
        encode_jpeg(&image, 90).unwrap()
    }

    #[test]
    fn test_decode_rejects_small_payload() {
        let result = Frame::decode(&[0xFF, 0xD8, 0xFF], MIN_FRAME_BYTES);
        assert!(matches!(
            result,
            Err(FrameError::TooSmall { len: 3, min: MIN_FRAME_BYTES })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let garbage = vec![0xAB; 4096];
        let result = Frame::decode(&garbage, MIN_FRAME_BYTES);
        assert!(matches!(result, Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_decode_valid_jpeg() {
        let jpeg = sample_jpeg(64, 48);
        let image = Frame::decode(&jpeg, MIN_FRAME_BYTES).unwrap();
        assert_eq!(image.dimensions(), (64, 48));
    }

    #[test]
    fn test_encode_produces_jpeg_magic() {
        let image = RgbImage::new(16, 16);
        let jpeg = encode_jpeg(&image, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_frame_dimensions() {
        let frame = Frame::new(RgbImage::new(320, 240), 7);
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(frame.seq, 7);
    }
}
