use image::{GrayImage, RgbaImage};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;
use xcap::Monitor;

/// Errors from the screen capture boundary. This is the only error type
/// that crosses out of a scan; everything else is absorbed internally.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capturable display found")]
    NoDisplay,
    #[error("screen capture failed: {0}")]
    Backend(String),
}

/// One captured screen image, already converted to the grayscale
/// representation the matcher searches. Built fresh on every capture and
/// discarded after the scan that used it — never cached.
pub struct Frame {
    pub gray: GrayImage,
    pub captured_at: SystemTime,
}

impl Frame {
    /// Convert a raw RGBA capture into a matchable frame.
    pub fn from_rgba(rgba: &RgbaImage) -> Self {
        Self {
            gray: image::imageops::grayscale(rgba),
            captured_at: SystemTime::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Source of frames for a scan. The screen is the production source;
/// tests inject synthetic sources through this seam.
pub trait FrameSource {
    fn capture(&self) -> Result<Frame, CaptureError>;
}

/// Captures the primary display at its native resolution.
pub struct PrimaryDisplay;

impl FrameSource for PrimaryDisplay {
    fn capture(&self) -> Result<Frame, CaptureError> {
        let monitors = Monitor::all().map_err(|e| CaptureError::Backend(e.to_string()))?;

        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .ok_or(CaptureError::NoDisplay)?;

        let rgba = monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        debug!("Captured primary display at {}x{}", rgba.width(), rgba.height());

        Ok(Frame::from_rgba(&rgba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_frame_from_rgba_dimensions() {
        let rgba = RgbaImage::from_pixel(320, 200, Rgba([10, 20, 30, 255]));
        let frame = Frame::from_rgba(&rgba);
        assert_eq!(frame.width(), 320);
        assert_eq!(frame.height(), 200);
    }

    #[test]
    fn test_frame_is_single_channel() {
        let rgba = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let frame = Frame::from_rgba(&rgba);
        // White stays white through the luma conversion
        assert_eq!(frame.gray.get_pixel(0, 0)[0], 255);
        assert_eq!(frame.gray.as_raw().len(), 64);
    }

    #[test]
    fn test_frame_timestamp_is_recent() {
        let before = SystemTime::now();
        let frame = Frame::from_rgba(&RgbaImage::new(4, 4));
        assert!(frame.captured_at >= before);
    }
}
