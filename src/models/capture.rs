// Data structures for decoded video frames

use image::RgbImage;

/// Bytes per pixel of a decoded frame (tightly packed RGB24)
pub const RGB_CHANNELS: u32 = 3;

/// A decoded RGB24 frame from a video source
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// 0-based position of the frame in source order
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Wrap tightly packed RGB24 bytes
    pub fn rgb(index: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            data,
        }
    }

    /// Expected buffer size for the frame dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * RGB_CHANNELS as usize
    }

    /// Copy the frame into an image buffer.
    ///
    /// Returns `None` if the buffer does not match the frame dimensions.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.data.len() != self.expected_len() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Error types for frame source operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Cannot open video source {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("Frame decoding failed: {0}")]
    DecodeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
