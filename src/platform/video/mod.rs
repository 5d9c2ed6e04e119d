// Video frame sources
// Decoders behind this trait yield frames in source order, one at a time.

pub mod ffmpeg_cli;

#[cfg(feature = "ffmpeg-native")]
pub mod ffmpeg_native;

pub use ffmpeg_cli::{FfmpegCliSource, FfmpegTools};

#[cfg(feature = "ffmpeg-native")]
pub use ffmpeg_native::FFmpegDecoder;

use crate::models::capture::{CaptureResult, RawFrame};

/// Sequential reader over the decoded frames of one video
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` once the stream is exhausted
    fn next_frame(&mut self) -> CaptureResult<Option<RawFrame>>;

    /// Frame width and height in pixels
    fn dimensions(&self) -> (u32, u32);
}
