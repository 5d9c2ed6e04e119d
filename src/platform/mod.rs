// Platform seam: video decoding and hand landmark detection backends

pub mod pose;
pub mod video;

use crate::models::capture::CaptureResult;
use crate::models::pose::PoseResult;
use pose::{DetectorConfig, HandLandmarkBridge};
use std::path::Path;
use video::{FfmpegTools, FrameSource};

/// Factory for the per-video resources a pipeline needs.
///
/// Implementations are shared read-only across folder workers; every call
/// returns a fresh resource owned by the caller.
pub trait MediaBackend: Send + Sync {
    /// Open a video for sequential frame reading
    fn open_video(&self, path: &Path) -> CaptureResult<Box<dyn FrameSource>>;

    /// Create a detector instance scoped to one video
    fn create_detector(&self) -> PoseResult<Box<dyn HandLandmarkBridge>>;
}

/// FFmpeg decoding plus the configured detector
#[derive(Debug, Clone, Default)]
pub struct DefaultBackend {
    detector: DetectorConfig,
    ffmpeg: FfmpegTools,
}

impl DefaultBackend {
    pub fn new(detector: DetectorConfig, ffmpeg: FfmpegTools) -> Self {
        Self { detector, ffmpeg }
    }
}

impl MediaBackend for DefaultBackend {
    #[cfg(feature = "ffmpeg-native")]
    fn open_video(&self, path: &Path) -> CaptureResult<Box<dyn FrameSource>> {
        Ok(Box::new(video::FFmpegDecoder::open(path)?))
    }

    #[cfg(not(feature = "ffmpeg-native"))]
    fn open_video(&self, path: &Path) -> CaptureResult<Box<dyn FrameSource>> {
        Ok(Box::new(video::FfmpegCliSource::open(&self.ffmpeg, path)?))
    }

    fn create_detector(&self) -> PoseResult<Box<dyn HandLandmarkBridge>> {
        pose::create_detector(&self.detector)
    }
}
