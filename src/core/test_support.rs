// Scripted media backend for exercising the pipeline without ffmpeg or MediaPipe

use crate::models::capture::{CaptureError, CaptureResult, RawFrame};
use crate::models::pose::{HandPose, Keypoint3D, PoseError, PoseResult, KEYPOINTS_PER_HAND};
use crate::platform::pose::HandLandmarkBridge;
use crate::platform::video::FrameSource;
use crate::platform::MediaBackend;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Frame code: one hand with only five keypoints
pub const PARTIAL: u8 = 200;
/// Frame code: the detector process dies on this frame
pub const DETECTOR_EXITS: u8 = 253;
/// Frame code: the decoder fails instead of producing this frame
pub const DECODE_FAILS: u8 = 254;
/// Frame code: the detector fails on this frame
pub const DETECTOR_FAILS: u8 = 255;

const WIDTH: u32 = 8;
const HEIGHT: u32 = 8;

/// Each video file name maps to one code per frame; a code below
/// [`PARTIAL`] is the number of complete hands in that frame.
#[derive(Default)]
pub struct ScriptedBackend {
    videos: HashMap<String, Vec<u8>>,
    panic_folder: Option<String>,
    pub detectors_created: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video(mut self, file_name: &str, frames: Vec<u8>) -> Self {
        self.videos.insert(file_name.to_string(), frames);
        self
    }

    /// Panic when asked to open any video inside a folder with this name
    pub fn panic_in(mut self, folder_name: &str) -> Self {
        self.panic_folder = Some(folder_name.to_string());
        self
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_video(&self, path: &Path) -> CaptureResult<Box<dyn FrameSource>> {
        let folder = path.parent().and_then(|p| p.file_name());
        if let (Some(panic_folder), Some(folder)) = (&self.panic_folder, folder) {
            if folder.to_string_lossy() == panic_folder.as_str() {
                panic!("scripted panic opening {}", path.display());
            }
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let frames = self
            .videos
            .get(&name)
            .cloned()
            .ok_or_else(|| CaptureError::SourceUnavailable {
                path: path.display().to_string(),
                reason: "not scripted".to_string(),
            })?;
        Ok(Box::new(ScriptedSource { frames, next: 0 }))
    }

    fn create_detector(&self) -> PoseResult<Box<dyn HandLandmarkBridge>> {
        self.detectors_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDetector))
    }
}

struct ScriptedSource {
    frames: Vec<u8>,
    next: usize,
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> CaptureResult<Option<RawFrame>> {
        let Some(&code) = self.frames.get(self.next) else {
            return Ok(None);
        };
        if code == DECODE_FAILS {
            self.next += 1;
            return Err(CaptureError::DecodeFailed(format!(
                "scripted corrupt frame {}",
                self.next - 1
            )));
        }
        let mut data = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
        data[0] = code;
        let frame = RawFrame::rgb(self.next as u64, WIDTH, HEIGHT, data);
        self.next += 1;
        Ok(Some(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }
}

struct ScriptedDetector;

impl HandLandmarkBridge for ScriptedDetector {
    fn process_frame(&mut self, frame: &RawFrame) -> PoseResult<Vec<HandPose>> {
        match frame.data[0] {
            DETECTOR_FAILS => Err(PoseError::InferenceFailed("scripted failure".to_string())),
            DETECTOR_EXITS => Err(PoseError::ProcessExited("scripted exit".to_string())),
            PARTIAL => Ok(vec![hand(0, 5)]),
            n => Ok((0..n as usize).map(|h| hand(h, KEYPOINTS_PER_HAND)).collect()),
        }
    }

    fn get_model_info(&self) -> String {
        "scripted".to_string()
    }
}

fn hand(index: usize, keypoints: usize) -> HandPose {
    HandPose {
        landmarks: (0..keypoints)
            .map(|i| Keypoint3D::new(0.1 + index as f32 * 0.4, 0.02 * i as f32, -0.5))
            .collect(),
    }
}

/// Create an empty file standing in for a video
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"").unwrap();
}
