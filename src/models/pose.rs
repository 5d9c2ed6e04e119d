// Data models for hand tracking: raw detector output and labeled observations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of landmarks in the MediaPipe hand skeleton
pub const KEYPOINTS_PER_HAND: usize = 21;

// ==============================================================================
// Raw detector output (21 keypoints per hand)
// ==============================================================================

/// A 3D keypoint as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint3D {
    pub x: f32, // Normalized [0, 1] relative to frame width
    pub y: f32, // Normalized [0, 1] relative to frame height
    pub z: f32, // Relative depth, detector-defined
}

impl Keypoint3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One hand as returned by the detector, keypoints in model order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandPose {
    pub landmarks: Vec<Keypoint3D>,
}

/// MediaPipe Hand Landmark indices (21 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandLandmark {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexFingerMcp = 5,
    IndexFingerPip = 6,
    IndexFingerDip = 7,
    IndexFingerTip = 8,
    MiddleFingerMcp = 9,
    MiddleFingerPip = 10,
    MiddleFingerDip = 11,
    MiddleFingerTip = 12,
    RingFingerMcp = 13,
    RingFingerPip = 14,
    RingFingerDip = 15,
    RingFingerTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

impl HandLandmark {
    /// Stable table label for this landmark
    pub fn label(self) -> KeypointLabel {
        KeypointLabel::from_index(self as usize)
    }
}

/// Bone pairs used when drawing the skeleton overlay
pub const HAND_CONNECTIONS: &[(HandLandmark, HandLandmark)] = {
    use HandLandmark::*;
    &[
        (Wrist, ThumbCmc),
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

// ==============================================================================
// Labeled observations
// ==============================================================================

/// 1-based keypoint label, rendered as `a1`..`a21`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeypointLabel(u16);

impl KeypointLabel {
    /// Label for the keypoint at 0-based detector position `index`
    pub fn from_index(index: usize) -> Self {
        Self(index as u16 + 1)
    }

    /// 0-based detector position
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Table column names for the x, y and z components
    pub fn column_names(self) -> [String; 3] {
        [
            format!("{}_x", self),
            format!("{}_y", self),
            format!("{}_z", self),
        ]
    }
}

impl fmt::Display for KeypointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// A labeled keypoint with coordinates in the detector's normalized units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledKeypoint {
    pub label: KeypointLabel,
    pub position: [f32; 3],
}

/// The labeled keypoints of one detected hand in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    keypoints: Vec<LabeledKeypoint>,
    /// Category label of the source folder, attached by the video pipeline
    pub label: Option<String>,
}

impl HandObservation {
    /// Build an observation, keeping keypoints ordered by label.
    ///
    /// If the same label appears twice the later keypoint wins.
    pub fn new(mut keypoints: Vec<LabeledKeypoint>) -> Self {
        keypoints.sort_by_key(|kp| kp.label);
        keypoints.dedup_by(|later, earlier| {
            if later.label == earlier.label {
                *earlier = *later;
                true
            } else {
                false
            }
        });
        Self {
            keypoints,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn keypoints(&self) -> &[LabeledKeypoint] {
        &self.keypoints
    }

    pub fn keypoint(&self, label: KeypointLabel) -> Option<&LabeledKeypoint> {
        self.keypoints
            .binary_search_by_key(&label, |kp| kp.label)
            .ok()
            .map(|i| &self.keypoints[i])
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// True when all 21 distinct keypoints are present
    pub fn is_complete(&self) -> bool {
        self.keypoints.len() == KEYPOINTS_PER_HAND
    }

    /// Axis-aligned bounds in normalized units as `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let mut iter = self.keypoints.iter();
        let first = iter.next()?;
        let init = (
            first.position[0],
            first.position[1],
            first.position[0],
            first.position[1],
        );
        Some(iter.fold(init, |(x0, y0, x1, y1), kp| {
            (
                x0.min(kp.position[0]),
                y0.min(kp.position[1]),
                x1.max(kp.position[0]),
                y1.max(kp.position[1]),
            )
        }))
    }

    /// Mean x/y position of all keypoints
    pub fn centroid(&self) -> Option<[f32; 2]> {
        if self.keypoints.is_empty() {
            return None;
        }
        let n = self.keypoints.len() as f32;
        let (sx, sy) = self
            .keypoints
            .iter()
            .fold((0.0, 0.0), |(sx, sy), kp| (sx + kp.position[0], sy + kp.position[1]));
        Some([sx / n, sy / n])
    }
}

/// One frame of a video: its ordinal and the hand kept for it, if any
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub ordinal: u64,
    pub observation: Option<HandObservation>,
}

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub max_num_hands: u32,                // Hands reported per frame (default: 2)
    pub min_detection_confidence: f32,     // Minimum confidence for detection (default: 0.5)
    pub min_tracking_confidence: f32,      // Minimum confidence for tracking (default: 0.5)
    pub model_complexity: ModelComplexity, // Model complexity (0=lite, 1=full)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelComplexity {
    Lite = 0, // Fastest, less accurate
    Full = 1, // Balanced
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            max_num_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: ModelComplexity::Full,
        }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// The detector can no longer answer; later frames would fail the same way
    #[error("Detector process exited: {0}")]
    ProcessExited(String),
}

pub type PoseResult<T> = Result<T, PoseError>;
