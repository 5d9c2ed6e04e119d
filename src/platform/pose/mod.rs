// Hand landmark detection platform integration

pub mod mediapipe_bridge;

pub use mediapipe_bridge::{DummyMediaPipe, HandLandmarkBridge, SubprocessMediaPipe};

use crate::models::pose::{PoseConfig, PoseResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which detector implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// MediaPipe Hands in a Python child process
    #[default]
    MediaPipe,
    /// No inference, every frame has zero hands
    None,
}

impl std::str::FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mediapipe" | "media_pipe" => Ok(DetectorBackend::MediaPipe),
            "none" | "dummy" => Ok(DetectorBackend::None),
            other => Err(format!("unknown detector backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: DetectorBackend,
    pub python: PathBuf, // Interpreter with the mediapipe package installed
    pub script: PathBuf, // Path to hand_detect.py
    pub pose: PoseConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::MediaPipe,
            python: PathBuf::from("python3"),
            script: PathBuf::from("python").join("hand_detect.py"),
            pose: PoseConfig::default(),
        }
    }
}

/// Create a detector instance for the configured backend
pub fn create_detector(config: &DetectorConfig) -> PoseResult<Box<dyn HandLandmarkBridge>> {
    match config.backend {
        DetectorBackend::MediaPipe => Ok(Box::new(SubprocessMediaPipe::spawn(
            &config.python,
            &config.script,
            &config.pose,
        )?)),
        DetectorBackend::None => Ok(Box::new(DummyMediaPipe)),
    }
}
