use crate::core::category::validate_label;
use crate::core::hand_selection::HandSelectionPolicy;
use crate::core::video_pipeline::PartialHandPolicy;
use crate::platform::pose::{DetectorBackend, DetectorConfig};
use crate::platform::video::FfmpegTools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Dataset directory under the project root, one subfolder per category
pub const DATASET_DIR: &str = "Data";
/// Output directory under the project root
pub const PROCESSED_DIR: &str = "Processed_Data";

const MAX_WORKERS_LIMIT: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root holding one subdirectory of videos per category
    pub dataset_root: PathBuf,
    /// Where per-video tables and the combined table are written
    pub processed_root: PathBuf,
    /// Process category folders in parallel
    pub concurrent: bool,
    /// Worker pool size when running concurrently
    pub max_workers: usize,
    /// Which hand to keep when several are detected in a frame
    pub hand_selection: HandSelectionPolicy,
    /// What to do with hands that have fewer than 21 keypoints
    pub partial_hands: PartialHandPolicy,
    /// Write annotated PNGs of every frame with a detected hand
    pub annotate_frames: bool,
    /// Folder name -> label replacements
    pub category_overrides: HashMap<String, String>,
    pub detector: DetectorConfig,
    pub ffmpeg: FfmpegTools,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_project(Path::new("."))
    }
}

impl PipelineConfig {
    /// Default configuration for the fixed layout under `root`
    pub fn for_project(root: &Path) -> Self {
        Self {
            dataset_root: root.join(DATASET_DIR),
            processed_root: root.join(PROCESSED_DIR),
            concurrent: false,
            max_workers: default_workers(),
            hand_selection: HandSelectionPolicy::default(),
            partial_hands: PartialHandPolicy::default(),
            annotate_frames: false,
            category_overrides: HashMap::new(),
            detector: DetectorConfig::default(),
            ffmpeg: FfmpegTools::default(),
        }
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents).map_err(io_err)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: String| -> ConfigResult<()> { Err(ConfigError::Invalid(msg)) };

        if self.dataset_root.as_os_str().is_empty() || self.processed_root.as_os_str().is_empty() {
            return invalid("Dataset and processed roots must be set".to_string());
        }

        // Outputs inside the dataset would be picked up as a category folder
        if self.processed_root.starts_with(&self.dataset_root) {
            return invalid(format!(
                "Processed root {} must not be inside the dataset root {}",
                self.processed_root.display(),
                self.dataset_root.display()
            ));
        }

        if self.max_workers == 0 || self.max_workers > MAX_WORKERS_LIMIT {
            return invalid(format!(
                "Invalid max workers: {}. Must be between 1 and {}",
                self.max_workers, MAX_WORKERS_LIMIT
            ));
        }

        let pose = &self.detector.pose;
        if pose.max_num_hands == 0 {
            return invalid("Detector max_num_hands must be at least 1".to_string());
        }
        for (name, value) in [
            ("min_detection_confidence", pose.min_detection_confidence),
            ("min_tracking_confidence", pose.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!(
                    "Invalid {}: {}. Must be between 0.0 and 1.0",
                    name, value
                ));
            }
        }

        if self.detector.backend == DetectorBackend::MediaPipe
            && (self.detector.python.as_os_str().is_empty()
                || self.detector.script.as_os_str().is_empty())
        {
            return invalid("MediaPipe detector needs a python interpreter and script".to_string());
        }

        for (folder, label) in &self.category_overrides {
            validate_label(label).map_err(|e| {
                ConfigError::Invalid(format!("Category override for {}: {}", folder, e))
            })?;
        }

        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_WORKERS_LIMIT)
}
