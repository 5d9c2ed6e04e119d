// Category assignment - derives a video's label from its containing folder

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CategoryError {
    #[error("Video {0} has no parent directory to take a category from")]
    NoParentDirectory(String),

    #[error("Invalid category name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
}

/// Maps a video path to its category label.
///
/// The label is the name of the directory directly containing the video,
/// replaced by an entry of `overrides` when one matches that name.
#[derive(Debug, Clone, Default)]
pub struct CategoryAssigner {
    overrides: HashMap<String, String>,
}

impl CategoryAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn assign(&self, video_path: &Path) -> Result<String, CategoryError> {
        let folder = video_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CategoryError::NoParentDirectory(video_path.display().to_string()))?;

        let label = self.overrides.get(&folder).cloned().unwrap_or(folder);
        validate_label(&label)?;
        Ok(label)
    }
}

/// A label must be non-empty and fit in a single table cell line
pub fn validate_label(label: &str) -> Result<(), CategoryError> {
    let invalid = |reason: &str| CategoryError::InvalidName {
        name: label.to_string(),
        reason: reason.to_string(),
    };

    if label.trim().is_empty() {
        return Err(invalid("label is empty"));
    }
    if label.chars().any(char::is_control) {
        return Err(invalid("label contains control characters"));
    }
    Ok(())
}
