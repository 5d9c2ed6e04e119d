// Folder batching - runs the video pipeline over every video directly inside one folder

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::video_pipeline::{VideoPipeline, VideoReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name suffixes treated as videos (case-sensitive)
pub const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".avi", ".mov"];

/// A video that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub videos: Vec<VideoReport>,
    pub failures: Vec<VideoFailure>,
}

impl FolderReport {
    pub fn rows_written(&self) -> usize {
        self.videos.iter().map(|v| v.rows_written).sum()
    }
}

pub fn is_video_file_name(name: &str) -> bool {
    VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Regular files directly inside `folder` with a video suffix, sorted by name
pub fn list_videos(folder: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(PipelineError::MissingInputDirectory(folder.to_path_buf()));
    }

    let entries = std::fs::read_dir(folder).map_err(|e| PipelineError::io(folder, e))?;
    let mut videos = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(folder, e))?;
        let path = entry.path();
        let is_video = entry
            .file_name()
            .to_str()
            .map(is_video_file_name)
            .unwrap_or(false);
        if is_video && path.is_file() {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

/// Sequential per-folder driver; one failing video never stops the batch
pub struct FolderBatcher {
    pipeline: VideoPipeline,
}

impl FolderBatcher {
    pub fn new(pipeline: VideoPipeline) -> Self {
        Self { pipeline }
    }

    pub fn process_folder(&self, folder: &Path) -> PipelineResult<FolderReport> {
        let videos = list_videos(folder)?;
        tracing::info!(
            "Processing folder {} ({} videos)",
            folder.display(),
            videos.len()
        );

        let mut report = FolderReport {
            folder: folder.to_path_buf(),
            videos: Vec::with_capacity(videos.len()),
            failures: Vec::new(),
        };

        for video in videos {
            match self.pipeline.process(&video) {
                Ok(video_report) => report.videos.push(video_report),
                Err(e) => {
                    tracing::error!("Failed to process {}: {}", video.display(), e);
                    report.failures.push(VideoFailure {
                        path: video,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::category::CategoryAssigner;
    use crate::core::config::PipelineConfig;
    use crate::core::test_support::{touch, ScriptedBackend, DETECTOR_EXITS};
    use std::sync::Arc;

    fn batcher(root: &Path, backend: ScriptedBackend) -> FolderBatcher {
        let config = PipelineConfig::for_project(root);
        FolderBatcher::new(VideoPipeline::new(
            &config,
            Arc::new(backend),
            Arc::new(CategoryAssigner::new()),
        ))
    }

    #[test]
    fn test_list_videos_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("A");
        for name in ["b.mov", "a.mp4", "c.avi", "notes.txt", "upper.MP4", "clip.mp4.bak"] {
            touch(&folder.join(name));
        }
        std::fs::create_dir_all(folder.join("nested.mp4")).unwrap();
        touch(&folder.join("sub").join("deep.mp4"));

        let names: Vec<_> = list_videos(&folder)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.mp4", "b.mov", "c.avi"]);
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let result = list_videos(&dir.path().join("nope"));
        assert!(matches!(result, Err(PipelineError::MissingInputDirectory(_))));
    }

    #[test]
    fn test_failure_is_isolated_per_video() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Data").join("A");
        touch(&folder.join("a.mp4"));
        touch(&folder.join("b.mp4"));
        touch(&folder.join("c.mp4"));

        // b.mp4 is not scripted, so it cannot be opened
        let backend = ScriptedBackend::new()
            .video("a.mp4", vec![1, 1])
            .video("c.mp4", vec![0, 1, 1, 1]);
        let report = batcher(dir.path(), backend).process_folder(&folder).unwrap();

        assert_eq!(report.videos.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("b.mp4"));
        assert_eq!(report.rows_written(), 5);
    }

    #[test]
    fn test_detector_exit_is_a_video_failure() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Data").join("A");
        touch(&folder.join("a.mp4"));
        touch(&folder.join("b.mp4"));

        let backend = ScriptedBackend::new()
            .video("a.mp4", vec![1, DETECTOR_EXITS, 1])
            .video("b.mp4", vec![1]);
        let report = batcher(dir.path(), backend).process_folder(&folder).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("a.mp4"));
        assert!(report.failures[0].error.contains("Detector process exited"));
        assert_eq!(report.videos.len(), 1);
        assert_eq!(report.rows_written(), 1);
    }

    #[test]
    fn test_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Data").join("Empty");
        std::fs::create_dir_all(&folder).unwrap();

        let report = batcher(dir.path(), ScriptedBackend::new())
            .process_folder(&folder)
            .unwrap();
        assert!(report.videos.is_empty());
        assert!(report.failures.is_empty());
    }
}
