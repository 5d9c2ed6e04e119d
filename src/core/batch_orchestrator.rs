// Batch orchestration - every category folder of a dataset, then consolidation

use crate::core::category::CategoryAssigner;
use crate::core::config::PipelineConfig;
use crate::core::dataset_consolidator::{self, CombineReport};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::folder_batcher::{FolderBatcher, FolderReport};
use crate::core::video_pipeline::VideoPipeline;
use crate::platform::MediaBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Name of the run summary written at the processed root
pub const RUN_SUMMARY_FILE_NAME: &str = "run_summary.json";

/// A folder whose batch could not run or did not complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderFailure {
    pub folder: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dataset_root: PathBuf,
    pub processed_root: PathBuf,
    pub concurrent: bool,
    pub workers: usize,
    /// Completed folders in sorted order
    pub folders: Vec<FolderReport>,
    pub folder_failures: Vec<FolderFailure>,
    pub combined: Option<CombineReport>,
    pub combine_error: Option<String>,
}

impl RunSummary {
    pub fn videos_processed(&self) -> usize {
        self.folders.iter().map(|f| f.videos.len()).sum()
    }

    pub fn videos_failed(&self) -> usize {
        self.folders.iter().map(|f| f.failures.len()).sum()
    }

    pub fn rows_written(&self) -> usize {
        self.folders.iter().map(FolderReport::rows_written).sum()
    }
}

/// Immediate subdirectories of `root`, sorted by name
pub fn list_category_folders(root: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(PipelineError::MissingInputDirectory(root.to_path_buf()));
    }

    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|e| PipelineError::io(root, e))? {
        let path = entry.map_err(|e| PipelineError::io(root, e))?.path();
        if path.is_dir() {
            folders.push(path);
        }
    }
    folders.sort();
    Ok(folders)
}

pub struct BatchOrchestrator {
    config: Arc<PipelineConfig>,
    backend: Arc<dyn MediaBackend>,
    categories: Arc<CategoryAssigner>,
}

impl BatchOrchestrator {
    pub fn new(config: PipelineConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let categories = Arc::new(CategoryAssigner::with_overrides(
            config.category_overrides.clone(),
        ));
        Self {
            config: Arc::new(config),
            backend,
            categories,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every category folder of `dataset_root`, then build the combined table.
    ///
    /// Folders run one at a time, or on up to `max_workers` blocking workers when
    /// `concurrent` is set. Consolidation starts only after every folder task has
    /// finished. Per-video and per-folder failures are collected in the summary.
    pub async fn run(&self, dataset_root: &Path, concurrent: bool) -> PipelineResult<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let processed_root = self.config.processed_root.clone();

        let folders = list_category_folders(dataset_root)?;
        std::fs::create_dir_all(&processed_root)
            .map_err(|e| PipelineError::io(&processed_root, e))?;

        let workers = if concurrent { self.config.max_workers.max(1) } else { 1 };
        tracing::info!(
            %run_id,
            "Processing {} category folders from {} ({})",
            folders.len(),
            dataset_root.display(),
            if concurrent {
                format!("concurrent, {} workers", workers)
            } else {
                "sequential".to_string()
            }
        );

        let pipeline = VideoPipeline::new(&self.config, self.backend.clone(), self.categories.clone());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = Vec::with_capacity(folders.len());
        for folder in folders {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::WorkerFailed {
                    folder: folder.display().to_string(),
                    reason: e.to_string(),
                })?;

            let pipeline = pipeline.clone();
            let task_folder = folder.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                FolderBatcher::new(pipeline).process_folder(&task_folder)
            });
            tasks.push((folder, handle));
        }

        // Barrier: every folder finishes before consolidation
        let mut reports = Vec::new();
        let mut folder_failures = Vec::new();
        for (folder, handle) in tasks {
            let error = match handle.await {
                Ok(Ok(report)) => {
                    reports.push(report);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => PipelineError::WorkerFailed {
                    folder: folder.display().to_string(),
                    reason: e.to_string(),
                },
            };
            tracing::error!("Folder {} failed: {}", folder.display(), error);
            folder_failures.push(FolderFailure {
                folder,
                error: error.to_string(),
            });
        }
        tracing::info!("All folders processed, combining tables");

        let combine_root = processed_root.clone();
        let combined = tokio::task::spawn_blocking(move || dataset_consolidator::combine(&combine_root))
            .await
            .map_err(|e| PipelineError::WorkerFailed {
                folder: processed_root.display().to_string(),
                reason: e.to_string(),
            })?;
        let (combined, combine_error) = match combined {
            Ok(report) => (Some(report), None),
            Err(e) => {
                tracing::error!("Failed to combine tables: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dataset_root: dataset_root.to_path_buf(),
            processed_root: processed_root.clone(),
            concurrent,
            workers,
            folders: reports,
            folder_failures,
            combined,
            combine_error,
        };

        write_summary(&summary, &processed_root.join(RUN_SUMMARY_FILE_NAME));

        tracing::info!(
            "Run {} finished: {} videos processed, {} failed, {} rows",
            run_id,
            summary.videos_processed(),
            summary.videos_failed(),
            summary.rows_written()
        );

        Ok(summary)
    }
}

fn write_summary(summary: &RunSummary, path: &Path) {
    let result = serde_json::to_string_pretty(summary)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    if let Err(e) = result {
        tracing::warn!("Failed to write run summary {}: {}", path.display(), e);
    }
}
