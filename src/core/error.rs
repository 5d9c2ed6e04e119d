// Error taxonomy of the processing pipeline

use crate::core::category::CategoryError;
use crate::core::table_store::TableError;
use crate::models::capture::CaptureError;
use crate::models::pose::PoseError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot read video {path}: {source}")]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: CaptureError,
    },

    #[error("Input directory does not exist: {0}")]
    MissingInputDirectory(PathBuf),

    #[error("Invalid category: {0}")]
    InvalidCategory(#[from] CategoryError),

    #[error("Detector error: {0}")]
    Detector(#[from] PoseError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker for {folder} failed: {reason}")]
    WorkerFailed { folder: String, reason: String },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
