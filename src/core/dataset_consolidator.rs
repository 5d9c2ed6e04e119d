// Dataset consolidation - concatenates every per-video table into one combined table

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::table_store::{Table, TABLE_EXTENSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the combined table written at the processed root
pub const COMBINED_FILE_NAME: &str = "combined_data.csv";

/// A per-video table that exists but could not be parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTable {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineReport {
    pub output_path: PathBuf,
    /// Tables included, in concatenation order
    pub sources: Vec<PathBuf>,
    pub rows: usize,
    pub columns: usize,
    pub skipped: Vec<SkippedTable>,
}

/// Read every per-video table under `processed_root` and write the combined table.
///
/// Each immediate subdirectory contributes its first table file by name.
/// Subdirectories without one are skipped.
pub fn combine(processed_root: &Path) -> PipelineResult<CombineReport> {
    if !processed_root.is_dir() {
        return Err(PipelineError::MissingInputDirectory(
            processed_root.to_path_buf(),
        ));
    }

    let mut combined = Table::new();
    let mut sources = Vec::new();
    let mut skipped = Vec::new();

    for dir in sorted_entries(processed_root)?
        .into_iter()
        .filter(|p| p.is_dir())
    {
        let Some(table_path) = first_table(&dir)? else {
            tracing::debug!("No table in {}, skipping", dir.display());
            continue;
        };

        match Table::read(&table_path) {
            Ok(table) => {
                tracing::debug!("Adding {} rows from {}", table.len(), table_path.display());
                combined.append(table);
                sources.push(table_path);
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable table {}: {}", table_path.display(), e);
                skipped.push(SkippedTable {
                    path: table_path,
                    error: e.to_string(),
                });
            }
        }
    }

    let output_path = processed_root.join(COMBINED_FILE_NAME);
    combined.write(&output_path)?;

    tracing::info!(
        "Combined {} rows from {} tables into {}",
        combined.len(),
        sources.len(),
        output_path.display()
    );

    Ok(CombineReport {
        output_path,
        sources,
        rows: combined.len(),
        columns: combined.columns().len(),
        skipped,
    })
}

fn sorted_entries(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)
        .and_then(|entries| {
            entries
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|e| PipelineError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

fn first_table(dir: &Path) -> PipelineResult<Option<PathBuf>> {
    Ok(sorted_entries(dir)?.into_iter().find(|p| {
        p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(TABLE_EXTENSION)
    }))
}
