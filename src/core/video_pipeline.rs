// Video pipeline - one video file in, one landmark table out

use crate::core::category::CategoryAssigner;
use crate::core::config::PipelineConfig;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::frame_analyzer::FrameAnalyzer;
use crate::core::frame_overlay::{overlay_file_name, FrameOverlay};
use crate::core::hand_selection::{HandSelectionPolicy, HandSelector};
use crate::core::table_store::Table;
use crate::models::pose::{FrameRecord, KeypointLabel, PoseError};
use crate::platform::MediaBackend;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Name of the per-video table inside its output directory
pub const OUTPUT_FILE_NAME: &str = "output.csv";
/// Subdirectory of a video's output directory holding frame overlays
pub const FRAMES_DIR_NAME: &str = "frames";

pub const FRAME_COLUMN: &str = "frame";
pub const PARTIAL_COLUMN: &str = "partial";
pub const LABEL_COLUMN: &str = "label";

/// Handling of hands reported with fewer than 21 keypoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialHandPolicy {
    /// Keep the row and mark it in the `partial` column
    #[default]
    Flag,
    /// Leave the row out of the table
    Drop,
}

// ==============================================================================
// Per-video record set
// ==============================================================================

/// The ordered frame records of one video and its category label
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTable {
    pub label: String,
    pub records: Vec<FrameRecord>,
}

impl VideoTable {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            records: Vec::new(),
        }
    }

    pub fn frames_with_hands(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.observation.is_some())
            .count()
    }

    pub fn partial_hands(&self) -> usize {
        self.records
            .iter()
            .filter_map(|r| r.observation.as_ref())
            .filter(|obs| !obs.is_complete())
            .count()
    }

    /// Flatten into table rows, one per frame with a kept hand.
    ///
    /// Columns are `frame`, then the x/y/z columns of every keypoint label
    /// present in any row (in label order), then `partial` and `label`.
    /// Keypoints missing from a row leave empty cells.
    pub fn to_table(&self, partial_hands: PartialHandPolicy) -> Table {
        let rows: Vec<_> = self
            .records
            .iter()
            .filter_map(|r| r.observation.as_ref().map(|obs| (r.ordinal, obs)))
            .filter(|(_, obs)| partial_hands == PartialHandPolicy::Flag || obs.is_complete())
            .collect();

        if rows.is_empty() {
            return Table::new();
        }

        let labels: BTreeSet<KeypointLabel> = rows
            .iter()
            .flat_map(|(_, obs)| obs.keypoints().iter().map(|kp| kp.label))
            .collect();

        let columns = std::iter::once(FRAME_COLUMN.to_string())
            .chain(labels.iter().flat_map(|label| label.column_names()))
            .chain([PARTIAL_COLUMN.to_string(), LABEL_COLUMN.to_string()]);
        let mut table = Table::with_columns(columns);

        for (ordinal, obs) in rows {
            let mut fields = vec![(FRAME_COLUMN.to_string(), ordinal.to_string())];
            for kp in obs.keypoints() {
                let [x, y, z] = kp.label.column_names();
                fields.push((x, kp.position[0].to_string()));
                fields.push((y, kp.position[1].to_string()));
                fields.push((z, kp.position[2].to_string()));
            }
            fields.push((PARTIAL_COLUMN.to_string(), (!obs.is_complete()).to_string()));
            let label = obs.label.clone().unwrap_or_else(|| self.label.clone());
            fields.push((LABEL_COLUMN.to_string(), label));
            table.push_row(fields);
        }

        table
    }
}

/// Outcome of processing one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub video_path: PathBuf,
    pub output_path: PathBuf,
    pub label: String,
    pub frames_read: u64,
    pub frames_with_hands: u64,
    pub partial_hands: u64,
    /// Frames the detector failed on, recorded as frames without a hand
    pub failed_frames: u64,
    pub rows_written: usize,
    /// Set when decoding stopped early on a corrupt frame
    pub decode_error: Option<String>,
    /// Another video of the same run that wrote `output_path` before this one
    pub replaced_output_of: Option<PathBuf>,
}

impl VideoReport {
    /// No row was written for this video
    pub fn is_empty(&self) -> bool {
        self.rows_written == 0
    }
}

// ==============================================================================
// Pipeline
// ==============================================================================

/// Turns one video into `<processed_root>/<video stem>/output.csv`
///
/// Clones share the record of outputs written so far, so one pipeline cloned
/// across the folder workers of a run notices videos whose stems collide.
#[derive(Clone)]
pub struct VideoPipeline {
    backend: Arc<dyn MediaBackend>,
    categories: Arc<CategoryAssigner>,
    processed_root: PathBuf,
    hand_selection: HandSelectionPolicy,
    partial_hands: PartialHandPolicy,
    annotate_frames: bool,
    written: Arc<Mutex<HashMap<PathBuf, PathBuf>>>,
}

impl VideoPipeline {
    pub fn new(
        config: &PipelineConfig,
        backend: Arc<dyn MediaBackend>,
        categories: Arc<CategoryAssigner>,
    ) -> Self {
        Self {
            backend,
            categories,
            processed_root: config.processed_root.clone(),
            hand_selection: config.hand_selection,
            partial_hands: config.partial_hands,
            annotate_frames: config.annotate_frames,
            written: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Output directory for a video: the processed root joined with the file stem
    pub fn output_dir(&self, video_path: &Path) -> PathBuf {
        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.processed_root.join(stem)
    }

    pub fn output_path(&self, video_path: &Path) -> PathBuf {
        self.output_dir(video_path).join(OUTPUT_FILE_NAME)
    }

    // Record `video_path` as the writer of `output_path`, returning the
    // previous writer when it was a different video
    fn claim_output(&self, output_path: &Path, video_path: &Path) -> Option<PathBuf> {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        written
            .insert(output_path.to_path_buf(), video_path.to_path_buf())
            .filter(|previous| previous != video_path)
    }

    /// Process one video and persist its table.
    ///
    /// Failures that prevent reading the video at all, and a detector process
    /// that exits, are returned as errors; detector failures on single frames
    /// are counted in the report.
    pub fn process(&self, video_path: &Path) -> PipelineResult<VideoReport> {
        tracing::info!("Processing video: {}", video_path.display());

        let label = self.categories.assign(video_path)?;
        let output_dir = self.output_dir(video_path);
        let output_path = output_dir.join(OUTPUT_FILE_NAME);

        let mut report = VideoReport {
            video_path: video_path.to_path_buf(),
            output_path: output_path.clone(),
            label: label.clone(),
            frames_read: 0,
            frames_with_hands: 0,
            partial_hands: 0,
            failed_frames: 0,
            rows_written: 0,
            decode_error: None,
            replaced_output_of: None,
        };

        let video = self.extract(video_path, &output_dir, &label, &mut report)?;

        let table = video.to_table(self.partial_hands);
        std::fs::create_dir_all(&output_dir).map_err(|e| PipelineError::io(&output_dir, e))?;
        report.replaced_output_of = self.claim_output(&output_path, video_path);
        if let Some(previous) = &report.replaced_output_of {
            tracing::warn!(
                "{} overwrites {} written earlier in this run for {}",
                video_path.display(),
                output_path.display(),
                previous.display()
            );
        }
        table.write(&output_path)?;

        report.frames_with_hands = video.frames_with_hands() as u64;
        report.partial_hands = video.partial_hands() as u64;
        report.rows_written = table.len();

        if report.is_empty() {
            tracing::warn!(
                "No hand landmarks extracted from {} ({} frames read)",
                video_path.display(),
                report.frames_read
            );
        }
        tracing::info!(
            "Saved {} rows ({} of {} frames with a hand) to {}",
            report.rows_written,
            report.frames_with_hands,
            report.frames_read,
            output_path.display()
        );

        Ok(report)
    }

    // Decoder and detector live only for the duration of this call
    fn extract(
        &self,
        video_path: &Path,
        output_dir: &Path,
        label: &str,
        report: &mut VideoReport,
    ) -> PipelineResult<VideoTable> {
        let unreadable = |source| PipelineError::UnreadableSource {
            path: video_path.to_path_buf(),
            source,
        };

        let mut source = self.backend.open_video(video_path).map_err(unreadable)?;
        let mut analyzer = FrameAnalyzer::new(self.backend.create_detector()?);
        let mut selector = HandSelector::new(self.hand_selection);

        let (width, height) = source.dimensions();
        tracing::debug!(
            "Decoding {} ({}x{}) with {}",
            video_path.display(),
            width,
            height,
            analyzer.model_info()
        );

        let frames_dir = output_dir.join(FRAMES_DIR_NAME);
        if self.annotate_frames {
            std::fs::create_dir_all(&frames_dir).map_err(|e| PipelineError::io(&frames_dir, e))?;
        }

        let mut video = VideoTable::new(label);
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if report.frames_read == 0 => return Err(unreadable(e)),
                Err(e) => {
                    tracing::warn!(
                        "Stopping {} after {} frames: {}",
                        video_path.display(),
                        report.frames_read,
                        e
                    );
                    report.decode_error = Some(e.to_string());
                    break;
                }
            };
            let ordinal = report.frames_read;
            report.frames_read += 1;

            let mut overlay = if self.annotate_frames {
                FrameOverlay::from_frame(&frame)
            } else {
                None
            };

            let hands = match analyzer.analyze(&frame, overlay.as_mut()) {
                Ok(hands) => hands,
                Err(e @ PoseError::ProcessExited(_)) => {
                    tracing::error!(
                        "Detector exited on frame {} of {}: {}",
                        ordinal,
                        video_path.display(),
                        e
                    );
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::debug!("Detector failed on frame {}: {}", ordinal, e);
                    report.failed_frames += 1;
                    Vec::new()
                }
            };

            let observation = selector.select(hands).map(|obs| obs.with_label(label));

            if let (Some(overlay), true) = (&overlay, observation.is_some()) {
                let path = frames_dir.join(overlay_file_name(ordinal));
                if let Err(e) = overlay.save_png(&path) {
                    tracing::warn!("Failed to write overlay {}: {}", path.display(), e);
                }
            }

            video.records.push(FrameRecord {
                ordinal,
                observation,
            });
        }

        if report.failed_frames > 0 {
            tracing::warn!(
                "Detector failed on {} of {} frames of {}",
                report.failed_frames,
                report.frames_read,
                video_path.display()
            );
        }

        Ok(video)
    }
}
