pub mod config;
pub mod error;

// Per-frame processing
pub mod frame_analyzer;
pub mod frame_overlay;
pub mod hand_selection;
pub mod landmark_labeler;

// Per-video, per-folder and dataset-wide stages
pub mod batch_orchestrator;
pub mod category;
pub mod dataset_consolidator;
pub mod folder_batcher;
pub mod table_store;
pub mod video_pipeline;

#[cfg(test)]
pub(crate) mod test_support;
