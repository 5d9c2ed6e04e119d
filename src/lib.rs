pub mod core;
pub mod models;
pub mod platform;

use anyhow::Context;
use clap::Parser;
use crate::core::batch_orchestrator::{BatchOrchestrator, RunSummary};
use crate::core::config::PipelineConfig;
use crate::core::hand_selection::HandSelectionPolicy;
use crate::platform::pose::DetectorBackend;
use crate::platform::DefaultBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Convert folders of hand gesture videos into per-frame landmark tables
#[derive(Parser, Debug, Default)]
#[command(name = "gesture-prep", version, long_about = None)]
pub struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset root with one subfolder of videos per category (default: ./Data)
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,

    /// Output root for per-video and combined tables (default: ./Processed_Data)
    #[arg(long)]
    pub processed_root: Option<PathBuf>,

    /// Process category folders in parallel
    #[arg(long, default_value_t = false)]
    pub concurrent: bool,

    /// Worker pool size for concurrent runs
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Hand kept per frame: first_returned, largest_bounding_box or closest_to_previous
    #[arg(long)]
    pub hand_selection: Option<HandSelectionPolicy>,

    /// Write annotated PNGs of frames with a detected hand
    #[arg(long, default_value_t = false)]
    pub annotate_frames: bool,

    /// Detector backend: mediapipe or none
    #[arg(long)]
    pub detector: Option<DetectorBackend>,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Build the effective configuration from the optional config file and flags
pub fn resolve_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(root) = &args.dataset_root {
        config.dataset_root = root.clone();
    }
    if let Some(root) = &args.processed_root {
        config.processed_root = root.clone();
    }
    if args.concurrent {
        config.concurrent = true;
    }
    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    if let Some(policy) = args.hand_selection {
        config.hand_selection = policy;
    }
    if args.annotate_frames {
        config.annotate_frames = true;
    }
    if let Some(backend) = args.detector {
        config.detector.backend = backend;
    }

    config.validate()?;
    Ok(config)
}

pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "gesture_prep_lib=debug,gesture_prep=debug"
    } else {
        "gesture_prep_lib=info,gesture_prep=info"
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .try_init();
}

/// Run the whole batch: every category folder, then consolidation.
///
/// Fails only on invalid configuration or a missing dataset root; failures of
/// single videos or folders are reported in the returned summary.
pub fn run(args: Args) -> anyhow::Result<RunSummary> {
    let config = resolve_config(&args).context("Invalid configuration")?;

    tracing::info!(
        "Dataset root: {}, processed root: {}",
        config.dataset_root.display(),
        config.processed_root.display()
    );

    let backend = Arc::new(DefaultBackend::new(
        config.detector.clone(),
        config.ffmpeg.clone(),
    ));
    let dataset_root = config.dataset_root.clone();
    let concurrent = config.concurrent;
    let orchestrator = BatchOrchestrator::new(config, backend);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let summary = runtime.block_on(orchestrator.run(&dataset_root, concurrent))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_uses_project_layout() {
        let args = Args::parse_from(["gesture-prep"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        PipelineConfig::for_project(dir.path()).save(&path).unwrap();

        let args = Args::parse_from([
            "gesture-prep",
            "--config",
            path.to_str().unwrap(),
            "--concurrent",
            "--workers",
            "2",
            "--hand-selection",
            "largest_bounding_box",
            "--detector",
            "none",
            "--annotate-frames",
        ]);
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.dataset_root, dir.path().join("Data"));
        assert!(config.concurrent);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.hand_selection, HandSelectionPolicy::LargestBoundingBox);
        assert_eq!(config.detector.backend, DetectorBackend::None);
        assert!(config.annotate_frames);
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let args = Args::parse_from(["gesture-prep", "--workers", "0"]);
        assert!(resolve_config(&args).is_err());
        assert!(Args::try_parse_from(["gesture-prep", "--hand-selection", "biggest"]).is_err());
    }

    #[test]
    fn test_missing_dataset_root_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            dataset_root: Some(dir.path().join("Data")),
            processed_root: Some(dir.path().join("Processed_Data")),
            detector: Some(DetectorBackend::None),
            ..Default::default()
        };
        assert!(run(args).is_err());
    }
}
