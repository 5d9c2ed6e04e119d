// MediaPipe integration bridge
// Provides an abstraction over the MediaPipe hand landmark model.
// The default backend runs MediaPipe in a Python child process and talks to it over pipes.

use crate::models::capture::{RawFrame, RGB_CHANNELS};
use crate::models::pose::{HandPose, Keypoint3D, PoseConfig, PoseError, PoseResult};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Hand landmark detector bridge
///
/// One instance is owned by one video pipeline at a time; implementations do not need
/// to be shareable across threads, only movable between them.
pub trait HandLandmarkBridge: Send {
    /// Run inference on a frame, returning hands in detector order
    fn process_frame(&mut self, frame: &RawFrame) -> PoseResult<Vec<HandPose>>;

    /// Get model info
    fn get_model_info(&self) -> String;
}

// ==============================================================================
// Subprocess Implementation (Python MediaPipe)
// ==============================================================================

#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct DetectionJson {
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// MediaPipe Hands running in a Python child process.
///
/// Protocol: the child prints `READY` once the model is loaded. For each frame the
/// parent writes width, height and channel count as little-endian `u32` followed by
/// the raw RGB bytes; the child answers with one JSON line.
pub struct SubprocessMediaPipe {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    script: PathBuf,
}

impl SubprocessMediaPipe {
    /// Start the detector process and wait for its ready signal
    pub fn spawn(python: &Path, script: &Path, config: &PoseConfig) -> PoseResult<Self> {
        if !script.exists() {
            return Err(PoseError::ModelLoadFailed(format!(
                "Hand detection script not found at {}",
                script.display()
            )));
        }

        let mut process = Command::new(python)
            .arg(script)
            .arg("--max-num-hands")
            .arg(config.max_num_hands.to_string())
            .arg("--min-detection-confidence")
            .arg(config.min_detection_confidence.to_string())
            .arg("--min-tracking-confidence")
            .arg(config.min_tracking_confidence.to_string())
            .arg("--model-complexity")
            .arg((config.model_complexity as u8).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                PoseError::ModelLoadFailed(format!(
                    "Failed to start {}: {}",
                    python.display(),
                    e
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
            let _ = process.kill();
            return Err(PoseError::ModelLoadFailed(
                "Detector process has no stdio pipes".to_string(),
            ));
        };
        let mut stdout = BufReader::new(stdout);

        let mut ready = String::new();
        let read = stdout.read_line(&mut ready);
        if !matches!(read, Ok(n) if n > 0) || ready.trim() != "READY" {
            let _ = process.kill();
            let _ = process.wait();
            return Err(PoseError::ModelLoadFailed(format!(
                "Detector process did not signal ready, got: {:?}",
                ready.trim()
            )));
        }

        tracing::debug!(script = %script.display(), "MediaPipe hand detector ready");

        Ok(Self {
            process,
            stdin,
            stdout,
            script: script.to_path_buf(),
        })
    }

    fn send_frame(&mut self, frame: &RawFrame) -> std::io::Result<()> {
        self.stdin.write_all(&frame.width.to_le_bytes())?;
        self.stdin.write_all(&frame.height.to_le_bytes())?;
        self.stdin.write_all(&RGB_CHANNELS.to_le_bytes())?;
        self.stdin.write_all(&frame.data)?;
        self.stdin.flush()
    }

    fn exited(&mut self, what: &str) -> PoseError {
        let status = match self.process.try_wait() {
            Ok(Some(status)) => status.to_string(),
            _ => "still running".to_string(),
        };
        PoseError::ProcessExited(format!("{} ({})", what, status))
    }
}

impl HandLandmarkBridge for SubprocessMediaPipe {
    fn process_frame(&mut self, frame: &RawFrame) -> PoseResult<Vec<HandPose>> {
        if frame.data.len() != frame.expected_len() {
            return Err(PoseError::InferenceFailed(format!(
                "Frame {} has {} bytes, expected {}",
                frame.index,
                frame.data.len(),
                frame.expected_len()
            )));
        }

        if let Err(e) = self.send_frame(frame) {
            return Err(self.exited(&format!("failed to send frame: {}", e)));
        }

        let mut response = String::new();
        match self.stdout.read_line(&mut response) {
            Ok(0) => return Err(self.exited("detector closed its output")),
            Ok(_) => {}
            Err(e) => return Err(self.exited(&format!("failed to read response: {}", e))),
        }

        parse_detection(&response)
    }

    fn get_model_info(&self) -> String {
        format!("MediaPipe Hands (Python subprocess: {})", self.script.display())
    }
}

impl Drop for SubprocessMediaPipe {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

fn parse_detection(response: &str) -> PoseResult<Vec<HandPose>> {
    let result: DetectionJson = serde_json::from_str(response.trim()).map_err(|e| {
        PoseError::InferenceFailed(format!("Failed to parse detector response: {}", e))
    })?;

    if let Some(error) = result.error {
        return Err(PoseError::InferenceFailed(error));
    }

    Ok(result
        .hands
        .into_iter()
        .map(|hand| HandPose {
            landmarks: hand
                .landmarks
                .into_iter()
                .map(|lm| Keypoint3D::new(lm.x, lm.y, lm.z))
                .collect(),
        })
        .collect())
}

// ==============================================================================
// Dummy Implementation (no inference)
// ==============================================================================

/// Detector that never reports a hand; used for dry runs of the pipeline plumbing
#[derive(Debug, Default)]
pub struct DummyMediaPipe;

impl HandLandmarkBridge for DummyMediaPipe {
    fn process_frame(&mut self, _frame: &RawFrame) -> PoseResult<Vec<HandPose>> {
        Ok(vec![])
    }

    fn get_model_info(&self) -> String {
        "Dummy MediaPipe (no ML inference)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detection_keeps_detector_order() {
        let json = r#"{"hands":[
            {"handedness":"Right","score":0.9,"landmarks":[{"x":0.1,"y":0.2,"z":0.3}]},
            {"handedness":"Left","score":0.8,"landmarks":[{"x":0.4,"y":0.5,"z":0.6},{"x":0.7,"y":0.8,"z":0.9}]}
        ],"error":null}"#;

        let hands = parse_detection(&json.replace('\n', "")).unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].landmarks[0], Keypoint3D::new(0.1, 0.2, 0.3));
        assert_eq!(hands[1].landmarks.len(), 2);
    }

    #[test]
    fn test_parse_detection_without_hands() {
        assert!(parse_detection("{\"hands\":[]}\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_detection_error_field() {
        let err = parse_detection(r#"{"hands":[],"error":"bad frame"}"#).unwrap_err();
        assert!(matches!(err, PoseError::InferenceFailed(msg) if msg == "bad frame"));
    }

    #[test]
    fn test_missing_script_fails_to_load() {
        let result = SubprocessMediaPipe::spawn(
            Path::new("python3"),
            Path::new("/nonexistent/hand_detect.py"),
            &PoseConfig::default(),
        );
        assert!(matches!(result, Err(PoseError::ModelLoadFailed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_detector_is_reported_as_process_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hand_detect.sh");
        std::fs::write(&script, "echo READY\nexit 3\n").unwrap();

        let mut bridge =
            SubprocessMediaPipe::spawn(Path::new("/bin/sh"), &script, &PoseConfig::default())
                .unwrap();
        let frame = RawFrame::rgb(0, 2, 2, vec![0; 12]);

        let err = bridge.process_frame(&frame).unwrap_err();
        assert!(matches!(err, PoseError::ProcessExited(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn test_dummy_reports_no_hands() {
        let mut bridge = DummyMediaPipe;
        let frame = RawFrame::rgb(0, 1, 1, vec![0, 0, 0]);
        assert!(bridge.process_frame(&frame).unwrap().is_empty());
    }
}
