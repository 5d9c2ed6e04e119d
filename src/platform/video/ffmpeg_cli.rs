// FFmpeg command line frame source
// Probes the stream with ffprobe and decodes it with an ffmpeg child writing raw RGB24 to a pipe.

use super::FrameSource;
use crate::models::capture::{CaptureError, CaptureResult, RawFrame};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

// Characters of ffmpeg's stderr kept in a decode error
const STDERR_TAIL_CHARS: usize = 512;

/// Locations of the ffmpeg and ffprobe executables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegTools {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
        }
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

// Older muxers store the display rotation as a `rotate` stream tag
#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

impl FfprobeStream {
    fn rotation(&self) -> f64 {
        self.side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0)
    }
}

/// Read the displayed dimensions of the first video stream.
///
/// ffmpeg applies the display rotation while decoding, so a stream rotated by a
/// quarter turn is reported with width and height swapped.
pub fn display_dimensions(tools: &FfmpegTools, path: &Path) -> CaptureResult<(u32, u32)> {
    let unavailable = |reason: String| CaptureError::SourceUnavailable {
        path: path.display().to_string(),
        reason,
    };

    let output = Command::new(&tools.ffprobe_bin)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:stream_side_data=rotation:stream_tags=rotate",
            "-print_format",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| unavailable(format!("cannot run {}: {}", tools.ffprobe_bin.display(), e)))?;

    if !output.status.success() {
        return Err(unavailable(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_ffprobe(&output.stdout).map_err(unavailable)
}

fn parse_ffprobe(stdout: &[u8]) -> Result<(u32, u32), String> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| format!("failed to parse ffprobe output: {}", e))?;

    let Some(stream) = output.streams.first() else {
        return Err("no video stream".to_string());
    };
    let (w, h) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no dimensions".to_string()),
    };

    if (stream.rotation().round() as i64).rem_euclid(180) == 90 {
        Ok((h, w))
    } else {
        Ok((w, h))
    }
}

/// Frame source backed by an `ffmpeg` child process
pub struct FfmpegCliSource {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<Vec<u8>>>,
    width: u32,
    height: u32,
    next_index: u64,
    finished: bool,
}

impl FfmpegCliSource {
    /// Probe `path` and start decoding it
    pub fn open(tools: &FfmpegTools, path: &Path) -> CaptureResult<Self> {
        if !path.is_file() {
            return Err(CaptureError::SourceUnavailable {
                path: path.display().to_string(),
                reason: "file not found".to_string(),
            });
        }

        let (width, height) = display_dimensions(tools, path)?;

        // passthrough keeps every decoded frame; the rawvideo muxer would otherwise
        // duplicate or drop frames of variable frame rate recordings
        let mut child = Command::new(&tools.ffmpeg_bin)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::SourceUnavailable {
                path: path.display().to_string(),
                reason: format!("cannot run {}: {}", tools.ffmpeg_bin.display(), e),
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::SourceUnavailable {
                path: path.display().to_string(),
                reason: "ffmpeg stdout not captured".to_string(),
            });
        };

        // Drained on its own thread so a chatty ffmpeg never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        tracing::debug!(path = %path.display(), width, height, "Opened video with ffmpeg");

        Ok(Self {
            child,
            stdout,
            stderr,
            width,
            height,
            next_index: 0,
            finished: false,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn stderr_tail(&mut self) -> String {
        let Some(handle) = self.stderr.take() else {
            return String::new();
        };
        let text = handle
            .join()
            .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
            .unwrap_or_default();
        let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
        text.chars().skip(skip).collect()
    }
}

impl FrameSource for FfmpegCliSource {
    fn next_frame(&mut self) -> CaptureResult<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.frame_len()];
        let filled = read_full(&mut self.stdout, &mut data)?;

        if filled < data.len() {
            self.finished = true;
            let status = self.child.wait()?;
            let stderr = self.stderr_tail();

            if !status.success() {
                return Err(CaptureError::DecodeFailed(format!(
                    "ffmpeg exited with {:?} after {} frames: {}",
                    status.code(),
                    self.next_index,
                    stderr
                )));
            }
            if filled > 0 {
                return Err(CaptureError::DecodeFailed(format!(
                    "truncated frame {}: {} of {} bytes",
                    self.next_index,
                    filled,
                    data.len()
                )));
            }
            return Ok(None);
        }

        let frame = RawFrame::rgb(self.next_index, self.width, self.height, data);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for FfmpegCliSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

// Fill `buf` until it is full or the reader hits end of stream
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_dimensions() {
        let json = br#"{"programs":[],"streams":[{"width":640,"height":480}]}"#;
        assert_eq!(parse_ffprobe(json), Ok((640, 480)));
    }

    #[test]
    fn test_parse_ffprobe_without_stream() {
        assert_eq!(parse_ffprobe(br#"{"streams":[]}"#), Err("no video stream".to_string()));
        assert!(parse_ffprobe(br#"{"streams":[{"width":0,"height":0}]}"#).is_err());
        assert!(parse_ffprobe(b"not json").is_err());
    }

    #[test]
    fn test_parse_ffprobe_swaps_quarter_turn_rotation() {
        let side_data = br#"{"streams":[{"width":1920,"height":1080,
            "side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#;
        assert_eq!(parse_ffprobe(side_data), Ok((1080, 1920)));

        let tagged = br#"{"streams":[{"width":1920,"height":1080,"tags":{"rotate":"270"}}]}"#;
        assert_eq!(parse_ffprobe(tagged), Ok((1080, 1920)));

        let upside_down = br#"{"streams":[{"width":1920,"height":1080,
            "side_data_list":[{"rotation":180}]}]}"#;
        assert_eq!(parse_ffprobe(upside_down), Ok((1920, 1080)));
    }

    #[test]
    fn test_read_full_stops_at_end_of_stream() {
        let mut reader: &[u8] = &[1, 2, 3, 4, 5];
        let mut buf = [0u8; 3];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);

        let mut buf = [0u8; 3];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 2);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegCliSource::open(&FfmpegTools::default(), Path::new("/nonexistent/a.mp4"));
        assert!(matches!(result, Err(CaptureError::SourceUnavailable { .. })));
    }

    // Stand-in ffprobe/ffmpeg executables written as shell scripts
    #[cfg(unix)]
    fn fake_tools(dir: &Path, ffprobe_json: &str, ffmpeg_body: &str) -> FfmpegTools {
        use std::os::unix::fs::PermissionsExt;

        let write_script = |name: &str, body: String| {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        FfmpegTools {
            ffprobe_bin: write_script("ffprobe", format!("echo '{}'", ffprobe_json)),
            ffmpeg_bin: write_script("ffmpeg", ffmpeg_body.to_string()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_rotated_stream_reports_display_size() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("portrait.mov");
        std::fs::write(&video, b"").unwrap();
        let tools = fake_tools(
            dir.path(),
            r#"{"streams":[{"width":4,"height":2,"side_data_list":[{"rotation":90}]}]}"#,
            "head -c 24 /dev/zero",
        );

        let mut source = FfmpegCliSource::open(&tools, &video).unwrap();
        assert_eq!(source.dimensions(), (2, 4));

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (2, 4));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_failure_after_frames_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("broken.mp4");
        std::fs::write(&video, b"").unwrap();
        let tools = fake_tools(
            dir.path(),
            r#"{"streams":[{"width":2,"height":2}]}"#,
            "head -c 12 /dev/zero\necho 'Invalid NAL unit size' >&2\nexit 1",
        );

        let mut source = FfmpegCliSource::open(&tools, &video).unwrap();
        assert!(source.next_frame().unwrap().is_some());

        let err = source.next_frame().unwrap_err();
        assert!(
            matches!(&err, CaptureError::DecodeFailed(msg) if msg.contains("Invalid NAL unit size")),
            "unexpected error: {err:?}"
        );
        assert!(source.next_frame().unwrap().is_none());
    }
}
