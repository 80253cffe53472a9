//! FFmpeg-backed implementation of the [`MediaEngine`] contract.
//!
//! Conversions run as `ffmpeg` child processes with `-progress pipe:1`;
//! stdout carries machine-readable progress blocks, stderr carries the
//! human diagnostic log. Probing runs `ffprobe` with JSON output.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ConversionHandle, ConversionSpec, MediaEngine, MediaInfo, ProgressEvent};
use crate::media::parser::ProgressBlockParser;
use crate::utils::fs;
use crate::{Error, Result};

/// Progress channel capacity. Events beyond it are dropped rather than
/// blocking the reader; order is preserved.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Number of trailing stderr lines kept for error reporting.
const DIAGNOSTIC_TAIL_LINES: usize = 16;

/// Engine that drives the `ffmpeg` / `ffprobe` binaries.
pub struct FfmpegEngine {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegEngine {
    /// Create an engine using `FFMPEG_PATH` / `FFPROBE_PATH` or the binaries
    /// on `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        }
    }

    /// Create an engine with explicit binary paths.
    pub fn with_paths(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg.into(),
            ffprobe_path: ffprobe.into(),
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn percent_of(position: Duration, total: Option<Duration>) -> f64 {
    match total {
        Some(total) if !total.is_zero() => {
            (position.as_secs_f64() / total.as_secs_f64() * 100.0).clamp(0.0, 100.0)
        }
        _ => 0.0,
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::Probe(format!("Failed to spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Probe(format!(
                "ffprobe exited with code {} for {}: {}",
                output.status.code().unwrap_or(-1),
                path.display(),
                stderr.trim()
            )));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;

        let stream = parsed
            .streams
            .first()
            .ok_or_else(|| Error::Probe(format!("no video stream in {}", path.display())))?;

        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) => (w, h),
            _ => {
                return Err(Error::Probe(format!(
                    "video stream in {} has no geometry",
                    path.display()
                )));
            }
        };

        let duration = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);

        Ok(MediaInfo {
            width,
            height,
            duration,
        })
    }

    async fn start(&self, spec: ConversionSpec) -> Result<ConversionHandle> {
        if let Some(parent) = spec.output().parent() {
            fs::ensure_dir_all(parent).await?;
        }

        let args = spec.to_args();
        debug!("FFmpeg args: {:?}", args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Engine(format!("Failed to spawn ffmpeg: {}", e)))?;

        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let (diag_tx, diag_rx) = mpsc::unbounded_channel();

        let total = spec.expected_duration();
        let stdout = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            let mut parser = ProgressBlockParser::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(sample) = parser.feed(&line) {
                    let event = ProgressEvent {
                        percent: percent_of(sample.position, total),
                        position: sample.position,
                        total,
                    };
                    if let Err(mpsc::error::TrySendError::Closed(_)) = progress_tx.try_send(event)
                    {
                        break;
                    }
                }
            }
        });

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
            let Some(stderr) = stderr else {
                return Vec::new();
            };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "vidforge::media", "ffmpeg: {}", line);
                if tail.len() == DIAGNOSTIC_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.clone());
                // Receiver may have been dropped; the tail is still needed.
                let _ = diag_tx.send(line);
            }
            tail.into()
        });

        let output_path = spec.output().to_path_buf();
        let completion = tokio::spawn(async move {
            let status = child
                .wait()
                .await
                .map_err(|e| Error::Engine(format!("Failed to wait for ffmpeg: {}", e)))?;

            let _ = stdout_task.await;
            let tail: Vec<String> = stderr_task.await.unwrap_or_default();

            if !status.success() {
                let detail = tail
                    .iter()
                    .rfind(|l| l.to_lowercase().contains("error"))
                    .or_else(|| tail.last())
                    .cloned()
                    .unwrap_or_else(|| "unknown ffmpeg error".to_string());
                return Err(Error::Engine(format!(
                    "ffmpeg exited with code {}: {}",
                    status.code().unwrap_or(-1),
                    detail
                )));
            }

            if !fs::is_non_empty_file(&output_path).await {
                return Err(Error::Engine(format!(
                    "output file missing or empty: {}",
                    output_path.display()
                )));
            }

            Ok(())
        });

        Ok(ConversionHandle::new(progress_rx, diag_rx, completion))
    }
}
