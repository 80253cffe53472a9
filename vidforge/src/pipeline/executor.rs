//! Per-job stage pipeline execution.
//!
//! One executor instance runs one job to its terminal state on its own
//! background task. Stages are strictly sequential within a job; the only
//! structure shared with other jobs is the status store, where this task is
//! the sole writer for its entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::archive::{ArchiveBuilder, ArchiveConfig};
use super::cleanup::CleanupManager;
use super::progress;
use super::status::{FileFailure, Stage, StatusStore};
use crate::media::{ConversionSpec, MediaEngine};
use crate::utils::fs;
use crate::{Error, Result};

/// Requested processing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAction {
    /// Convert each input to MP4; bundle when more than one output remains.
    ConvertOnly,
    /// Convert, normalize to uniform geometry, merge, and bundle the merge
    /// inputs as a secondary archive.
    ConvertAndMerge,
    /// Concatenate the raw inputs directly, re-encoding.
    MergeOnly,
}

/// One unit of submitted work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub action: JobAction,
    /// Ordered input files; order is significant for merges.
    pub inputs: Vec<PathBuf>,
}

/// Final artifacts of a successful job.
#[derive(Debug, Default)]
struct JobOutcome {
    merged: Option<PathBuf>,
    archive: Option<PathBuf>,
}

/// Fixed encode options applied by the convert stage.
const CONVERT_ARGS: [&str; 10] = [
    "-c:v",
    "libx264",
    "-c:a",
    "aac",
    "-preset",
    "veryfast",
    "-movflags",
    "+faststart",
    "-avoid_negative_ts",
    "make_zero",
];

/// Fixed encode options applied when normalizing and when re-encoding a
/// merge; together with the scale filter they produce concat-ready outputs.
const NORMALIZE_ARGS: [&str; 10] = [
    "-c:v",
    "libx264",
    "-preset",
    "veryfast",
    "-crf",
    "23",
    "-pix_fmt",
    "yuv420p",
    "-c:a",
    "aac",
];

/// Runs one job through its stages.
pub(crate) struct JobExecutor {
    engine: Arc<dyn MediaEngine>,
    store: Arc<StatusStore>,
    cleanup: CleanupManager,
    archiver: ArchiveBuilder,
    output_dir: PathBuf,
    work_dir: PathBuf,
}

impl JobExecutor {
    pub(crate) fn new(
        engine: Arc<dyn MediaEngine>,
        store: Arc<StatusStore>,
        archive_config: ArchiveConfig,
        output_dir: PathBuf,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            store,
            cleanup: CleanupManager::new(),
            archiver: ArchiveBuilder::new(archive_config),
            output_dir,
            work_dir,
        }
    }

    /// Run the job to its terminal state.
    ///
    /// Never returns an error: failures are recorded on the job's status and
    /// the submitting request is long gone.
    pub(crate) async fn run(self, job: Job) {
        info!(job_id = %job.id, action = ?job.action, inputs = job.inputs.len(), "Starting job");

        match self.execute(&job).await {
            Ok(outcome) => {
                self.store.update(&job.id, |s| {
                    s.stage = Stage::Completed;
                    s.progress_text = "Processing completed".to_string();
                    s.percentage = 100.0;
                    s.estimated_time_ms = 0;
                    s.merged_file = outcome.merged.clone();
                    s.archive_file = outcome.archive.clone();
                    s.is_completed = true;
                    s.completed_at = Some(Utc::now());
                });
                info!(job_id = %job.id, "Job completed");
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Job failed");
                self.store.update(&job.id, |s| {
                    s.stage = Stage::Failed;
                    s.progress_text = "Processing failed".to_string();
                    s.error = Some(e.to_string());
                    s.is_completed = true;
                    s.completed_at = Some(Utc::now());
                });
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<JobOutcome> {
        fs::ensure_dir_all(&self.output_dir).await?;
        fs::ensure_dir_all(&self.work_dir).await?;

        match job.action {
            JobAction::ConvertOnly => self.convert_only(job).await,
            JobAction::ConvertAndMerge => self.convert_and_merge(job).await,
            JobAction::MergeOnly => self.merge_only(job).await,
        }
    }

    async fn convert_only(&self, job: &Job) -> Result<JobOutcome> {
        let mut converted = self.convert_batch(job).await?;

        if converted.len() == 1 {
            let artifact = self.promote(&converted.remove(0)).await?;
            return Ok(JobOutcome {
                merged: Some(artifact),
                archive: None,
            });
        }

        let archive = self.archive_stage(job, &converted).await?;
        self.cleanup.remove_consumed(&converted, &archive).await;
        Ok(JobOutcome {
            merged: None,
            archive: Some(archive),
        })
    }

    async fn convert_and_merge(&self, job: &Job) -> Result<JobOutcome> {
        let converted = self.convert_batch(job).await?;
        let normalized = self.normalize_batch(job, &converted).await?;
        let merged = self.merge_stream_copy(job, &normalized).await?;

        // The normalized set is consumed twice: by the merge and by the
        // secondary bundle. It is released only after both exist.
        let archive = self.archive_stage(job, &normalized).await?;
        self.cleanup.remove_consumed(&normalized, &archive).await;

        Ok(JobOutcome {
            merged: Some(merged),
            archive: Some(archive),
        })
    }

    async fn merge_only(&self, job: &Job) -> Result<JobOutcome> {
        let merged = self.merge_filter_graph(job, &job.inputs).await?;
        self.cleanup.remove_consumed(&job.inputs, &merged).await;
        Ok(JobOutcome {
            merged: Some(merged),
            archive: None,
        })
    }

    /// Convert every input to MP4, skipping inputs that fail and recording
    /// them on the status. Errors only when nothing survives.
    async fn convert_batch(&self, job: &Job) -> Result<Vec<PathBuf>> {
        let mut outputs = Vec::with_capacity(job.inputs.len());

        for input in &job.inputs {
            let name = display_name(input);
            self.transition(&job.id, Stage::Converting, format!("Converting {}", name));

            match self.convert_one(job, input).await {
                Ok(output) => {
                    self.cleanup
                        .remove_consumed(std::slice::from_ref(input), &output)
                        .await;
                    self.store.update(&job.id, |s| {
                        s.progress_text = format!("Conversion of {} completed!", name);
                    });
                    outputs.push(output);
                }
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        input = %input.display(),
                        error = %e,
                        "Skipping input that failed to convert"
                    );
                    self.record_file_failure(&job.id, input, &e);
                }
            }
        }

        if outputs.is_empty() {
            return Err(Error::engine("no input survived conversion"));
        }
        Ok(outputs)
    }

    async fn convert_one(&self, job: &Job, input: &Path) -> Result<PathBuf> {
        // Duration is only needed for percent computation; a probe failure
        // here degrades progress reporting, not the conversion.
        let duration = self
            .engine
            .probe(input)
            .await
            .ok()
            .and_then(|info| info.duration);

        let output = self
            .work_dir
            .join(format!("{}_{}.mp4", file_stem(input), job.id));

        let spec = ConversionSpec::new(&output)
            .pre_input_args(["-fflags", "+genpts"])
            .input(input)
            .output_args(CONVERT_ARGS)
            .total_duration(duration);

        self.run_conversion(&job.id, spec, &format!("Converting {}", display_name(input)))
            .await?;
        Ok(output)
    }

    /// Normalize converted outputs to a uniform 1920x1080 landscape
    /// geometry, making them stream-copy concat compatible.
    async fn normalize_batch(&self, job: &Job, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut outputs = Vec::with_capacity(inputs.len());

        for input in inputs {
            let name = display_name(input);
            self.transition(&job.id, Stage::Normalizing, format!("Normalizing {}", name));

            match self.normalize_one(job, input).await {
                Ok(output) => {
                    self.cleanup
                        .remove_consumed(std::slice::from_ref(input), &output)
                        .await;
                    outputs.push(output);
                }
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        input = %input.display(),
                        error = %e,
                        "Skipping input that failed to normalize"
                    );
                    self.record_file_failure(&job.id, input, &e);
                }
            }
        }

        if outputs.is_empty() {
            return Err(Error::engine("no input survived normalization"));
        }
        Ok(outputs)
    }

    async fn normalize_one(&self, job: &Job, input: &Path) -> Result<PathBuf> {
        let info = self.engine.probe(input).await?;

        // Portrait sources are rotated clockwise before scaling.
        let filter = if info.is_portrait() {
            "transpose=1,scale=1920:1080,setsar=1"
        } else {
            "scale=1920:1080,setsar=1"
        };

        let output = self
            .work_dir
            .join(format!("{}_{}_norm.mp4", file_stem(input), job.id));

        let spec = ConversionSpec::new(&output)
            .input(input)
            .video_filter(filter)
            .output_args(NORMALIZE_ARGS)
            .total_duration(info.duration);

        self.run_conversion(
            &job.id,
            spec,
            &format!("Normalizing {}", display_name(input)),
        )
        .await?;
        Ok(output)
    }

    /// Lossless concat of normalized inputs via a manifest list.
    async fn merge_stream_copy(&self, job: &Job, inputs: &[PathBuf]) -> Result<PathBuf> {
        self.transition(&job.id, Stage::Merging, "Merging videos...".to_string());

        let manifest = self.work_dir.join(format!("concat_{}.txt", job.id));
        let mut lines = String::new();
        for input in inputs {
            lines.push_str(&format!("file '{}'\n", manifest_escape(input)));
        }
        tokio::fs::write(&manifest, lines)
            .await
            .map_err(|e| fs::io_error("writing concat manifest", &manifest, e))?;

        let total = self.total_duration_of(inputs).await;
        let output = self.output_dir.join(format!("merged_{}.mp4", job.id));

        let spec = ConversionSpec::new(&output)
            .pre_input_args(["-f", "concat", "-safe", "0"])
            .input(&manifest)
            .output_args(["-c", "copy"])
            .total_duration(total);

        let result = self.run_conversion(&job.id, spec, "Merging").await;
        // The manifest is ours regardless of how the merge went.
        self.cleanup.remove_files(std::slice::from_ref(&manifest)).await;
        result?;

        self.store.update(&job.id, |s| {
            s.progress_text = "Merging completed".to_string();
        });
        Ok(output)
    }

    /// Re-encoding concat tolerant of heterogeneous inputs.
    async fn merge_filter_graph(&self, job: &Job, inputs: &[PathBuf]) -> Result<PathBuf> {
        self.transition(&job.id, Stage::Merging, "Merging videos...".to_string());

        let total = self.total_duration_of(inputs).await;
        let output = self.output_dir.join(format!("merged_{}.mp4", job.id));

        let mut spec = ConversionSpec::new(&output);
        for input in inputs {
            spec = spec.input(input);
        }
        let spec = spec
            .output_args([
                "-filter_complex".to_string(),
                format!("concat=n={}:v=1:a=1 [v] [a]", inputs.len()),
                "-map".to_string(),
                "[v]".to_string(),
                "-map".to_string(),
                "[a]".to_string(),
            ])
            .output_args(NORMALIZE_ARGS)
            .total_duration(total);

        self.run_conversion(&job.id, spec, "Merging").await?;

        self.store.update(&job.id, |s| {
            s.progress_text = "Merging completed".to_string();
        });
        Ok(output)
    }

    /// Bundle artifacts into the job's secondary archive.
    async fn archive_stage(&self, job: &Job, inputs: &[PathBuf]) -> Result<PathBuf> {
        self.transition(
            &job.id,
            Stage::Archiving,
            "Compressing to zip...".to_string(),
        );

        let output = self
            .output_dir
            .join(format!("bundle_{}.{}", job.id, self.archiver.extension()));
        self.archiver.create(&output, inputs)?;

        self.store.update(&job.id, |s| {
            s.progress_text = "Compressing to zip completed".to_string();
            s.percentage = 100.0;
        });
        Ok(output)
    }

    /// Move a work-directory file into the output directory as a final
    /// artifact.
    async fn promote(&self, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| Error::Other(format!("artifact has no file name: {}", path.display())))?;
        let target = self.output_dir.join(name);

        match tokio::fs::rename(path, &target).await {
            Ok(()) => Ok(target),
            Err(_) => {
                // Rename fails across filesystems; fall back to copy + delete.
                tokio::fs::copy(path, &target)
                    .await
                    .map_err(|e| fs::io_error("promoting artifact", &target, e))?;
                let consumed = [path.to_path_buf()];
                self.cleanup.remove_consumed(&consumed, &target).await;
                Ok(target)
            }
        }
    }

    /// Drive one engine conversion, forwarding every progress event through
    /// the estimator into the status store.
    async fn run_conversion(&self, job_id: &str, spec: ConversionSpec, label: &str) -> Result<()> {
        let started = Instant::now();
        let mut handle = self.engine.start(spec).await?;

        if let Some(mut diagnostics) = handle.take_diagnostics() {
            tokio::spawn(async move {
                while let Some(line) = diagnostics.recv().await {
                    debug!(target: "vidforge::engine", "{}", line);
                }
            });
        }

        while let Some(event) = handle.progress().recv().await {
            let estimate = progress::estimate(started.elapsed(), event.percent);
            let total_text = event
                .total
                .map(progress::format_hms)
                .unwrap_or_else(|| "??:??:??".to_string());
            let text = format!(
                "{}: [{} / {}] {:.0}% - Estimated: {}",
                label,
                progress::format_hms(event.position),
                total_text,
                event.percent,
                progress::format_hms(Duration::from_millis(estimate.remaining_ms)),
            );

            self.store.update(job_id, |s| {
                s.total_time_ms = estimate.total_ms;
                s.estimated_time_ms = estimate.remaining_ms;
                s.percentage = estimate.percent;
                s.progress_text = text.clone();
            });
        }

        handle.wait().await
    }

    /// Enter a new stage: stage-local progress resets.
    fn transition(&self, job_id: &str, stage: Stage, text: String) {
        debug!(job_id, ?stage, "Stage transition");
        self.store.update(job_id, |s| {
            s.stage = stage;
            s.progress_text = text;
            s.percentage = 0.0;
            s.total_time_ms = 0;
            s.estimated_time_ms = 0;
        });
    }

    fn record_file_failure(&self, job_id: &str, input: &Path, error: &Error) {
        let failure = FileFailure {
            file: input.display().to_string(),
            error: error.to_string(),
        };
        self.store.update(job_id, |s| s.file_errors.push(failure));
    }

    /// Combined duration of `inputs`, or `None` when any probe comes back
    /// without one (percent then stays at zero for the merge).
    async fn total_duration_of(&self, inputs: &[PathBuf]) -> Option<Duration> {
        let mut total = Duration::ZERO;
        for input in inputs {
            match self.engine.probe(input).await {
                Ok(info) => total += info.duration?,
                Err(_) => return None,
            }
        }
        Some(total)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input")
        .to_string()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Escape a path for an ffmpeg concat manifest entry (single-quoted).
fn manifest_escape(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_escape() {
        assert_eq!(manifest_escape(Path::new("/a/b.mp4")), "/a/b.mp4");
        assert_eq!(
            manifest_escape(Path::new("/a/it's.mp4")),
            r"/a/it'\''s.mp4"
        );
    }

    #[test]
    fn test_file_stem_and_display_name() {
        assert_eq!(file_stem(Path::new("/x/video.vob")), "video");
        assert_eq!(display_name(Path::new("/x/video.vob")), "video.vob");
    }

    #[test]
    fn test_fixed_encode_args_pin_codecs() {
        assert!(CONVERT_ARGS.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(CONVERT_ARGS.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(NORMALIZE_ARGS.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
    }
}
