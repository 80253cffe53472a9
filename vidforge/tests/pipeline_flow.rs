//! End-to-end pipeline flows through the public API, driven by a stub
//! engine instead of a real ffmpeg binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use vidforge::media::{ConversionHandle, ConversionSpec, MediaEngine, MediaInfo, ProgressEvent};
use vidforge::pipeline::{
    ArchiveConfig, JobAction, JobStatus, PipelineConfig, PipelineManager, SubmitRequest,
};

/// Engine double: emits a short progress sequence and writes a non-empty
/// output file for every conversion.
struct StubEngine;

#[async_trait]
impl MediaEngine for StubEngine {
    async fn probe(&self, path: &Path) -> vidforge::Result<MediaInfo> {
        if !path.exists() {
            return Err(vidforge::Error::Probe(format!(
                "no such file: {}",
                path.display()
            )));
        }
        Ok(MediaInfo {
            width: 1280,
            height: 720,
            duration: Some(Duration::from_secs(8)),
        })
    }

    async fn start(&self, spec: ConversionSpec) -> vidforge::Result<ConversionHandle> {
        let (progress_tx, progress_rx) = mpsc::channel(8);
        let (diag_tx, diag_rx) = mpsc::unbounded_channel();

        let output = spec.output().to_path_buf();
        let total = spec.expected_duration();

        let completion = tokio::spawn(async move {
            let _ = diag_tx.send("stub conversion".to_string());
            for percent in [50.0, 100.0] {
                let position = total.map(|t| t.mul_f64(percent / 100.0)).unwrap_or_default();
                let _ = progress_tx
                    .send(ProgressEvent {
                        percent,
                        position,
                        total,
                    })
                    .await;
            }
            tokio::fs::write(&output, b"stub output")
                .await
                .map_err(|e| vidforge::Error::engine(e.to_string()))?;
            Ok(())
        });

        Ok(ConversionHandle::new(progress_rx, diag_rx, completion))
    }
}

fn manager(root: &Path) -> PipelineManager {
    PipelineManager::new(
        Arc::new(StubEngine),
        PipelineConfig {
            output_dir: root.join("converted"),
            work_dir: root.join("work"),
            archive: ArchiveConfig::default(),
            max_concurrent_jobs: 0,
        },
    )
}

fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"source media").unwrap();
    path
}

async fn wait_terminal(manager: &PipelineManager, task_id: &str) -> Arc<JobStatus> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = manager.status(task_id) {
            if status.is_completed {
                return status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} did not complete in time",
            task_id
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn convert_and_merge_produces_merged_and_bundle_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let a = write_input(dir.path(), "a.mov");
    let b = write_input(dir.path(), "b.mkv");

    let task_id = manager
        .submit(SubmitRequest {
            files: vec![a.clone(), b.clone()],
            action: JobAction::ConvertAndMerge,
        })
        .await
        .unwrap();

    // Directly after submission the snapshot exists and is not terminal.
    assert!(!manager.status(&task_id).unwrap().is_completed);

    let status = wait_terminal(&manager, &task_id).await;
    assert!(status.error.is_none(), "job error: {:?}", status.error);

    let merged = status.merged_file.clone().expect("merged artifact");
    let bundle = status.archive_file.clone().expect("bundle artifact");
    assert!(merged.is_file());
    assert!(bundle.is_file());
    assert!(merged.starts_with(dir.path().join("converted")));
    assert!(bundle.starts_with(dir.path().join("converted")));

    // Inputs and intermediates are gone; the work directory is drained.
    assert!(!a.exists());
    assert!(!b.exists());
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("work"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "work dir not drained: {:?}", leftovers);
}

#[tokio::test]
async fn merge_only_consumes_inputs_and_keeps_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let a = write_input(dir.path(), "first.mp4");
    let b = write_input(dir.path(), "second.mp4");

    let task_id = manager
        .submit(SubmitRequest {
            files: vec![a.clone(), b.clone()],
            action: JobAction::MergeOnly,
        })
        .await
        .unwrap();

    let status = wait_terminal(&manager, &task_id).await;
    assert!(status.error.is_none());
    assert!(status.archive_file.is_none());

    let merged = status.merged_file.clone().unwrap();
    assert!(merged.is_file());
    assert!(!a.exists());
    assert!(!b.exists());
}

#[tokio::test]
async fn polling_reports_stage_local_progress_during_execution() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let input = write_input(dir.path(), "clip.avi");
    let task_id = manager
        .submit(SubmitRequest {
            files: vec![input],
            action: JobAction::ConvertOnly,
        })
        .await
        .unwrap();

    let status = wait_terminal(&manager, &task_id).await;
    assert_eq!(status.percentage, 100.0);
    assert_eq!(status.estimated_time_ms, 0);
    assert_eq!(status.progress_text, "Processing completed");
}

#[tokio::test]
async fn validation_failure_issues_no_job_id() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let err = manager
        .submit(SubmitRequest {
            files: vec![dir.path().join("missing.mp4")],
            action: JobAction::ConvertOnly,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, vidforge::Error::Validation(_)));
    assert!(manager.store().is_empty());
}
