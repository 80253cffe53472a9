//! Shared test support for pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::status::{JobStatus, StatusStore};
use crate::media::{ConversionHandle, ConversionSpec, MediaEngine, MediaInfo, ProgressEvent};
use crate::{Error, Result};

/// Engine double that fabricates progress events and writes non-empty
/// outputs without spawning processes.
#[derive(Debug, Clone)]
pub(crate) struct StubEngine {
    info: MediaInfo,
    /// Inputs whose path contains any of these substrings fail to convert.
    fail_matching: Vec<String>,
    /// Wall-clock length of one conversion.
    delay: Duration,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self {
            info: MediaInfo {
                width: 1920,
                height: 1080,
                duration: Some(Duration::from_secs(10)),
            },
            fail_matching: Vec::new(),
            delay: Duration::ZERO,
        }
    }
}

impl StubEngine {
    pub(crate) fn with_failure(mut self, substring: impl Into<String>) -> Self {
        self.fail_matching.push(substring.into());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MediaEngine for StubEngine {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !path.exists() {
            return Err(Error::Probe(format!("no such file: {}", path.display())));
        }
        Ok(self.info.clone())
    }

    async fn start(&self, spec: ConversionSpec) -> Result<ConversionHandle> {
        let (progress_tx, progress_rx) = mpsc::channel(8);
        let (diag_tx, diag_rx) = mpsc::unbounded_channel();

        let fail = spec.inputs().iter().any(|input| {
            let path = input.to_string_lossy();
            self.fail_matching.iter().any(|m| path.contains(m.as_str()))
        });
        let output = spec.output().to_path_buf();
        let total = spec.expected_duration();
        let delay = self.delay;

        let completion = tokio::spawn(async move {
            let _ = diag_tx.send("stub conversion started".to_string());

            for percent in [25.0, 50.0, 100.0] {
                if !delay.is_zero() {
                    tokio::time::sleep(delay / 3).await;
                }
                let position = total
                    .map(|t| t.mul_f64(percent / 100.0))
                    .unwrap_or_default();
                let _ = progress_tx
                    .send(ProgressEvent {
                        percent,
                        position,
                        total,
                    })
                    .await;
            }

            if fail {
                let _ = diag_tx.send("stub conversion error".to_string());
                return Err(Error::engine("stub conversion failure"));
            }

            tokio::fs::write(&output, b"stub output")
                .await
                .map_err(|e| Error::engine(format!("stub output write failed: {}", e)))?;
            Ok(())
        });

        Ok(ConversionHandle::new(progress_rx, diag_rx, completion))
    }
}

/// Create a non-empty input file under `dir`.
pub(crate) fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"source media").unwrap();
    path
}

/// Poll the store until the job reaches its terminal state.
pub(crate) async fn wait_terminal(store: &Arc<StatusStore>, job_id: &str) -> Arc<JobStatus> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = store.get(job_id)
            && status.is_completed
        {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} did not reach a terminal state in time",
            job_id
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
