//! Job submission, supervision, and status access.
//!
//! Submission is non-blocking: after synchronous validation the caller gets
//! a job id immediately and the pipeline runs on its own supervised task.
//! Task faults, including panics, land in the job's terminal status rather
//! than being lost.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;
use tracing::error;
use uuid::Uuid;

use super::archive::ArchiveConfig;
use super::executor::{Job, JobAction, JobExecutor};
use super::status::{JobStatus, Stage, StatusStore};
use crate::media::MediaEngine;
use crate::{Error, Result};

/// A validated submission: ordered input files plus the requested action.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub files: Vec<PathBuf>,
    pub action: JobAction,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for final artifacts.
    pub output_dir: PathBuf,
    /// Directory for transient intermediates.
    pub work_dir: PathBuf,
    /// Secondary-bundle archive settings.
    pub archive: ArchiveConfig,
    /// Maximum concurrently executing pipelines. 0 = unlimited.
    pub max_concurrent_jobs: usize,
}

/// Owns the job registry and spawns one executor task per submitted job.
pub struct PipelineManager {
    engine: Arc<dyn MediaEngine>,
    store: Arc<StatusStore>,
    config: PipelineConfig,
    limiter: Option<Arc<Semaphore>>,
}

impl PipelineManager {
    pub fn new(engine: Arc<dyn MediaEngine>, config: PipelineConfig) -> Self {
        let limiter = (config.max_concurrent_jobs > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_jobs)));
        Self {
            engine,
            store: Arc::new(StatusStore::new()),
            config,
            limiter,
        }
    }

    /// The job registry, for the polling path and the purge service.
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Validate and enqueue a job.
    ///
    /// Returns the new job id immediately; the caller never waits for
    /// pipeline execution. On validation failure no job id is issued and no
    /// state is created.
    pub async fn submit(&self, request: SubmitRequest) -> Result<String> {
        Self::validate(&request).await?;

        let job_id = Uuid::new_v4().to_string();
        self.store.put(&job_id, JobStatus::queued())?;

        let job = Job {
            id: job_id.clone(),
            action: request.action,
            inputs: request.files,
        };

        let executor = JobExecutor::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            self.config.archive.clone(),
            self.config.output_dir.clone(),
            self.config.work_dir.clone(),
        );
        let store = Arc::clone(&self.store);
        let limiter = self.limiter.clone();
        let supervised_id = job_id.clone();

        tokio::spawn(async move {
            // Bounding applies to execution only; submission stays
            // non-blocking and the job sits in Queued until a slot frees up.
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            if AssertUnwindSafe(executor.run(job)).catch_unwind().await.is_err() {
                error!(job_id = %supervised_id, "Job task panicked");
                store.update(&supervised_id, |s| {
                    s.stage = Stage::Failed;
                    s.progress_text = "Processing failed".to_string();
                    s.error = Some("internal error: job task panicked".to_string());
                    s.is_completed = true;
                    s.completed_at = Some(Utc::now());
                });
            }
        });

        Ok(job_id)
    }

    /// Read-only status snapshot for polling. `None` for unknown ids.
    pub fn status(&self, job_id: &str) -> Option<Arc<JobStatus>> {
        self.store.get(job_id)
    }

    async fn validate(request: &SubmitRequest) -> Result<()> {
        if request.files.is_empty() {
            return Err(Error::validation("No files submitted"));
        }

        if matches!(
            request.action,
            JobAction::ConvertAndMerge | JobAction::MergeOnly
        ) && request.files.len() < 2
        {
            return Err(Error::validation("Select at least two files to merge"));
        }

        for file in &request.files {
            match tokio::fs::metadata(file).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    return Err(Error::validation(format!(
                        "Not a regular file: {}",
                        file.display()
                    )));
                }
                Err(_) => {
                    return Err(Error::validation(format!(
                        "File does not exist: {}",
                        file.display()
                    )));
                }
            }
        }

        Ok(())
    }
}
