//! Periodic purge of terminal job records and their final artifacts.
//!
//! Completed and failed job records are kept for polling until they age past
//! the configured TTL, then removed together with the artifacts they point
//! at.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::status::StatusStore;

/// Configuration for the purge service.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    pub enabled: bool,
    /// How long terminal records are kept after completion.
    pub ttl: Duration,
    /// Sweep interval.
    pub interval: Duration,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(24 * 60 * 60),
            interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Sweeps expired terminal records out of the status store.
pub struct JobPurgeService {
    store: Arc<StatusStore>,
    config: PurgeConfig,
}

impl JobPurgeService {
    pub fn new(store: Arc<StatusStore>, config: PurgeConfig) -> Self {
        Self { store, config }
    }

    /// Start the periodic sweep. Returns `None` when purging is disabled.
    pub fn start(self, cancel_token: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }

        let interval = self.config.interval;
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Job purge service shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        self.sweep().await;
                    }
                }
            }
        }))
    }

    /// Remove terminal records older than the TTL along with their
    /// artifacts.
    pub async fn sweep(&self) {
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - ttl;

        let expired = self.store.expired_terminal(cutoff);
        if expired.is_empty() {
            return;
        }

        for (job_id, status) in expired {
            for artifact in [&status.merged_file, &status.archive_file]
                .into_iter()
                .flatten()
            {
                match tokio::fs::remove_file(artifact).await {
                    Ok(()) => debug!(path = %artifact.display(), "Deleted expired artifact"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %artifact.display(), error = %e, "Failed to delete expired artifact")
                    }
                }
            }

            self.store.remove(&job_id);
            info!(job_id = %job_id, "Purged expired job record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::status::JobStatus;

    fn terminal_status(completed_hours_ago: i64) -> JobStatus {
        let mut status = JobStatus::queued();
        status.is_completed = true;
        status.completed_at = Some(Utc::now() - chrono::Duration::hours(completed_hours_ago));
        status
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_records_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("merged_old.mp4");
        let archive = dir.path().join("bundle_old.zip");
        tokio::fs::write(&merged, b"merged").await.unwrap();
        tokio::fs::write(&archive, b"bundle").await.unwrap();

        let store = Arc::new(StatusStore::new());

        let mut old = terminal_status(48);
        old.merged_file = Some(merged.clone());
        old.archive_file = Some(archive.clone());
        store.put("old", old).unwrap();

        store.put("fresh", terminal_status(1)).unwrap();
        store.put("running", JobStatus::queued()).unwrap();

        let service = JobPurgeService::new(Arc::clone(&store), PurgeConfig::default());
        service.sweep().await;

        assert!(store.get("old").is_none());
        assert!(!merged.exists());
        assert!(!archive.exists());

        assert!(store.get("fresh").is_some());
        assert!(store.get("running").is_some());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_artifacts() {
        let store = Arc::new(StatusStore::new());

        let mut old = terminal_status(48);
        old.merged_file = Some("/nonexistent/merged.mp4".into());
        store.put("old", old).unwrap();

        let service = JobPurgeService::new(Arc::clone(&store), PurgeConfig::default());
        service.sweep().await;

        assert!(store.get("old").is_none());
    }

    #[test]
    fn test_disabled_service_does_not_start() {
        let store = Arc::new(StatusStore::new());
        let service = JobPurgeService::new(
            store,
            PurgeConfig {
                enabled: false,
                ..Default::default()
            },
        );
        assert!(service.start(CancellationToken::new()).is_none());
    }
}
