//! Logging setup: console + daily-rolling file output with retention cleanup.
//!
//! Timestamps use the server's local timezone so log lines are easy to
//! correlate with local time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "vidforge=info,tower_http=warn";

/// Log file name prefix; daily rotation appends `.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "vidforge.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize logging with console and daily-rolling file output.
///
/// Returns the appender guard; keep it alive for the process lifetime or
/// buffered file output is lost.
pub fn init(log_dir: &Path) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global subscriber: {}", e)))?;

    Ok(guard)
}

/// Start the daily log retention cleanup task.
pub fn start_retention_cleanup(log_dir: PathBuf, cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let cleanup_interval = Duration::from_secs(24 * 60 * 60);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Log retention cleanup task shutting down");
                    break;
                }
                _ = tokio::time::sleep(cleanup_interval) => {
                    if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                        warn!(error = %e, "Failed to cleanup old logs");
                    }
                }
            }
        }
    });
}

/// Delete log files older than the specified number of days.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let cutoff_ts = cutoff.timestamp();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let prefix = format!("{}.", LOG_FILE_PREFIX);
        let date_str = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.starts_with(&prefix) => name[prefix.len()..].to_string(),
            _ => continue,
        };

        if let Ok(file_date) = chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") {
            let file_ts = file_date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp())
                .unwrap_or(0);

            if file_ts < cutoff_ts {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to delete old log file");
                } else {
                    deleted_count += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("vidforge=info"));
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_log_files() {
        let dir = tempfile::tempdir().unwrap();

        let old = dir.path().join(format!("{}.2001-01-01", LOG_FILE_PREFIX));
        let recent_date = Local::now().format("%Y-%m-%d").to_string();
        let recent = dir.path().join(format!("{}.{}", LOG_FILE_PREFIX, recent_date));
        let unrelated = dir.path().join("other.txt");

        tokio::fs::write(&old, b"old").await.unwrap();
        tokio::fs::write(&recent, b"recent").await.unwrap();
        tokio::fs::write(&unrelated, b"keep").await.unwrap();

        cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).await.unwrap();

        assert!(!old.exists());
        assert!(recent.exists());
        assert!(unrelated.exists());
    }
}
