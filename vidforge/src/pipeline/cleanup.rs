//! Cleanup of consumed inputs and transient artifacts.
//!
//! Inputs are only released for deletion once the stage output that
//! replaced them is confirmed present and non-empty. Deletion is
//! idempotent; transiently locked files are retried with backoff.

use std::path::{Path, PathBuf};

use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::utils::fs;

/// Default maximum retry attempts for locked files.
fn default_max_retries() -> u32 {
    3
}

/// Default base delay between retries in milliseconds.
fn default_retry_delay_ms() -> u64 {
    100
}

/// Deletes consumed files, tolerating missing targets and retrying locked
/// ones.
#[derive(Debug, Clone)]
pub struct CleanupManager {
    max_retries: u32,
    retry_delay_ms: u64,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Delete `inputs` consumed by a stage, but only once `replacement`
    /// exists and is non-empty. If the replacement is not confirmed the
    /// inputs are left untouched.
    pub async fn remove_consumed(&self, inputs: &[PathBuf], replacement: &Path) {
        if !fs::is_non_empty_file(replacement).await {
            warn!(
                replacement = %replacement.display(),
                "Keeping consumed inputs: replacement output is missing or empty"
            );
            return;
        }
        self.remove_files(inputs).await;
    }

    /// Delete files unconditionally. Missing files are not an error;
    /// persistent failures are logged and skipped.
    pub async fn remove_files(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = self.delete_with_retry(path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete file");
            }
        }
    }

    /// Check if an error indicates the file is locked/in use.
    fn is_file_locked_error(error: &std::io::Error) -> bool {
        // Windows: ERROR_SHARING_VIOLATION = 32, ERROR_LOCK_VIOLATION = 33
        // Unix: EBUSY = 16, ETXTBSY = 26
        matches!(
            error.raw_os_error(),
            Some(32) | Some(33) | Some(16) | Some(26)
        ) || error.to_string().to_lowercase().contains("being used")
            || error.to_string().to_lowercase().contains("locked")
            || error.to_string().to_lowercase().contains("busy")
    }

    async fn delete_with_retry(&self, path: &Path) -> std::result::Result<(), String> {
        let mut last_error: Option<std::io::Error> = None;

        for attempt in 0..=self.max_retries {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(
                            path = %path.display(),
                            retries = attempt,
                            "File deleted after retries"
                        );
                    }
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "File already absent");
                    return Ok(());
                }
                Err(e) => {
                    if Self::is_file_locked_error(&e) && attempt < self.max_retries {
                        let delay = self.retry_delay_ms * 2u64.pow(attempt);
                        warn!(
                            path = %path.display(),
                            delay_ms = delay,
                            attempt = attempt + 1,
                            "File is locked, retrying"
                        );
                        sleep(Duration::from_millis(delay)).await;
                        last_error = Some(e);
                    } else {
                        return Err(e.to_string());
                    }
                }
            }
        }

        Err(last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "retries exhausted".to_string()))
    }
}

impl Default for CleanupManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.mp4");
        tokio::fs::write(&file, b"x").await.unwrap();

        let cleanup = CleanupManager::new();
        cleanup.remove_files(std::slice::from_ref(&file)).await;
        assert!(!file.exists());

        // Deleting an already-absent file is not an error.
        cleanup.remove_files(std::slice::from_ref(&file)).await;
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_consumed_inputs_kept_without_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mp4");
        tokio::fs::write(&input, b"source").await.unwrap();

        let cleanup = CleanupManager::new();

        // Replacement missing entirely.
        let missing = dir.path().join("missing.mp4");
        cleanup
            .remove_consumed(std::slice::from_ref(&input), &missing)
            .await;
        assert!(input.exists());

        // Replacement present but empty.
        let empty = dir.path().join("empty.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        cleanup
            .remove_consumed(std::slice::from_ref(&input), &empty)
            .await;
        assert!(input.exists());

        // Replacement confirmed: inputs are released.
        let output = dir.path().join("output.mp4");
        tokio::fs::write(&output, b"converted").await.unwrap();
        cleanup
            .remove_consumed(std::slice::from_ref(&input), &output)
            .await;
        assert!(!input.exists());
        assert!(output.exists());
    }
}
