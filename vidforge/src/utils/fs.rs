//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! reduce duplicated `create_dir_all` / output-validation checks.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error("creating directory", path, e))
}

/// Ensure a directory exists (synchronous variant).
pub fn ensure_dir_all_sync(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error("creating directory", path, e))
}

/// Check that a path points at an existing, non-empty regular file.
///
/// Stage outputs are validated with this before the inputs that produced
/// them are released for deletion.
pub async fn is_non_empty_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_empty_file_checks() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.mp4");
        assert!(!is_non_empty_file(&missing).await);

        let empty = dir.path().join("empty.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert!(!is_non_empty_file(&empty).await);

        let full = dir.path().join("full.mp4");
        tokio::fs::write(&full, b"data").await.unwrap();
        assert!(is_non_empty_file(&full).await);

        assert!(!is_non_empty_file(dir.path()).await);
    }

    #[tokio::test]
    async fn ensure_dir_all_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir_all(&nested).await.unwrap();
        assert!(nested.is_dir());

        // Re-ensuring an existing directory is a no-op.
        ensure_dir_all(&nested).await.unwrap();
    }
}
