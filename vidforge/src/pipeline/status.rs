//! Job status records and the concurrent status store.
//!
//! The store is the single structure shared across jobs. Each entry is
//! single-writer (the executor task that owns the job) and multi-reader
//! (pollers); updates replace the whole snapshot atomically so readers
//! never observe a partially written record.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pipeline stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Queued,
    Converting,
    Normalizing,
    Merging,
    Archiving,
    Completed,
    Failed,
}

/// Per-file failure recorded when an input is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Snapshot of one job's progress.
///
/// `percentage` and the time estimates are stage-local: they reset at the
/// start of each stage. Once `is_completed` is true the record is terminal
/// and never changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub stage: Stage,
    pub progress_text: String,
    pub total_time_ms: u64,
    pub estimated_time_ms: u64,
    pub percentage: f64,
    pub is_completed: bool,
    pub merged_file: Option<PathBuf>,
    pub archive_file: Option<PathBuf>,
    pub error: Option<String>,
    pub file_errors: Vec<FileFailure>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Initial record inserted at submission time.
    pub fn queued() -> Self {
        Self {
            stage: Stage::Queued,
            progress_text: "Queued".to_string(),
            total_time_ms: 0,
            estimated_time_ms: 0,
            percentage: 0.0,
            is_completed: false,
            merged_file: None,
            archive_file: None,
            error: None,
            file_errors: Vec::new(),
            completed_at: None,
        }
    }
}

/// Concurrent map from job id to status snapshot.
pub struct StatusStore {
    entries: DashMap<String, Arc<JobStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert the initial record for a job. Fails if the id is already
    /// present.
    pub fn put(&self, job_id: &str, status: JobStatus) -> Result<()> {
        match self.entries.entry(job_id.to_string()) {
            Entry::Occupied(_) => Err(Error::JobConflict(job_id.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(status));
                Ok(())
            }
        }
    }

    /// Fetch the current snapshot for a job.
    pub fn get(&self, job_id: &str) -> Option<Arc<JobStatus>> {
        self.entries.get(job_id).map(|entry| Arc::clone(&entry))
    }

    /// Replace a job's snapshot with a modified copy.
    ///
    /// Used only by the executor task that owns the job. Terminal records
    /// are immutable: updates against them are ignored.
    pub(crate) fn update(&self, job_id: &str, f: impl FnOnce(&mut JobStatus)) {
        if let Some(mut entry) = self.entries.get_mut(job_id) {
            if entry.is_completed {
                return;
            }
            let mut next = (**entry).clone();
            f(&mut next);
            *entry = Arc::new(next);
        }
    }

    /// Remove a record, returning its last snapshot.
    pub(crate) fn remove(&self, job_id: &str) -> Option<Arc<JobStatus>> {
        self.entries.remove(job_id).map(|(_, status)| status)
    }

    /// Terminal records whose completion time is before `cutoff`.
    pub(crate) fn expired_terminal(&self, cutoff: DateTime<Utc>) -> Vec<(String, Arc<JobStatus>)> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.is_completed
                    && entry
                        .completed_at
                        .is_some_and(|completed| completed < cutoff)
            })
            .map(|entry| (entry.key().clone(), Arc::clone(&entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}
