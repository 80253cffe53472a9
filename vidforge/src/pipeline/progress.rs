//! Completion-time estimation from progress samples.
//!
//! Each sample fully recomputes the estimate; no smoothing is applied, so a
//! noisy percent signal produces non-monotonic estimates.

use std::time::Duration;

/// Estimate derived from one `(elapsed, percent)` sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Projected total stage duration in milliseconds.
    pub total_ms: u64,
    /// Projected remaining time in milliseconds, never negative.
    pub remaining_ms: u64,
    /// The percent actually used, after the zero guard.
    pub percent: f64,
}

/// Estimate total and remaining time for the current stage.
///
/// A reported percent of zero is treated as one so the projection stays
/// finite before the first real progress update.
pub fn estimate(elapsed: Duration, percent_complete: f64) -> Estimate {
    let percent = if percent_complete <= 0.0 {
        1.0
    } else {
        percent_complete.min(100.0)
    };

    let elapsed_ms = elapsed.as_millis() as f64;
    let total_ms = elapsed_ms / percent * 100.0;
    let remaining_ms = (total_ms - elapsed_ms).max(0.0);

    Estimate {
        total_ms: total_ms.round() as u64,
        remaining_ms: remaining_ms.round() as u64,
        percent,
    }
}

/// Format a duration as `hh:mm:ss`.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
