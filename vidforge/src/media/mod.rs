//! External transcoding engine boundary.
//!
//! The pipeline never shells out to ffmpeg directly; it goes through the
//! [`MediaEngine`] trait so stage execution can be tested against a stub.
//! A running conversion is represented by a [`ConversionHandle`]: a finite,
//! ordered progress-event stream, a finite diagnostic-line stream, and a
//! completion result that only reports success once the output file exists
//! and is non-empty.

mod ffmpeg;
mod parser;
mod spec;

pub use ffmpeg::FfmpegEngine;
pub use parser::{ProgressBlockParser, ProgressSample, parse_time};
pub use spec::ConversionSpec;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;

/// Pixel geometry and duration reported by the media probe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Container duration, when the probe can determine one.
    pub duration: Option<Duration>,
}

impl MediaInfo {
    /// Portrait sources get rotated before scaling during normalization.
    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }
}

/// One progress sample emitted while a conversion runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Percent complete, 0-100. Zero when the total duration is unknown.
    pub percent: f64,
    /// Position within the output timeline.
    pub position: Duration,
    /// Total expected duration, when known.
    pub total: Option<Duration>,
}

/// Handle to a running conversion.
///
/// Both streams are finite and not restartable: they end when the underlying
/// process exits. Events arrive in emission order.
pub struct ConversionHandle {
    progress: mpsc::Receiver<ProgressEvent>,
    diagnostics: Option<mpsc::UnboundedReceiver<String>>,
    completion: JoinHandle<Result<()>>,
}

impl ConversionHandle {
    pub fn new(
        progress: mpsc::Receiver<ProgressEvent>,
        diagnostics: mpsc::UnboundedReceiver<String>,
        completion: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            progress,
            diagnostics: Some(diagnostics),
            completion,
        }
    }

    /// The progress-event stream. Yields `None` once the conversion is done.
    pub fn progress(&mut self) -> &mut mpsc::Receiver<ProgressEvent> {
        &mut self.progress
    }

    /// Take the diagnostic-line stream. Can only be taken once.
    pub fn take_diagnostics(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.diagnostics.take()
    }

    /// Wait for the conversion to finish.
    ///
    /// `Ok(())` means the process exited successfully and the output file
    /// exists and is non-empty.
    pub async fn wait(self) -> Result<()> {
        match self.completion.await {
            Ok(result) => result,
            Err(e) => Err(crate::Error::Engine(format!(
                "conversion task aborted: {}",
                e
            ))),
        }
    }
}

/// Contract with the external transcoding engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Probe a media file's geometry and duration.
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Start a conversion described by `spec`.
    async fn start(&self, spec: ConversionSpec) -> Result<ConversionHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portrait_detection() {
        let portrait = MediaInfo {
            width: 1080,
            height: 1920,
            duration: None,
        };
        assert!(portrait.is_portrait());

        let landscape = MediaInfo {
            width: 1920,
            height: 1080,
            duration: None,
        };
        assert!(!landscape.is_portrait());

        // Square sources take the landscape path.
        let square = MediaInfo {
            width: 1080,
            height: 1080,
            duration: None,
        };
        assert!(!square.is_portrait());
    }
}
