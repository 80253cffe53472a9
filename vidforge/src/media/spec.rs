//! Conversion specification: an ordered parameter description plus an
//! output path, turned into an ffmpeg argument vector.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Description of one conversion: ordered inputs, pre-input and output
/// options, and the output path.
///
/// The expected total duration, when known from a probe, lets the engine
/// translate timeline positions into percentages.
#[derive(Debug, Clone)]
pub struct ConversionSpec {
    inputs: Vec<PathBuf>,
    pre_input_args: Vec<String>,
    output_args: Vec<String>,
    output: PathBuf,
    total_duration: Option<Duration>,
}

impl ConversionSpec {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            pre_input_args: Vec::new(),
            output_args: Vec::new(),
            output: output.into(),
            total_duration: None,
        }
    }

    /// Append an input file. Input order is significant for merges.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Append options placed before the input arguments.
    pub fn pre_input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append options placed after the inputs, before the output path.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_args(["-vf".to_string(), filter.into()])
    }

    /// Set the expected output duration used for percent computation.
    pub fn total_duration(mut self, duration: Option<Duration>) -> Self {
        self.total_duration = duration;
        self
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn expected_duration(&self) -> Option<Duration> {
        self.total_duration
    }

    /// Build the full ffmpeg argument vector.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "info".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
        ];

        args.extend(self.pre_input_args.iter().cloned());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}
