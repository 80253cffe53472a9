//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PurgeConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server bind address.
    pub bind_address: String,
    /// Server port.
    pub port: u16,
    /// Directory for final artifacts, served under `/converted`.
    pub output_dir: PathBuf,
    /// Directory for transient intermediates.
    pub work_dir: PathBuf,
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary.
    pub ffprobe_path: String,
    /// Maximum concurrently executing pipelines. 0 = unlimited.
    pub max_concurrent_jobs: usize,
    /// Terminal job record retention.
    pub purge: PurgeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 12590,
            output_dir: PathBuf::from("data/converted"),
            work_dir: PathBuf::from("data/work"),
            log_dir: PathBuf::from("logs"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            max_concurrent_jobs: 0,
            purge: PurgeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `VIDFORGE_BIND_ADDRESS`, `VIDFORGE_PORT`
    /// - `VIDFORGE_OUTPUT_DIR`, `VIDFORGE_WORK_DIR`, `VIDFORGE_LOG_DIR`
    /// - `FFMPEG_PATH`, `FFPROBE_PATH`
    /// - `VIDFORGE_MAX_CONCURRENT_JOBS` (0 = unlimited)
    /// - `VIDFORGE_PURGE_ENABLED`, `VIDFORGE_PURGE_TTL_SECS`,
    ///   `VIDFORGE_PURGE_INTERVAL_SECS`
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("VIDFORGE_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("VIDFORGE_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Ok(dir) = std::env::var("VIDFORGE_OUTPUT_DIR")
            && !dir.trim().is_empty()
        {
            config.output_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("VIDFORGE_WORK_DIR")
            && !dir.trim().is_empty()
        {
            config.work_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("VIDFORGE_LOG_DIR")
            && !dir.trim().is_empty()
        {
            config.log_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("FFMPEG_PATH")
            && !path.trim().is_empty()
        {
            config.ffmpeg_path = path;
        }

        if let Ok(path) = std::env::var("FFPROBE_PATH")
            && !path.trim().is_empty()
        {
            config.ffprobe_path = path;
        }

        if let Ok(value) = std::env::var("VIDFORGE_MAX_CONCURRENT_JOBS")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.max_concurrent_jobs = parsed;
        }

        if let Ok(value) = std::env::var("VIDFORGE_PURGE_ENABLED")
            && let Ok(parsed) = value.parse::<bool>()
        {
            config.purge.enabled = parsed;
        }

        if let Ok(value) = std::env::var("VIDFORGE_PURGE_TTL_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.purge.ttl = Duration::from_secs(parsed);
        }

        if let Ok(value) = std::env::var("VIDFORGE_PURGE_INTERVAL_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.purge.interval = Duration::from_secs(parsed);
        }

        config
    }
}
