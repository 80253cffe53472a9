use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use vidforge::api::server::{self, ApiServerConfig, AppState};
use vidforge::config::AppConfig;
use vidforge::media::FfmpegEngine;
use vidforge::pipeline::{JobPurgeService, PipelineConfig, PipelineManager};
use vidforge::utils::fs;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();

    // Initialize logging; keep the guard alive for the process lifetime
    let _guard = vidforge::logging::init(&config.log_dir)?;

    let cancel_token = CancellationToken::new();
    vidforge::logging::start_retention_cleanup(config.log_dir.clone(), cancel_token.clone());

    fs::ensure_dir_all(&config.output_dir).await?;
    fs::ensure_dir_all(&config.work_dir).await?;

    let engine = Arc::new(FfmpegEngine::with_paths(
        &config.ffmpeg_path,
        &config.ffprobe_path,
    ));

    let manager = Arc::new(PipelineManager::new(
        engine,
        PipelineConfig {
            output_dir: config.output_dir.clone(),
            work_dir: config.work_dir.clone(),
            archive: Default::default(),
            max_concurrent_jobs: config.max_concurrent_jobs,
        },
    ));

    JobPurgeService::new(Arc::clone(manager.store()), config.purge.clone())
        .start(cancel_token.clone());

    info!("vidforge initialized");

    let state = AppState::new(Arc::clone(&manager), config.output_dir.clone());
    let server_config = ApiServerConfig {
        bind_address: config.bind_address.clone(),
        port: config.port,
        enable_cors: true,
    };

    server::serve(server_config, state, cancel_token.clone()).await?;

    cancel_token.cancel();
    Ok(())
}
