//! API server setup and configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes;
use crate::api::routes::jobs::ARTIFACT_URL_PREFIX;
use crate::error::Result;
use crate::pipeline::PipelineManager;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 12590,
            enable_cors: true,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Pipeline manager owning the job registry
    pub manager: Arc<PipelineManager>,
    /// Directory of final artifacts, served under `/converted`
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(manager: Arc<PipelineManager>, output_dir: PathBuf) -> Self {
        Self {
            start_time: Instant::now(),
            manager,
            output_dir,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut router = Router::new()
        .nest("/api/jobs", routes::jobs::router())
        .nest("/api/health", routes::health::router())
        .nest_service(ARTIFACT_URL_PREFIX, ServeDir::new(&state.output_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Bind and serve the API until the cancellation token fires or the process
/// receives ctrl-c.
pub async fn serve(
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
) -> Result<()> {
    let router = build_router(state, config.enable_cors);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| crate::Error::config(format!("Invalid bind address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::Error::config(format!("Failed to bind {}: {}", addr, e)))?;

    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = cancel_token.cancelled() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            info!("API server shutting down");
        })
        .await
        .map_err(|e| crate::Error::Other(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert!(config.enable_cors);
    }
}
