//! Job submission and polling routes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/jobs` | Submit a batch of files for processing |
//! | GET | `/api/jobs/{taskId}/progress` | Poll a job's status snapshot |

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::pipeline::{FileFailure, JobAction, JobStatus, SubmitRequest};

/// Public URL prefix the output directory is served under.
pub const ARTIFACT_URL_PREFIX: &str = "/converted";

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_job))
        .route("/{task_id}/progress", get(job_progress))
}

/// Request body for submitting a job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// Ordered input file paths; order is significant for merges.
    pub files: Vec<String>,
    /// Requested processing action.
    pub action: JobAction,
}

/// Response body for a submitted job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub message: String,
    pub task_id: String,
}

/// Status snapshot returned to pollers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressResponse {
    pub progress_text: String,
    pub total_time_ms: u64,
    pub estimated_time_ms: u64,
    pub percentage: f64,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_artifact_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_artifact_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_errors: Vec<FileFailure>,
}

impl JobProgressResponse {
    fn from_status(status: &JobStatus) -> Self {
        Self {
            progress_text: status.progress_text.clone(),
            total_time_ms: status.total_time_ms,
            estimated_time_ms: status.estimated_time_ms,
            percentage: status.percentage,
            is_completed: status.is_completed,
            merged_artifact_url: status.merged_file.as_deref().and_then(artifact_url),
            archive_artifact_url: status.archive_file.as_deref().and_then(artifact_url),
            error_text: status.error.clone(),
            file_errors: status.file_errors.clone(),
        }
    }
}

/// Map an artifact path onto its public URL under the static file mount.
fn artifact_url(path: &std::path::Path) -> Option<String> {
    path.file_name()
        .map(|name| format!("{}/{}", ARTIFACT_URL_PREFIX, name.to_string_lossy()))
}

/// Submit a batch of files for processing.
///
/// Validation failures are rejected synchronously; on success the pipeline
/// runs in the background and the returned task id is ready for polling.
async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let submit = SubmitRequest {
        files: request.files.iter().map(std::path::PathBuf::from).collect(),
        action: request.action,
    };

    let task_id = state.manager.submit(submit).await.map_err(ApiError::from)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            message: "Processing started.".to_string(),
            task_id,
        }),
    ))
}

/// Poll a job's status snapshot.
async fn job_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<JobProgressResponse>> {
    let status = state
        .manager
        .status(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("task '{}' not found", task_id)))?;

    Ok(Json(JobProgressResponse::from_status(&status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_utils::{StubEngine, wait_terminal, write_input};
    use crate::pipeline::{ArchiveConfig, PipelineConfig, PipelineManager};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(root: &std::path::Path) -> AppState {
        let manager = Arc::new(PipelineManager::new(
            Arc::new(StubEngine::default()),
            PipelineConfig {
                output_dir: root.join("converted"),
                work_dir: root.join("work"),
                archive: ArchiveConfig::default(),
                max_concurrent_jobs: 0,
            },
        ));
        AppState::new(manager, root.join("converted"))
    }

    fn app(state: AppState) -> Router {
        Router::new().nest("/api/jobs", router()).with_state(state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_empty_files_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path()));

        let response = app
            .oneshot(post_json(
                "/api/jobs",
                serde_json::json!({"files": [], "action": "ConvertOnly"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_submit_and_poll_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let input = write_input(dir.path(), "clip.mp4");

        let response = app(state.clone())
            .oneshot(post_json(
                "/api/jobs",
                serde_json::json!({
                    "files": [input.to_string_lossy()],
                    "action": "ConvertOnly"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Processing started.");
        let task_id = body["taskId"].as_str().unwrap().to_string();
        assert!(!task_id.is_empty());

        wait_terminal(state.manager.store(), &task_id).await;

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/api/jobs/{}/progress", task_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["isCompleted"], true);
        let url = body["mergedArtifactUrl"].as_str().unwrap();
        assert!(url.starts_with("/converted/"));
        assert!(body.get("archiveArtifactUrl").is_none());
        assert!(body.get("errorText").is_none());
    }

    #[tokio::test]
    async fn test_poll_unknown_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/jobs/never-issued/progress")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[test]
    fn test_artifact_url_uses_base_name() {
        let url = artifact_url(std::path::Path::new("/data/out/merged_1.mp4")).unwrap();
        assert_eq!(url, "/converted/merged_1.mp4");
    }
}
