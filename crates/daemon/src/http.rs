use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use visits_core::{
    api::{
        CreateTaskRequest, CreateTaskResponse, ErrorResponse, OkResponse, SetModeRequest,
        SetModeResponse, TaskListResponse, ADMIN_PASS_HEADER,
    },
    SweepReport, Task, TaskError,
};

use crate::service::{ServiceError, TaskService};

#[derive(Clone)]
pub struct AppState {
    svc: Arc<TaskService>,
}

pub fn router(svc: Arc<TaskService>) -> Router {
    let state = AppState { svc };
    Router::new()
        .route("/api/health", get(health))
        .route("/api/task/create", post(create_task))
        .route("/api/task/{id}/stop", post(stop_task))
        .route("/api/task/{id}", get(get_task))
        .route("/api/tasks", get(list_tasks))
        .route("/api/worker/run", post(run_worker))
        .route("/api/admin/set_mode", post(set_mode))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

async fn create_task(
    State(st): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    let task = st.svc.create(&req.uid, req.target).await?;
    Ok(Json(CreateTaskResponse {
        ok: true,
        task_id: task.id,
    }))
}

async fn stop_task(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    st.svc.stop(&id).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_task(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(st.svc.get(&id).await?))
}

async fn list_tasks(
    State(st): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TaskListResponse>, ApiError> {
    st.require_admin(&headers)?;
    let tasks = st.svc.list().await?;
    Ok(Json(TaskListResponse { tasks }))
}

/// Externally triggered sweep. Afterwards every still-running task gets an
/// in-process loop, unless background workers are disabled.
async fn run_worker(
    State(st): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, ApiError> {
    st.require_admin(&headers)?;
    let report = st.svc.run_one_iteration_for_all().await?;
    st.svc.ensure_workers_for_running().await?;
    Ok(Json(report))
}

async fn set_mode(
    State(st): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetModeRequest>,
) -> Result<Json<SetModeResponse>, ApiError> {
    st.require_admin(&headers)?;
    let mode = st.svc.set_accum_mode(&req.mode).await?;
    Ok(Json(SetModeResponse { ok: true, mode }))
}

impl AppState {
    fn require_admin(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = self.svc.config().admin_pass.as_deref() else {
            return Err(ApiError::Unauthorized("admin access is disabled".into()));
        };
        let supplied = headers
            .get(ADMIN_PASS_HEADER)
            .and_then(|v| v.to_str().ok());
        if supplied == Some(expected) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized("admin auth required".into()))
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Task(TaskError::InvalidArgument(m)) => Self::BadRequest(m),
            ServiceError::Task(e @ TaskError::NotFound(_)) => Self::NotFound(e.to_string()),
            ServiceError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (code, body).into_response()
    }
}
