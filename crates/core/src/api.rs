use serde::{Deserialize, Serialize};

use crate::model::{AccumMode, Task};

/// Create a task for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub uid: String,
    #[serde(default)]
    pub target: i64,
}

/// Create response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub ok: bool,
    pub task_id: String,
}

/// Bare acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Admin task listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
}

/// Admin: change the accumulation mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

/// Set-mode response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetModeResponse {
    pub ok: bool,
    pub mode: AccumMode,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Header carrying the admin credential.
pub const ADMIN_PASS_HEADER: &str = "x-admin-pass";
