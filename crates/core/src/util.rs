use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Current UTC time truncated to whole seconds.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Generates a fresh task id.
pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}
