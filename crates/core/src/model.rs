use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Lifecycle state of a task.
///
/// `running` is the only state the pollers act on. `stopped` and `completed`
/// are never left once entered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Polled by background loops and sweeps.
    Running,
    /// Stopped by an explicit command.
    #[default]
    Stopped,
    /// Accumulated total reached the target.
    Completed,
}

impl TaskStatus {
    /// Returns the persisted spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule mapping a freshly observed provider counter to an increment.
///
/// Both modes call the same provider endpoint. Which one is right depends on
/// whether that provider reports a per-call delta (`add_reports`) or a running
/// total (`add_increase`); the engine cannot tell the difference, so this is a
/// deployment setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccumMode {
    /// Every observed value is added in full.
    #[default]
    AddReports,
    /// Only the growth over the previous observation is added.
    AddIncrease,
}

impl AccumMode {
    /// Returns the persisted spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            AccumMode::AddReports => "add_reports",
            AccumMode::AddIncrease => "add_increase",
        }
    }
}

impl fmt::Display for AccumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccumMode {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "add_reports" => Ok(AccumMode::AddReports),
            "add_increase" => Ok(AccumMode::AddIncrease),
            other => Err(TaskError::InvalidArgument(format!(
                "unknown accumulation mode '{other}' (expected add_reports or add_increase)"
            ))),
        }
    }
}

/// Global settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Settings {
    /// Increment rule applied by every poll.
    #[serde(default)]
    pub accum_mode: AccumMode,
}

impl Settings {
    /// Settings with the given accumulation mode.
    pub fn with_mode(accum_mode: AccumMode) -> Self {
        Self { accum_mode }
    }
}

/// One poll record appended to a task log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollLog {
    #[serde(default)]
    pub time: DateTime<Utc>,

    /// Counter value as coerced for accumulation (0 on failure).
    #[serde(rename = "success_value", default, deserialize_with = "lenient::count")]
    pub observed_value: u64,

    /// Increment applied by this poll.
    #[serde(default, deserialize_with = "lenient::count")]
    pub added: u64,

    /// Provider response body, `null` when the fetch failed.
    #[serde(rename = "api", default)]
    pub raw_response: serde_json::Value,

    /// Fetch failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Progress record toward a per-user target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    /// External user identifier handed to the provider.
    #[serde(default)]
    pub uid: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub target: u64,
    /// Monotonically non-decreasing total.
    #[serde(default, deserialize_with = "lenient::count")]
    pub accumulated: u64,
    #[serde(default)]
    pub status: TaskStatus,
    /// Last raw counter value observed, used by `add_increase`.
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub last_successful: Option<u64>,
    /// Append-only poll history.
    #[serde(default)]
    pub logs: Vec<PollLog>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Validates the inputs and builds a fresh `running` task.
    pub fn new(
        id: String,
        uid: &str,
        target: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, TaskError> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(TaskError::InvalidArgument("uid must not be empty".into()));
        }
        if target <= 0 {
            return Err(TaskError::InvalidArgument(format!(
                "target must be positive, got {target}"
            )));
        }

        Ok(Self {
            id,
            uid: uid.to_string(),
            target: target as u64,
            accumulated: 0,
            status: TaskStatus::Running,
            last_successful: None,
            logs: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
            completed_at: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Moves a running task to `stopped`. Terminal tasks are left untouched.
    ///
    /// Returns true when the status changed.
    pub fn stop(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = TaskStatus::Stopped;
        self.updated_at = Some(now);
        true
    }

    /// Short view used in sweep reports.
    pub fn summary(&self, added: u64) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            uid: self.uid.clone(),
            added,
            accumulated: self.accumulated,
            status: self.status,
        }
    }
}

/// Per-task line of a sweep report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    pub id: String,
    pub uid: String,
    pub added: u64,
    pub accumulated: u64,
    pub status: TaskStatus,
}

/// Result of one synchronous pass over every running task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of tasks polled and updated.
    #[serde(rename = "processed")]
    pub processed_count: usize,
    pub results: Vec<TaskSummary>,
    pub accum_mode: AccumMode,
}

/// Readers for counters in stored documents. Older deployments wrote raw
/// provider values, including negatives; one odd record must not make the
/// whole collection unreadable.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn count<'de, D>(d: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(coerce(&Value::deserialize(d)?))
    }

    pub(super) fn opt_count<'de, D>(d: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            v => Ok(Some(coerce(&v))),
        }
    }

    /// Negative clamps to 0, floats truncate, integer strings parse,
    /// anything else is 0.
    fn coerce(v: &Value) -> u64 {
        match v {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.is_finite())
                        .map(|f| f.max(0.0).trunc() as u64)
                })
                .unwrap_or(0),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| i.max(0) as u64)
                .unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        "2026-01-02T03:04:05Z".parse().unwrap()
    }

    #[test]
    fn new_task_starts_running_and_empty() {
        let t = Task::new("t1".into(), "  user-9 ", 100, ts()).unwrap();
        assert_eq!(t.uid, "user-9");
        assert_eq!(t.status, TaskStatus::Running);
        assert_eq!(t.accumulated, 0);
        assert!(t.last_successful.is_none());
        assert!(t.logs.is_empty());
        assert_eq!(t.created_at, Some(ts()));
    }

    #[test]
    fn new_task_rejects_bad_input() {
        assert!(matches!(
            Task::new("t".into(), "   ", 10, ts()),
            Err(TaskError::InvalidArgument(_))
        ));
        assert!(matches!(
            Task::new("t".into(), "u", 0, ts()),
            Err(TaskError::InvalidArgument(_))
        ));
        assert!(matches!(
            Task::new("t".into(), "u", -5, ts()),
            Err(TaskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn stop_leaves_terminal_tasks_alone() {
        let mut t = Task::new("t".into(), "u", 10, ts()).unwrap();
        t.status = TaskStatus::Completed;
        t.accumulated = 12;
        assert!(!t.stop(ts()));
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.accumulated, 12);
    }

    #[test]
    fn accum_mode_parse() {
        assert_eq!("add_reports".parse::<AccumMode>().unwrap(), AccumMode::AddReports);
        assert_eq!("add_increase".parse::<AccumMode>().unwrap(), AccumMode::AddIncrease);
        assert!(matches!(
            "add_everything".parse::<AccumMode>(),
            Err(TaskError::InvalidArgument(_))
        ));
    }
}
