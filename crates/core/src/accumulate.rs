//! Accumulation engine: turns one provider observation into task progress.
//!
//! Everything here is synchronous and free of I/O; callers decide when to
//! fetch and where to persist.

use chrono::{DateTime, Utc};

use crate::model::{AccumMode, PollLog, Task, TaskStatus};

/// Outcome of one call to the visit-count provider.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// The provider answered. `observed` is absent when the counter field was
    /// missing or not coercible to an integer.
    Ok {
        observed: Option<i64>,
        raw: serde_json::Value,
    },
    /// Network, timeout, status or decode failure.
    Failed { error: String },
}

/// Counter value used for accumulation. Failures, absent values and
/// negative values all count as 0.
pub fn observed_count(fetch: &FetchResult) -> u64 {
    match fetch {
        FetchResult::Ok {
            observed: Some(v), ..
        } => (*v).max(0) as u64,
        _ => 0,
    }
}

/// Increment for a single observation under `mode`.
pub fn increment(mode: AccumMode, last_successful: Option<u64>, observed: u64) -> u64 {
    match mode {
        AccumMode::AddReports => observed,
        AccumMode::AddIncrease => match last_successful {
            None => observed,
            // Provider resets yield 0, never a negative delta.
            Some(last) => observed.saturating_sub(last),
        },
    }
}

/// Applies one observation to `task` and returns the increment.
///
/// Tasks that are not `running` are left untouched and `None` is returned.
/// Completion is level-triggered: it is checked after every poll, including
/// polls that add nothing.
pub fn apply_poll(
    task: &mut Task,
    mode: AccumMode,
    fetch: &FetchResult,
    now: DateTime<Utc>,
) -> Option<u64> {
    if !task.is_running() {
        return None;
    }

    let observed = observed_count(fetch);
    let added = increment(mode, task.last_successful, observed);

    task.accumulated = task.accumulated.saturating_add(added);
    task.last_successful = Some(observed);

    let (raw_response, error) = match fetch {
        FetchResult::Ok { raw, .. } => (raw.clone(), None),
        FetchResult::Failed { error } => (serde_json::Value::Null, Some(error.clone())),
    };
    task.logs.push(PollLog {
        time: now,
        observed_value: observed,
        added,
        raw_response,
        error,
    });
    task.updated_at = Some(now);

    if task.accumulated >= task.target {
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
    }

    Some(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(v: i64) -> FetchResult {
        FetchResult::Ok {
            observed: Some(v),
            raw: json!({ "SuccessfulVisits": v }),
        }
    }

    #[test]
    fn negative_and_missing_counts_are_zero() {
        assert_eq!(observed_count(&ok(-4)), 0);
        assert_eq!(
            observed_count(&FetchResult::Ok {
                observed: None,
                raw: json!({}),
            }),
            0
        );
        assert_eq!(
            observed_count(&FetchResult::Failed {
                error: "timeout".into()
            }),
            0
        );
    }

    #[test]
    fn increase_mode_bootstraps_then_clamps() {
        assert_eq!(increment(AccumMode::AddIncrease, None, 5), 5);
        assert_eq!(increment(AccumMode::AddIncrease, Some(5), 12), 7);
        assert_eq!(increment(AccumMode::AddIncrease, Some(12), 10), 0);
    }

    #[test]
    fn reports_mode_ignores_history() {
        assert_eq!(increment(AccumMode::AddReports, Some(100), 3), 3);
        assert_eq!(increment(AccumMode::AddReports, None, 0), 0);
    }
}
