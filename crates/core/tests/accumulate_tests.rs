//! Accumulation behaviour over sequences of polls.

use chrono::{DateTime, Utc};
use serde_json::json;
use visits_core::{apply_poll, AccumMode, FetchResult, Task, TaskStatus};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn observed(v: i64) -> FetchResult {
    FetchResult::Ok {
        observed: Some(v),
        raw: json!({ "SuccessfulVisits": v }),
    }
}

fn task(target: i64) -> Task {
    Task::new("t-1".into(), "user-1", target, at(0)).unwrap()
}

fn feed(task: &mut Task, mode: AccumMode, values: &[i64]) -> Vec<Option<u64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| apply_poll(task, mode, &observed(*v), at(i as i64 + 1)))
        .collect()
}

#[test]
fn add_reports_sums_every_observation() {
    let mut t = task(1_000);
    let added = feed(&mut t, AccumMode::AddReports, &[5, 3, 10]);
    assert_eq!(added, vec![Some(5), Some(3), Some(10)]);
    assert_eq!(t.accumulated, 18);
    assert_eq!(t.logs.len(), 3);
    assert_eq!(t.status, TaskStatus::Running);
}

#[test]
fn add_increase_handles_provider_reset() {
    let mut t = task(1_000);
    let added = feed(&mut t, AccumMode::AddIncrease, &[5, 12, 10]);
    assert_eq!(added, vec![Some(5), Some(7), Some(0)]);
    assert_eq!(t.accumulated, 12);
    assert_eq!(t.last_successful, Some(10));
}

#[test]
fn reaching_target_completes_task() {
    let mut t = task(100);
    apply_poll(&mut t, AccumMode::AddReports, &observed(100), at(5));
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.completed_at, Some(at(5)));
    assert_eq!(t.accumulated, 100);
}

#[test]
fn overshoot_is_not_capped() {
    let mut t = task(10);
    feed(&mut t, AccumMode::AddReports, &[7, 9]);
    assert_eq!(t.accumulated, 16);
    assert_eq!(t.status, TaskStatus::Completed);
}

#[test]
fn completion_fires_on_zero_increment_poll() {
    let mut t = task(10);
    // Loaded from disk already past target but still marked running.
    t.accumulated = 10;
    let added = apply_poll(&mut t, AccumMode::AddReports, &observed(0), at(1));
    assert_eq!(added, Some(0));
    assert_eq!(t.status, TaskStatus::Completed);
}

#[test]
fn completed_task_is_frozen() {
    let mut t = task(5);
    feed(&mut t, AccumMode::AddReports, &[6]);
    let snapshot = t.clone();

    assert_eq!(apply_poll(&mut t, AccumMode::AddReports, &observed(50), at(9)), None);
    assert_eq!(apply_poll(&mut t, AccumMode::AddIncrease, &observed(90), at(10)), None);
    assert_eq!(t, snapshot);
}

#[test]
fn stopped_task_is_not_polled() {
    let mut t = task(5);
    t.stop(at(1));
    assert_eq!(apply_poll(&mut t, AccumMode::AddReports, &observed(3), at(2)), None);
    assert_eq!(t.accumulated, 0);
    assert!(t.logs.is_empty());
}

#[test]
fn failed_fetch_counts_as_zero_and_is_logged() {
    let mut t = task(100);
    feed(&mut t, AccumMode::AddIncrease, &[8]);
    let failure = FetchResult::Failed {
        error: "connection refused".into(),
    };
    let added = apply_poll(&mut t, AccumMode::AddIncrease, &failure, at(2));
    assert_eq!(added, Some(0));
    assert_eq!(t.accumulated, 8);
    // A failed poll resets the baseline to 0, so the next good value is added in full.
    assert_eq!(t.last_successful, Some(0));
    let last = t.logs.last().unwrap();
    assert_eq!(last.error.as_deref(), Some("connection refused"));
    assert!(last.raw_response.is_null());
}

#[test]
fn accumulated_never_decreases() {
    let values = [3, -2, 40, 0, 7, 7, 1, 99, -50, 12];
    for mode in [AccumMode::AddReports, AccumMode::AddIncrease] {
        let mut t = task(i64::MAX);
        let mut prev = 0;
        for (i, v) in values.iter().enumerate() {
            apply_poll(&mut t, mode, &observed(*v), at(i as i64));
            assert!(t.accumulated >= prev, "{mode}: {} < {prev}", t.accumulated);
            prev = t.accumulated;
        }
    }
}
