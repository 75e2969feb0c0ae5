#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use visits_core::{FetchResult, Task, TaskStatus};
use visits_daemon::config::DaemonConfig;
use visits_daemon::remote::VisitSource;
use visits_daemon::service::TaskService;

/// Provider double: per-uid scripted counters, repeating the last value once
/// the script runs out. Unknown uids fail.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Vec<i64>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(self, uid: &str, values: &[i64]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(uid.to_string(), values.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisitSource for ScriptedSource {
    async fn fetch(&self, uid: &str) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut scripts = self.scripts.lock().unwrap();
        let Some(values) = scripts.get_mut(uid) else {
            return FetchResult::Failed {
                error: format!("no script for {uid}"),
            };
        };
        let v = if values.len() > 1 {
            values.remove(0)
        } else {
            values[0]
        };
        FetchResult::Ok {
            observed: Some(v),
            raw: json!({ "SuccessfulVisits": v }),
        }
    }
}

pub fn config(dir: &tempfile::TempDir, background_workers: bool) -> DaemonConfig {
    let mut cfg = DaemonConfig::new(dir.path());
    cfg.poll_interval = Duration::from_millis(20);
    cfg.admin_pass = Some("s3cret".into());
    cfg.background_workers = background_workers;
    cfg
}

pub async fn service(
    dir: &tempfile::TempDir,
    background_workers: bool,
    source: Arc<ScriptedSource>,
) -> Arc<TaskService> {
    let svc = TaskService::new(config(dir, background_workers), source);
    svc.start().await.unwrap();
    svc
}

/// Polls the store until `task_id` reaches `status` or two seconds pass.
pub async fn wait_for_status(svc: &TaskService, task_id: &str, status: TaskStatus) -> Task {
    for _ in 0..200 {
        let task = svc.get(task_id).await.unwrap();
        if task.status == status {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached {status}");
}

pub async fn wait_for_no_workers(svc: &TaskService) {
    for _ in 0..200 {
        if svc.workers().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("workers still active: {:?}", svc.workers().active_ids());
}
