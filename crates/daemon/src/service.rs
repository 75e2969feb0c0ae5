//! Task orchestrator: lifecycle operations, the synchronous sweep and the
//! per-task background loops.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use visits_core::{
    apply_poll, new_task_id, now_utc, AccumMode, FetchResult, Settings, SweepReport, Task,
    TaskError, TaskStatus,
};

use crate::config::DaemonConfig;
use crate::registry::WorkerRegistry;
use crate::remote::VisitSource;
use crate::store::{JsonStore, StoreError};
use crate::worker;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a background loop should do after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Exit(ExitReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The task no longer exists in the store.
    Missing,
    /// The task left `running` (stopped or completed).
    NotRunning(TaskStatus),
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Missing => f.write_str("task removed"),
            ExitReason::NotRunning(status) => write!(f, "task {status}"),
        }
    }
}

/// Main service implementing task orchestration.
pub struct TaskService {
    config: DaemonConfig,
    store: JsonStore,
    source: Arc<dyn VisitSource>,
    workers: Arc<WorkerRegistry>,
}

impl TaskService {
    pub fn new(config: DaemonConfig, source: Arc<dyn VisitSource>) -> Arc<Self> {
        let store = JsonStore::new(
            &config.data_dir,
            Settings::with_mode(config.default_accum_mode),
        );
        Arc::new(Self {
            config,
            store,
            source,
            workers: WorkerRegistry::new(),
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// Initialises the store and resumes a loop for every running task.
    ///
    /// Returns the number of loops started.
    pub async fn start(self: &Arc<Self>) -> Result<usize, ServiceError> {
        self.store.init().await?;
        let resumed = self.ensure_workers_for_running().await?;
        if resumed > 0 {
            info!(resumed, "resumed background workers");
        }
        Ok(resumed)
    }

    pub async fn create(self: &Arc<Self>, uid: &str, target: i64) -> Result<Task, ServiceError> {
        let task = Task::new(new_task_id(), uid, target, now_utc())?;

        let stored = task.clone();
        self.store
            .modify_tasks(move |tasks| {
                tasks.push(stored);
                Some(())
            })
            .await?;
        info!(task_id = %task.id, uid = %task.uid, target = task.target, "task created");

        self.ensure_worker(&task.id);
        Ok(task)
    }

    /// Stops a task. Stopping a stopped or completed task succeeds and changes
    /// nothing.
    pub async fn stop(&self, task_id: &str) -> Result<Task, ServiceError> {
        let now = now_utc();
        let task = self
            .store
            .modify_tasks(|tasks| {
                let task = tasks.iter_mut().find(|t| t.id == task_id)?;
                if task.stop(now) {
                    info!(task_id, "task stopped");
                }
                Some(task.clone())
            })
            .await?;
        task.ok_or_else(|| TaskError::NotFound(task_id.to_string()).into())
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, ServiceError> {
        self.store
            .read_tasks()
            .await?
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()).into())
    }

    pub async fn list(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self.store.read_tasks().await?)
    }

    pub async fn accum_mode(&self) -> Result<AccumMode, ServiceError> {
        Ok(self.store.read_settings().await?.accum_mode)
    }

    pub async fn set_accum_mode(&self, mode: &str) -> Result<AccumMode, ServiceError> {
        let mode: AccumMode = mode.parse()?;
        self.store.write_settings(&Settings::with_mode(mode)).await?;
        info!(%mode, "accumulation mode changed");
        Ok(mode)
    }

    /// One fetch + update for every running task, persisted in a single write.
    ///
    /// Provider calls run concurrently and outside the store lock. Tasks that
    /// stopped or completed while their fetch was in flight are skipped.
    pub async fn run_one_iteration_for_all(&self) -> Result<SweepReport, ServiceError> {
        let running: Vec<(String, String)> = self
            .store
            .read_tasks()
            .await?
            .into_iter()
            .filter(Task::is_running)
            .map(|t| (t.id, t.uid))
            .collect();
        let accum_mode = self.accum_mode().await?;

        let mut fetches = JoinSet::new();
        for (task_id, uid) in running {
            let source = Arc::clone(&self.source);
            fetches.spawn(async move {
                let fetch = source.fetch(&uid).await;
                (task_id, fetch)
            });
        }

        let mut observations: HashMap<String, FetchResult> = HashMap::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((task_id, fetch)) => {
                    observations.insert(task_id, fetch);
                }
                Err(e) => warn!(error = %e, "sweep fetch aborted; task skipped this round"),
            }
        }

        let now = now_utc();
        let results = self
            .store
            .modify_tasks(|tasks| {
                let mut results = Vec::new();
                for task in tasks.iter_mut() {
                    let Some(fetch) = observations.get(&task.id) else {
                        continue;
                    };
                    if let Some(added) = apply_poll(task, accum_mode, fetch, now) {
                        if task.status == TaskStatus::Completed {
                            info!(task_id = %task.id, accumulated = task.accumulated, "task completed");
                        }
                        results.push(task.summary(added));
                    }
                }
                Some(results)
            })
            .await?
            .unwrap_or_default();

        debug!(processed = results.len(), %accum_mode, "sweep finished");
        Ok(SweepReport {
            processed_count: results.len(),
            results,
            accum_mode,
        })
    }

    /// One background cycle for a single task: fetch outside the lock, then
    /// apply against the freshly re-read task.
    pub async fn poll_task_once(&self, task_id: &str) -> Result<PollStep, ServiceError> {
        let uid = {
            let tasks = self.store.read_tasks().await?;
            match tasks.into_iter().find(|t| t.id == task_id) {
                None => return Ok(PollStep::Exit(ExitReason::Missing)),
                Some(t) if !t.is_running() => {
                    return Ok(PollStep::Exit(ExitReason::NotRunning(t.status)))
                }
                Some(t) => t.uid,
            }
        };

        let fetch = self.source.fetch(&uid).await;
        let accum_mode = self.accum_mode().await?;
        let now = now_utc();

        let applied = self
            .store
            .modify_tasks(|tasks| {
                let task = tasks.iter_mut().find(|t| t.id == task_id)?;
                let added = apply_poll(task, accum_mode, &fetch, now)?;
                Some((added, task.accumulated, task.status))
            })
            .await?;

        match applied {
            Some((added, accumulated, status)) => {
                debug!(task_id, added, accumulated, %status, "poll applied");
                if status == TaskStatus::Completed {
                    info!(task_id, accumulated, "task completed");
                    return Ok(PollStep::Exit(ExitReason::NotRunning(status)));
                }
                Ok(PollStep::Continue)
            }
            // Gone or no longer running by the time the fetch returned; the
            // next cycle reports which.
            None => Ok(PollStep::Continue),
        }
    }

    /// Starts a background loop for `task_id` unless one is already active or
    /// background workers are disabled.
    pub fn ensure_worker(self: &Arc<Self>, task_id: &str) -> bool {
        if !self.config.background_workers {
            return false;
        }
        let svc = Arc::clone(self);
        let id = task_id.to_string();
        self.workers
            .spawn_if_absent(task_id, move || worker::run_task_loop(svc, id))
    }

    /// Makes sure every running task has a loop in this process.
    pub async fn ensure_workers_for_running(self: &Arc<Self>) -> Result<usize, ServiceError> {
        if !self.config.background_workers {
            return Ok(0);
        }
        let started = self
            .store
            .read_tasks()
            .await?
            .iter()
            .filter(|t| t.is_running())
            .filter(|t| self.ensure_worker(&t.id))
            .count();
        Ok(started)
    }

    /// Aborts all background loops.
    pub fn shutdown(&self) {
        let stopped = self.workers.shutdown();
        info!(stopped, "background workers stopped");
    }
}
