//! Tracks which tasks have a background loop in this process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;
use tracing::debug;

struct Worker {
    generation: u64,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct Inner {
    next_generation: u64,
    workers: HashMap<String, Worker>,
}

/// At most one loop per task id. A loop removes its own entry when it ends,
/// whether it returns, panics or is aborted.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<Inner>,
}

impl WorkerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawns the future built by `make` unless `task_id` already has a loop.
    ///
    /// Returns true when a new loop was started.
    pub fn spawn_if_absent<F, Fut>(self: &Arc<Self>, task_id: &str, make: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = {
            let mut inner = self.lock();
            if inner.workers.contains_key(task_id) {
                return false;
            }
            inner.next_generation += 1;
            let generation = inner.next_generation;
            inner.workers.insert(
                task_id.to_string(),
                Worker {
                    generation,
                    abort: None,
                },
            );
            generation
        };

        let guard = Deregister {
            registry: Arc::clone(self),
            task_id: task_id.to_string(),
            generation,
        };
        let fut = make();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });

        // A missing entry means the loop already finished or `shutdown` drained
        // it before the handle existed; aborting covers the second case.
        match self
            .lock()
            .workers
            .get_mut(task_id)
            .filter(|w| w.generation == generation)
        {
            Some(worker) => worker.abort = Some(handle.abort_handle()),
            None => handle.abort(),
        }
        true
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.lock().workers.contains_key(task_id)
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts every loop. Returns how many were running.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Worker> = self.lock().workers.drain().map(|(_, w)| w).collect();
        for abort in drained.iter().filter_map(|w| w.abort.as_ref()) {
            abort.abort();
        }
        drained.len()
    }

    fn remove(&self, task_id: &str, generation: u64) {
        let mut inner = self.lock();
        if inner
            .workers
            .get(task_id)
            .is_some_and(|w| w.generation == generation)
        {
            inner.workers.remove(task_id);
            debug!(task_id, "worker deregistered");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Deregister {
    registry: Arc<WorkerRegistry>,
    task_id: String,
    generation: u64,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.remove(&self.task_id, self.generation);
    }
}
