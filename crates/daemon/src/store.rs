//! JSON document store for tasks and settings.
//!
//! Two files live under the data directory: `tasks.json` (a list of tasks) and
//! `settings.json`. Every write goes to a temp file which is synced and then
//! renamed over the target, so readers see either the old or the new document.
//! All access goes through one async mutex; [`JsonStore::modify_tasks`] keeps
//! it held across read, mutation and write so concurrent read-modify-write
//! cycles cannot overwrite each other.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use visits_core::{Settings, Task};

pub const TASKS_FILE: &str = "tasks.json";
pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub struct JsonStore {
    tasks_path: PathBuf,
    settings_path: PathBuf,
    default_settings: Settings,
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(data_dir: impl AsRef<Path>, default_settings: Settings) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            tasks_path: data_dir.join(TASKS_FILE),
            settings_path: data_dir.join(SETTINGS_FILE),
            default_settings,
            lock: Mutex::new(()),
        }
    }

    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Creates both documents with their defaults if they do not exist yet.
    pub async fn init(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.load_tasks().await?;
        self.load_settings().await?;
        Ok(())
    }

    pub async fn read_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load_tasks().await
    }

    pub async fn write_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        save(&self.tasks_path, tasks).await
    }

    pub async fn read_settings(&self) -> Result<Settings, StoreError> {
        let _guard = self.lock.lock().await;
        self.load_settings().await
    }

    pub async fn write_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        save(&self.settings_path, settings).await
    }

    /// Runs `f` against the current task collection while holding the store
    /// lock. The collection is written back only when `f` returns `Some`.
    ///
    /// `f` must not block; network calls belong outside this method.
    pub async fn modify_tasks<R, F>(&self, f: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut Vec<Task>) -> Option<R>,
    {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load_tasks().await?;
        let out = f(&mut tasks);
        if out.is_some() {
            save(&self.tasks_path, &tasks).await?;
        }
        Ok(out)
    }

    async fn load_tasks(&self) -> Result<Vec<Task>, StoreError> {
        load_or_init(&self.tasks_path, Vec::new).await
    }

    async fn load_settings(&self) -> Result<Settings, StoreError> {
        load_or_init(&self.settings_path, || self.default_settings.clone()).await
    }
}

/// Reads a document, creating it from `default` when missing.
///
/// An unparsable document is moved aside to `<name>.corrupt-<epoch_ms>` and
/// replaced by the default; the move keeps the bytes for manual recovery.
async fn load_or_init<T, D>(path: &Path, default: D) -> Result<T, StoreError>
where
    T: DeserializeOwned + Serialize,
    D: FnOnce() -> T,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "initialising missing document");
            let value = default();
            save(path, &value).await?;
            return Ok(value);
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(parse_err) => {
            let quarantine = quarantine_path(path);
            match tokio::fs::rename(path, &quarantine).await {
                Ok(()) => warn!(
                    path = %path.display(),
                    moved_to = %quarantine.display(),
                    error = %parse_err,
                    "corrupt document replaced by default"
                ),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %parse_err,
                    rename_error = %e,
                    "corrupt document could not be moved aside; using default"
                ),
            }
            let value = default();
            save(path, &value).await?;
            Ok(value)
        }
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = chrono::Utc::now().timestamp_millis();
    path.with_file_name(format!("{name}.corrupt-{stamp}"))
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp"))
}

/// Atomic replace: temp file, fsync, rename.
async fn save<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
