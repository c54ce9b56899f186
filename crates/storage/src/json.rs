//! JSON file store implementation.
//!
//! Stores one pretty-printed JSON file per object under `jobs/`, `tasks/`,
//! and `artifacts/`. Suitable for single-process CLI runs; concurrent
//! processes should use a real database behind the same trait.

use std::path::Path;

use harness_core::{Artifact, Job, JobId, Task, TaskId};
use tokio::fs;
use tokio::sync::Mutex;

use super::{JobPatch, Result, Store, StorageError, TaskPatch};

/// File-based JSON store backend.
pub struct JsonStore {
    root: std::path::PathBuf,
    // Serializes read-modify-write update cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Create the store, ensuring its subdirectories exist.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("jobs")).await?;
        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("artifacts")).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn job_path(&self, id: JobId) -> std::path::PathBuf {
        self.root.join("jobs").join(format!("{}.json", id))
    }
    fn task_path(&self, id: TaskId) -> std::path::PathBuf {
        self.root.join("tasks").join(format!("{}.json", id))
    }
    fn artifact_path(&self, artifact: &Artifact) -> std::path::PathBuf {
        self.root.join("artifacts").join(format!("{}.json", artifact.id))
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for JsonStore {
    async fn save_job(&self, job: &Job) -> Result<()> {
        self.write_json(&self.job_path(job.id), job).await
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>> {
        read_json(&self.job_path(id)).await
    }

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut job: Job = read_json(&self.job_path(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {}", id)))?;
        patch.apply(&mut job);
        self.write_json(&self.job_path(id), &job).await
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.write_json(&self.task_path(task.id), task).await
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        read_json(&self.task_path(id)).await
    }

    async fn list_tasks(&self, job_id: JobId) -> Result<Vec<Task>> {
        let all: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        let mut tasks: Vec<Task> = all.into_iter().filter(|t| t.job_id == job_id).collect();
        tasks.sort_by(|a, b| {
            a.sequence_order
                .cmp(&b.sequence_order)
                .then_with(|| a.task_key.cmp(&b.task_key))
        });
        Ok(tasks)
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut task: Task = read_json(&self.task_path(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;
        patch.apply(&mut task);
        self.write_json(&self.task_path(id), &task).await
    }

    async fn store_artifacts(
        &self,
        _job_id: JobId,
        _task_id: TaskId,
        artifacts: &[Artifact],
    ) -> Result<()> {
        for artifact in artifacts {
            self.write_json(&self.artifact_path(artifact), artifact)
                .await?;
        }
        Ok(())
    }

    async fn list_artifacts(&self, job_id: JobId) -> Result<Vec<Artifact>> {
        let all: Vec<Artifact> = list_dir(&self.root.join("artifacts")).await?;
        Ok(all.into_iter().filter(|a| a.job_id == job_id).collect())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}
