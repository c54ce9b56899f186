//! In-memory store implementation.
//!
//! Keeps everything in hash maps behind async locks. The default backend for
//! tests and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;

use harness_core::{Artifact, Job, JobId, Task, TaskId};
use tokio::sync::RwLock;

use super::{JobPatch, Result, Store, StorageError, TaskPatch};

/// In-memory store backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    artifacts: Arc<RwLock<Vec<Artifact>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn save_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("job {}", id)))?;
        patch.apply(job);
        Ok(())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_tasks(&self, job_id: JobId) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.sequence_order
                .cmp(&b.sequence_order)
                .then_with(|| a.task_key.cmp(&b.task_key))
        });
        Ok(tasks)
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;
        patch.apply(task);
        Ok(())
    }

    async fn store_artifacts(
        &self,
        _job_id: JobId,
        _task_id: TaskId,
        artifacts: &[Artifact],
    ) -> Result<()> {
        self.artifacts.write().await.extend_from_slice(artifacts);
        Ok(())
    }

    async fn list_artifacts(&self, job_id: JobId) -> Result<Vec<Artifact>> {
        Ok(self
            .artifacts
            .read()
            .await
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }
}
