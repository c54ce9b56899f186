//! Store trait abstraction.

use async_trait::async_trait;
use harness_core::{
    Artifact, ExecutionMetrics, Job, JobId, JobStatus, RetryHint, Task, TaskId, TaskStatus, Time,
};

/// Error type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Partial update for a job record.
///
/// Each call applies only the fields that are set; unset fields keep their
/// stored value. Calls are atomic per record.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    /// New status
    pub status: Option<JobStatus>,
    /// New total task count
    pub total_tasks: Option<usize>,
    /// New completed task count
    pub completed_tasks: Option<usize>,
    /// New progress percentage
    pub progress_percentage: Option<f32>,
    /// Most recently started task key
    pub current_task_key: Option<String>,
    /// Execution start timestamp
    pub started_at: Option<Time>,
    /// Terminal timestamp
    pub completed_at: Option<Time>,
    /// Terminal error message
    pub error_message: Option<String>,
    /// Completed performance snapshot
    pub execution_metrics: Option<ExecutionMetrics>,
}

impl JobPatch {
    /// Patch carrying only a status change.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Apply this patch to a job record.
    pub fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(total) = self.total_tasks {
            job.total_tasks = total;
        }
        if let Some(completed) = self.completed_tasks {
            job.completed_tasks = completed;
        }
        if let Some(progress) = self.progress_percentage {
            job.progress_percentage = progress;
        }
        if let Some(key) = self.current_task_key {
            job.current_task_key = Some(key);
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(message) = self.error_message {
            job.error_message = Some(message);
        }
        if let Some(metrics) = self.execution_metrics {
            job.execution_metrics = Some(metrics);
        }
    }
}

/// Partial update for a task record.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// New status
    pub status: Option<TaskStatus>,
    /// New retry count
    pub retry_count: Option<u32>,
    /// Retry adjustment for the next attempt
    pub retry_hint: Option<RetryHint>,
    /// Quality score of the last completed attempt
    pub quality_score: Option<f64>,
    /// Attempt start timestamp
    pub started_at: Option<Time>,
    /// Terminal timestamp
    pub completed_at: Option<Time>,
    /// Execution duration in seconds
    pub duration_seconds: Option<f64>,
    /// Result summary
    pub summary: Option<String>,
    /// Structured result data
    pub result_data: Option<serde_json::Value>,
    /// Error message
    pub error_message: Option<String>,
}

impl TaskPatch {
    /// Patch carrying only a status change.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Apply this patch to a task record.
    pub fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(count) = self.retry_count {
            task.retry_count = count;
        }
        if let Some(hint) = self.retry_hint {
            task.retry_hint = hint;
        }
        if let Some(score) = self.quality_score {
            task.quality_score = Some(score);
        }
        if let Some(at) = self.started_at {
            task.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            task.completed_at = Some(at);
        }
        if let Some(seconds) = self.duration_seconds {
            task.duration_seconds = Some(seconds);
        }
        if let Some(summary) = self.summary {
            task.summary = Some(summary);
        }
        if let Some(data) = self.result_data {
            task.result_data = data;
        }
        if let Some(message) = self.error_message {
            task.error_message = Some(message);
        }
    }
}

/// Store abstraction for jobs, tasks, and artifacts.
///
/// The engine reads and writes state transitions through this trait; the
/// backing store owns durability and its own consistency policy. Every call
/// is atomic on its own; the engine never needs multi-call transactions.
#[async_trait]
pub trait Store: Send + Sync {
    // === Job operations ===

    /// Save a job (create or replace).
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Load a job by ID.
    async fn load_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Apply a partial update to a job.
    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<()>;

    // === Task operations ===

    /// Save a task (create or replace).
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Load a task by ID.
    async fn load_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// List all tasks for a job, ordered by sequence hint then key.
    async fn list_tasks(&self, job_id: JobId) -> Result<Vec<Task>>;

    /// Apply a partial update to a task.
    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<()>;

    // === Artifact operations ===

    /// Store the artifacts produced by one task execution.
    async fn store_artifacts(
        &self,
        job_id: JobId,
        task_id: TaskId,
        artifacts: &[Artifact],
    ) -> Result<()>;

    /// List all artifacts for a job.
    async fn list_artifacts(&self, job_id: JobId) -> Result<Vec<Artifact>>;
}
