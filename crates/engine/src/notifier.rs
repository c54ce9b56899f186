//! Progress notification boundary.
//!
//! Notifications are strictly fire-and-forget: a failing notifier must never
//! affect scheduling outcomes, so implementations swallow and log their own
//! errors and every method returns unit.

use async_trait::async_trait;
use harness_core::{Job, JobId, Task};
use tracing::{debug, info, warn};

/// Receiver of task and job lifecycle events.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    /// A task began running.
    async fn task_started(&self, job_id: JobId, task: &Task);

    /// A task reached `complete`.
    async fn task_completed(&self, job_id: JobId, task: &Task);

    /// A task reached a terminal failure.
    async fn task_failed(&self, job_id: JobId, task: &Task, error: &str);

    /// A job settled successfully.
    async fn job_completed(&self, job: &Job);

    /// A job settled in failure.
    async fn job_failed(&self, job: &Job, error: &str);
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl ProgressNotifier for NullNotifier {
    async fn task_started(&self, _job_id: JobId, _task: &Task) {}
    async fn task_completed(&self, _job_id: JobId, _task: &Task) {}
    async fn task_failed(&self, _job_id: JobId, _task: &Task, _error: &str) {}
    async fn job_completed(&self, _job: &Job) {}
    async fn job_failed(&self, _job: &Job, _error: &str) {}
}

/// Notifier that emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl ProgressNotifier for LogNotifier {
    async fn task_started(&self, job_id: JobId, task: &Task) {
        debug!(%job_id, task_key = %task.task_key, task_type = %task.task_type, "task started");
    }

    async fn task_completed(&self, job_id: JobId, task: &Task) {
        info!(
            %job_id,
            task_key = %task.task_key,
            quality_score = task.quality_score,
            "task completed"
        );
    }

    async fn task_failed(&self, job_id: JobId, task: &Task, error: &str) {
        warn!(%job_id, task_key = %task.task_key, error, "task failed");
    }

    async fn job_completed(&self, job: &Job) {
        info!(job_id = %job.id, completed_tasks = job.completed_tasks, "job completed");
    }

    async fn job_failed(&self, job: &Job, error: &str) {
        warn!(job_id = %job.id, error, "job failed");
    }
}

/// Notifier that POSTs lifecycle events to a webhook as JSON.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook notifier for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) {
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(url = %self.url, status = %response.status(), "webhook notification rejected");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(url = %self.url, error = %e, "webhook notification failed");
            }
        }
    }
}

#[async_trait]
impl ProgressNotifier for WebhookNotifier {
    async fn task_started(&self, job_id: JobId, task: &Task) {
        self.post(serde_json::json!({
            "event": "task_started",
            "job_id": job_id.to_string(),
            "task_key": task.task_key,
            "task_type": task.task_type.to_string(),
        }))
        .await;
    }

    async fn task_completed(&self, job_id: JobId, task: &Task) {
        self.post(serde_json::json!({
            "event": "task_completed",
            "job_id": job_id.to_string(),
            "task_key": task.task_key,
            "quality_score": task.quality_score,
            "summary": task.summary,
        }))
        .await;
    }

    async fn task_failed(&self, job_id: JobId, task: &Task, error: &str) {
        self.post(serde_json::json!({
            "event": "task_failed",
            "job_id": job_id.to_string(),
            "task_key": task.task_key,
            "error": error,
        }))
        .await;
    }

    async fn job_completed(&self, job: &Job) {
        self.post(serde_json::json!({
            "event": "job_completed",
            "job_id": job.id.to_string(),
            "completed_tasks": job.completed_tasks,
            "total_tasks": job.total_tasks,
        }))
        .await;
    }

    async fn job_failed(&self, job: &Job, error: &str) {
        self.post(serde_json::json!({
            "event": "job_failed",
            "job_id": job.id.to_string(),
            "error": error,
        }))
        .await;
    }
}
